// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{ResourceKind, Synchronizer};
use crate::error::ApiError;
use crate::model::StorageClassList;
use crate::time::Timestamp;

/// Listed first; selecting it leaves the class to the cluster.
pub const DEFAULT_STORAGE_CLASS: &str = "(default)";

#[derive(Debug)]
pub struct PersistentVolumeClaims;

#[derive(Debug, Clone, Deserialize)]
pub struct PvcPayload {
	pub name: String,
	#[serde(default)]
	pub puid: Option<String>,
	#[serde(default)]
	pub creation_timestamp: Option<String>,
	#[serde(default)]
	pub size: Option<String>,
	#[serde(default)]
	pub access_modes: Vec<String>,
	#[serde(default)]
	pub storage_class_name: Option<String>,
	#[serde(default)]
	pub volume_name: Option<String>,
	#[serde(default)]
	pub phase: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvcRecord {
	pub name: String,
	pub puid: Option<String>,
	pub created: Timestamp,
	pub size: Option<String>,
	pub access_modes: Vec<String>,
	pub storage_class: Option<String>,
	pub volume_name: Option<String>,
	pub phase: Option<String>,
}

#[derive(Debug, Default)]
pub struct StorageClassState {
	url: Option<Url>,
	classes: Vec<String>,
}

impl ResourceKind for PersistentVolumeClaims {
	const NAME: &'static str = "persistentvolumeclaim";
	const LINK_NAME: &'static str = "persistentvolumeclaims_url";
	const ITEMS_KEY: &'static str = "persistentvolumeclaim_urls";

	type Payload = PvcPayload;
	type Record = PvcRecord;
	type Extra = StorageClassState;

	fn normalize(payload: PvcPayload, now: DateTime<Utc>) -> Option<PvcRecord> {
		Some(PvcRecord {
			created: Timestamp::parse(payload.creation_timestamp.as_deref(), now),
			name: payload.name,
			puid: payload.puid,
			size: payload.size,
			access_modes: payload.access_modes,
			storage_class: payload.storage_class_name,
			volume_name: payload.volume_name,
			phase: payload.phase,
		})
	}
}

impl Synchronizer<PersistentVolumeClaims> {
	pub async fn set_storageclasses_url(&self, url: Url) {
		self.state().write().await.extra.url = Some(url);
	}

	pub async fn storageclasses_url(&self) -> Option<Url> {
		self.state().read().await.extra.url.clone()
	}

	/// Replaces the cached class list with `(default)` followed by the
	/// server's classes.
	pub async fn request_storageclasses(&self) -> Result<Vec<String>, ApiError> {
		let url = self
			.storageclasses_url()
			.await
			.ok_or(ApiError::MissingLink("storageclasses_url"))?;
		let list: StorageClassList = self.api().get_json(url.clone()).await?;
		let classes = with_default_class(list.classes);
		debug!(url = %url, count = classes.len(), "storage classes loaded");
		self.state().write().await.extra.classes = classes.clone();
		Ok(classes)
	}

	pub(crate) async fn restore_storageclasses(&self, url: Option<Url>, classes: Vec<String>) {
		let mut state = self.state().write().await;
		state.extra.url = url;
		state.extra.classes = classes;
	}

	pub async fn storageclasses(&self) -> Vec<String> {
		self.state().read().await.extra.classes.clone()
	}
}

fn with_default_class(classes: Vec<String>) -> Vec<String> {
	std::iter::once(DEFAULT_STORAGE_CLASS.to_string())
		.chain(classes.into_iter().filter(|c| c != DEFAULT_STORAGE_CLASS))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn default_class_leads_the_list() {
		assert_eq!(
			with_default_class(vec!["standard".to_string(), "fast".to_string()]),
			vec!["(default)", "standard", "fast"]
		);
		assert_eq!(with_default_class(Vec::new()), vec!["(default)"]);
	}

	#[test]
	fn normalizes_claim() {
		let payload: PvcPayload = serde_json::from_value(json!({
			"name": "data",
			"size": "10Gi",
			"access_modes": ["ReadWriteOnce"],
			"storage_class_name": "standard",
			"phase": "Bound",
		}))
		.unwrap();
		let record = PersistentVolumeClaims::normalize(payload, Utc::now()).unwrap();
		assert_eq!(record.size.as_deref(), Some("10Gi"));
		assert_eq!(record.access_modes, vec!["ReadWriteOnce"]);
		assert_eq!(record.storage_class.as_deref(), Some("standard"));
		assert_eq!(record.phase.as_deref(), Some("Bound"));
	}
}
