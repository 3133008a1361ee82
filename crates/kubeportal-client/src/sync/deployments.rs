// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ResourceKind;
use crate::time::Timestamp;

#[derive(Debug)]
pub struct Deployments;

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentPayload {
	pub name: String,
	#[serde(default)]
	pub puid: Option<String>,
	#[serde(default)]
	pub creation_timestamp: Option<String>,
	#[serde(default)]
	pub replicas: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
	pub name: String,
	pub puid: Option<String>,
	pub created: Timestamp,
	pub replicas: i64,
}

impl ResourceKind for Deployments {
	const NAME: &'static str = "deployment";
	const LINK_NAME: &'static str = "deployments_url";
	const ITEMS_KEY: &'static str = "deployment_urls";

	type Payload = DeploymentPayload;
	type Record = DeploymentRecord;
	type Extra = ();

	fn normalize(payload: DeploymentPayload, now: DateTime<Utc>) -> Option<DeploymentRecord> {
		Some(DeploymentRecord {
			created: Timestamp::parse(payload.creation_timestamp.as_deref(), now),
			replicas: payload.replicas.unwrap_or(0),
			name: payload.name,
			puid: payload.puid,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn missing_replicas_default_to_zero() {
		let payload: DeploymentPayload =
			serde_json::from_value(json!({ "name": "api", "replicas": null })).unwrap();
		let record = Deployments::normalize(payload, Utc::now()).unwrap();
		assert_eq!(record.name, "api");
		assert_eq!(record.replicas, 0);
		assert!(record.created.at.is_none());
	}
}
