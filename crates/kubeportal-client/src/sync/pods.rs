// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::{ResourceKind, Synchronizer};
use crate::error::ApiError;
use crate::http::ApiRequest;
use crate::time::{format_long, parse_datetime, Timestamp};

#[derive(Debug)]
pub struct Pods;

#[derive(Debug, Clone, Deserialize)]
pub struct PodPayload {
	pub name: String,
	#[serde(default)]
	pub puid: Option<String>,
	#[serde(default)]
	pub creation_timestamp: Option<String>,
	#[serde(default)]
	pub start_timestamp: Option<String>,
	#[serde(default)]
	pub phase: Option<String>,
	#[serde(default)]
	pub reason: Option<String>,
	#[serde(default)]
	pub message: Option<String>,
	#[serde(default)]
	pub host_ip: Option<String>,
	#[serde(default)]
	pub containers: Vec<ContainerPayload>,
	#[serde(default)]
	pub logs_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerPayload {
	pub name: String,
	#[serde(default)]
	pub image: Option<String>,
	#[serde(default)]
	pub volume_mounts: Vec<VolumeMountPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VolumeMountPayload {
	/// An object with `name`, `type` and `path`, or an empty string when
	/// the server could not resolve the volume.
	#[serde(default)]
	pub volume: Value,
	#[serde(default)]
	pub mount_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodRecord {
	pub name: String,
	pub puid: Option<String>,
	pub phase: Option<String>,
	pub reason: Option<String>,
	pub message: Option<String>,
	pub host_ip: Option<String>,
	pub created: Timestamp,
	pub started: Timestamp,
	pub containers: Vec<String>,
	pub images: Vec<String>,
	pub volumes: Vec<VolumeRecord>,
	pub logs_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRecord {
	pub container: String,
	pub name: Option<String>,
	#[serde(rename = "type")]
	pub kind: Option<String>,
	pub path: Option<String>,
	pub mount_path: Option<String>,
}

/// Log page bookkeeping, keyed by pod name.
#[derive(Debug, Default)]
pub struct PodLogState {
	page_numbers: HashMap<String, u32>,
}

impl ResourceKind for Pods {
	const NAME: &'static str = "pod";
	const LINK_NAME: &'static str = "pods_url";
	const ITEMS_KEY: &'static str = "pod_urls";

	type Payload = PodPayload;
	type Record = PodRecord;
	type Extra = PodLogState;

	fn normalize(payload: PodPayload, now: DateTime<Utc>) -> Option<PodRecord> {
		let volumes = payload
			.containers
			.iter()
			.flat_map(|container| {
				container.volume_mounts.iter().map(|mount| VolumeRecord {
					container: container.name.clone(),
					name: string_field(&mount.volume, "name"),
					kind: string_field(&mount.volume, "type"),
					path: string_field(&mount.volume, "path"),
					mount_path: mount.mount_path.clone(),
				})
			})
			.collect();

		Some(PodRecord {
			created: Timestamp::parse(payload.creation_timestamp.as_deref(), now),
			started: Timestamp::parse(payload.start_timestamp.as_deref(), now),
			containers: payload.containers.iter().map(|c| c.name.clone()).collect(),
			images: payload
				.containers
				.iter()
				.map(|c| c.image.clone().unwrap_or_default())
				.collect(),
			volumes,
			name: payload.name,
			puid: payload.puid,
			phase: payload.phase,
			reason: payload.reason,
			message: payload.message,
			host_ip: payload.host_ip,
			logs_url: payload.logs_url,
		})
	}
}

fn string_field(value: &Value, key: &str) -> Option<String> {
	value.get(key).and_then(Value::as_str).map(str::to_string)
}

#[derive(Debug, Clone, Deserialize)]
struct LogSearchResponse {
	#[serde(default)]
	hits: Vec<LogHit>,
	#[serde(default)]
	total: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct LogHit {
	#[serde(rename = "_id")]
	id: String,
	#[serde(rename = "_source", default)]
	source: LogSource,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LogSource {
	#[serde(default)]
	log: Option<String>,
	#[serde(default)]
	stream: Option<String>,
	#[serde(rename = "@timestamp", default)]
	timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
	pub id: String,
	pub log: String,
	pub stream: Option<String>,
	pub timestamp: Option<DateTime<Utc>>,
	/// e.g. `January 1st 2024, 12:00:00 am`; the raw value if unparseable.
	pub timestamp_display: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPage {
	pub page: u32,
	pub entries: Vec<LogEntry>,
	/// Total hits across all pages.
	pub total: u64,
}

impl LogSearchResponse {
	fn into_page(self, page: u32) -> LogPage {
		// Search backends report either a bare count or `{ "value": n }`.
		let total = self
			.total
			.as_u64()
			.or_else(|| self.total.get("value").and_then(Value::as_u64))
			.unwrap_or(self.hits.len() as u64);

		let entries = self
			.hits
			.into_iter()
			.map(|hit| {
				let timestamp = hit.source.timestamp.as_deref().and_then(parse_datetime);
				LogEntry {
					timestamp_display: timestamp.map(format_long).or(hit.source.timestamp),
					timestamp,
					id: hit.id,
					log: hit.source.log.unwrap_or_default(),
					stream: hit.source.stream,
				}
			})
			.collect();

		LogPage {
			page,
			entries,
			total,
		}
	}
}

impl Synchronizer<Pods> {
	/// Fetches one page of a pod's logs.
	pub async fn request_logs(&self, logs_url: &str, page: u32) -> Result<LogPage, ApiError> {
		let url = self.api().resolve_link(logs_url)?;
		debug!(url = %url, page, "requesting pod logs");
		let response = self
			.api()
			.request(ApiRequest::get(url).with_query("page", page))
			.await?;
		let search: LogSearchResponse = response.json()?;
		Ok(search.into_page(page))
	}

	/// Downloads the full log archive for a pod.
	pub async fn download_logs(&self, logs_url: &str) -> Result<Bytes, ApiError> {
		let url: Url = self.api().resolve_link(logs_url)?;
		let archive = self.api().get_bytes(url.clone()).await?;
		info!(url = %url, bytes = archive.len(), "downloaded log archive");
		Ok(archive)
	}

	pub async fn set_page_number(&self, pod_name: &str, page: u32) {
		self
			.state()
			.write()
			.await
			.extra
			.page_numbers
			.insert(pod_name.to_string(), page);
	}

	/// Defaults to the first page.
	pub async fn page_number(&self, pod_name: &str) -> u32 {
		self
			.state()
			.read()
			.await
			.extra
			.page_numbers
			.get(pod_name)
			.copied()
			.unwrap_or(1)
	}

	pub async fn find(&self, pod_name: &str) -> Option<PodRecord> {
		self
			.state()
			.read()
			.await
			.records
			.iter()
			.find(|pod| pod.name == pod_name)
			.cloned()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use serde_json::json;

	fn now() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap()
	}

	fn normalize(value: Value) -> PodRecord {
		let payload: PodPayload = serde_json::from_value(value).unwrap();
		Pods::normalize(payload, now()).unwrap()
	}

	#[test]
	fn minimal_pod_normalizes() {
		let pod = normalize(json!({
			"name": "nginx",
			"creation_timestamp": "2024-01-01T00:00:00Z",
			"containers": [{ "name": "c1", "image": "nginx:latest" }],
		}));

		assert_eq!(pod.name, "nginx");
		assert_eq!(pod.containers, vec!["c1"]);
		assert_eq!(pod.images, vec!["nginx:latest"]);
		assert_eq!(pod.created.relative.as_deref(), Some("3 days ago"));
		assert!(pod.started.raw.is_none());
		assert!(pod.volumes.is_empty());
	}

	#[test]
	fn volumes_are_flattened_across_containers() {
		let pod = normalize(json!({
			"name": "web",
			"containers": [
				{
					"name": "app",
					"image": "app:1",
					"volume_mounts": [
						{ "volume": { "name": "data", "type": "PersistentVolumeClaim", "path": "" }, "mount_path": "/data" },
						{ "volume": "", "mount_path": "/tmp" },
					],
				},
				{
					"name": "sidecar",
					"image": "proxy:2",
					"volume_mounts": [
						{ "volume": { "name": "config", "type": "ConfigMap" }, "mount_path": "/etc/proxy" },
					],
				},
			],
		}));

		assert_eq!(pod.volumes.len(), 3);
		assert_eq!(pod.volumes[0].name.as_deref(), Some("data"));
		assert_eq!(pod.volumes[0].kind.as_deref(), Some("PersistentVolumeClaim"));
		assert_eq!(pod.volumes[1].name, None);
		assert_eq!(pod.volumes[1].mount_path.as_deref(), Some("/tmp"));
		assert_eq!(pod.volumes[2].container, "sidecar");
	}

	#[test]
	fn log_page_accepts_both_total_shapes() {
		let bare: LogSearchResponse = serde_json::from_value(json!({
			"hits": [{
				"_id": "a1",
				"_source": { "log": "started", "stream": "stdout", "@timestamp": "2024-01-01T00:00:00Z" },
			}],
			"total": 42,
		}))
		.unwrap();
		let page = bare.into_page(2);
		assert_eq!(page.total, 42);
		assert_eq!(page.page, 2);
		assert_eq!(page.entries[0].id, "a1");
		assert_eq!(page.entries[0].log, "started");
		assert_eq!(
			page.entries[0].timestamp_display.as_deref(),
			Some("January 1st 2024, 12:00:00 am")
		);

		let nested: LogSearchResponse = serde_json::from_value(json!({
			"hits": [],
			"total": { "value": 7, "relation": "eq" },
		}))
		.unwrap();
		assert_eq!(nested.into_page(1).total, 7);
	}
}
