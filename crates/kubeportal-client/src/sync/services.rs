// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ResourceKind;
use crate::time::Timestamp;

#[derive(Debug)]
pub struct Services;

#[derive(Debug, Clone, Deserialize)]
pub struct ServicePayload {
	pub name: String,
	#[serde(rename = "type", default)]
	pub service_type: Option<String>,
	#[serde(default)]
	pub creation_timestamp: Option<String>,
	#[serde(default)]
	pub selector: Option<SelectorPayload>,
	#[serde(default)]
	pub ports: Vec<PortPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorPayload {
	pub key: String,
	#[serde(default)]
	pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortPayload {
	#[serde(default)]
	pub protocol: Option<String>,
	#[serde(default)]
	pub port: Value,
	/// A number or a named container port.
	#[serde(default)]
	pub target_port: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
	pub name: String,
	pub service_type: Option<String>,
	pub created: Timestamp,
	/// `key=value`
	pub selector: Option<String>,
	/// `PROTOCOL:port`
	pub ports: Vec<String>,
	pub target_ports: Vec<String>,
}

impl ResourceKind for Services {
	const NAME: &'static str = "service";
	const LINK_NAME: &'static str = "services_url";
	const ITEMS_KEY: &'static str = "service_urls";

	type Payload = ServicePayload;
	type Record = ServiceRecord;
	type Extra = ();

	fn normalize(payload: ServicePayload, now: DateTime<Utc>) -> Option<ServiceRecord> {
		let ports = payload
			.ports
			.iter()
			.map(|port| {
				format!(
					"{}:{}",
					port.protocol.as_deref().unwrap_or("TCP"),
					scalar_to_string(&port.port)
				)
			})
			.collect();
		let target_ports = payload
			.ports
			.iter()
			.map(|port| scalar_to_string(&port.target_port))
			.filter(|target| !target.is_empty())
			.collect();

		Some(ServiceRecord {
			created: Timestamp::parse(payload.creation_timestamp.as_deref(), now),
			selector: payload
				.selector
				.map(|selector| format!("{}={}", selector.key, selector.value)),
			name: payload.name,
			service_type: payload.service_type,
			ports,
			target_ports,
		})
	}
}

/// Numbers and strings without JSON quoting; anything else is empty.
pub(crate) fn scalar_to_string(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		Value::Number(n) => n.to_string(),
		Value::Bool(b) => b.to_string(),
		_ => String::new(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn ports_and_selector_are_joined() {
		let payload: ServicePayload = serde_json::from_value(json!({
			"name": "web",
			"type": "ClusterIP",
			"selector": { "key": "app", "value": "web" },
			"ports": [
				{ "protocol": "TCP", "port": 80, "target_port": 8080 },
				{ "protocol": "UDP", "port": 53, "target_port": "dns" },
			],
		}))
		.unwrap();

		let record = Services::normalize(payload, Utc::now()).unwrap();
		assert_eq!(record.service_type.as_deref(), Some("ClusterIP"));
		assert_eq!(record.selector.as_deref(), Some("app=web"));
		assert_eq!(record.ports, vec!["TCP:80", "UDP:53"]);
		assert_eq!(record.target_ports, vec!["8080", "dns"]);
	}

	#[test]
	fn selector_is_optional() {
		let payload: ServicePayload =
			serde_json::from_value(json!({ "name": "headless", "selector": null })).unwrap();
		let record = Services::normalize(payload, Utc::now()).unwrap();
		assert!(record.selector.is_none());
		assert!(record.ports.is_empty());
	}
}
