// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::services::scalar_to_string;
use super::{ResourceKind, Synchronizer};
use crate::probe::{AvailabilityProber, ProbeResult, ProbeStatus};
use crate::time::Timestamp;

#[derive(Debug)]
pub struct Ingresses;

#[derive(Debug, Clone, Deserialize)]
pub struct IngressPayload {
	pub name: String,
	#[serde(default)]
	pub tls: bool,
	#[serde(default)]
	pub creation_timestamp: Option<String>,
	#[serde(default)]
	pub annotations: Vec<AnnotationPayload>,
	#[serde(default)]
	pub rules: Vec<RulePayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationPayload {
	pub key: String,
	#[serde(default)]
	pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulePayload {
	pub host: String,
	#[serde(default)]
	pub paths: Vec<PathPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathPayload {
	#[serde(default)]
	pub path: Option<String>,
	#[serde(default)]
	pub service_name: Option<String>,
	#[serde(default)]
	pub service_port: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngressRecord {
	pub name: String,
	pub tls: bool,
	pub created: Timestamp,
	/// `key: value`
	pub annotations: Vec<String>,
	/// `scheme://host/path`, https when TLS is enabled.
	pub hosts: Vec<String>,
	/// How many leading entries of `hosts` come from the first rule.
	#[serde(default)]
	pub primary_hosts: usize,
	/// `service:port`
	pub services: Vec<String>,
	pub paths: Vec<String>,
	pub availability: ProbeResult,
}

impl ResourceKind for Ingresses {
	const NAME: &'static str = "ingress";
	const LINK_NAME: &'static str = "ingresses_url";
	const ITEMS_KEY: &'static str = "ingress_urls";

	type Payload = IngressPayload;
	type Record = IngressRecord;
	type Extra = ();

	fn normalize(payload: IngressPayload, now: DateTime<Utc>) -> Option<IngressRecord> {
		let scheme = if payload.tls { "https" } else { "http" };
		let mut hosts = Vec::new();
		let mut services = Vec::new();
		let mut paths = Vec::new();

		let mut primary_hosts = 0;

		for (position, rule) in payload.rules.iter().enumerate() {
			if position == 1 {
				primary_hosts = hosts.len();
			}
			if rule.paths.is_empty() {
				hosts.push(format!("{scheme}://{}", rule.host));
			}
			for path in &rule.paths {
				let route = path.path.as_deref().unwrap_or("");
				hosts.push(format!("{scheme}://{}{route}", rule.host));
				paths.push(route.to_string());
				if let Some(service) = &path.service_name {
					services.push(format!("{service}:{}", scalar_to_string(&path.service_port)));
				}
			}
		}
		if payload.rules.len() <= 1 {
			primary_hosts = hosts.len();
		}

		Some(IngressRecord {
			created: Timestamp::parse(payload.creation_timestamp.as_deref(), now),
			annotations: payload
				.annotations
				.iter()
				.map(|a| format!("{}: {}", a.key, a.value))
				.collect(),
			name: payload.name,
			tls: payload.tls,
			hosts,
			primary_hosts,
			services,
			paths,
			availability: ProbeResult::pending(0),
		})
	}

	fn on_append(record: &mut IngressRecord, index: usize) {
		record.availability = ProbeResult::pending(index);
	}
}

impl Synchronizer<Ingresses> {
	/// Probes every host of each record's first rule and settles its
	/// availability: the first host that does not answer `ok` decides it,
	/// otherwise the first host's result does.
	///
	/// Results are returned for every probe issued; they are only written
	/// back if no `request_all` started in the meantime.
	pub async fn check_availability(&self, prober: &AvailabilityProber) -> Vec<ProbeResult> {
		let (generation, targets) = {
			let state = self.state().read().await;
			let targets: Vec<(usize, String)> = state
				.records
				.iter()
				.enumerate()
				.flat_map(|(index, record)| {
					record
						.hosts
						.iter()
						.take(record.primary_hosts.max(1))
						.map(move |host| (index, host.clone()))
				})
				.collect();
			(state.generation, targets)
		};

		debug!(generation, hosts = targets.len(), "probing ingress hosts");

		let results = join_all(
			targets
				.iter()
				.map(|(index, host)| prober.probe(*index, host)),
		)
		.await;

		let mut state = self.state().write().await;
		if state.generation != generation {
			debug!(generation, "ingress list changed while probing, results dropped");
			return results;
		}
		let mut verdicts: BTreeMap<usize, &ProbeResult> = BTreeMap::new();
		for result in &results {
			verdicts
				.entry(result.index)
				.and_modify(|current| {
					if current.status == ProbeStatus::Ok && result.status != ProbeStatus::Ok {
						*current = result;
					}
				})
				.or_insert(result);
		}
		for (index, verdict) in verdicts {
			if let Some(record) = state.records.get_mut(index) {
				record.availability.settle(verdict.clone());
			}
		}

		let reachable = state
			.records
			.iter()
			.filter(|r| r.availability.status == ProbeStatus::Ok)
			.count();
		info!(probed = results.len(), reachable, "ingress availability checked");
		results
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use serde_json::json;

	fn normalize(value: Value) -> IngressRecord {
		let payload: IngressPayload = serde_json::from_value(value).unwrap();
		Ingresses::normalize(payload, Utc::now()).unwrap()
	}

	#[test]
	fn hosts_services_and_annotations_are_flattened() {
		let record = normalize(json!({
			"name": "web",
			"tls": true,
			"annotations": [{ "key": "cert-manager.io/cluster-issuer", "value": "letsencrypt" }],
			"rules": [
				{
					"host": "app.example.org",
					"paths": [
						{ "path": "/", "service_name": "web", "service_port": 80 },
						{ "path": "/api", "service_name": "api", "service_port": "http" },
					],
				},
				{ "host": "static.example.org", "paths": [] },
			],
		}));

		assert_eq!(
			record.hosts,
			vec![
				"https://app.example.org/",
				"https://app.example.org/api",
				"https://static.example.org",
			]
		);
		assert_eq!(record.primary_hosts, 2);
		assert_eq!(record.services, vec!["web:80", "api:http"]);
		assert_eq!(record.paths, vec!["/", "/api"]);
		assert_eq!(record.annotations, vec!["cert-manager.io/cluster-issuer: letsencrypt"]);
		assert_eq!(record.availability.status, ProbeStatus::Pending);
	}

	#[test]
	fn single_rule_hosts_are_all_primary() {
		let record = normalize(json!({
			"name": "bare",
			"rules": [{ "host": "bare.example.org", "paths": [] }],
		}));
		assert_eq!(record.hosts, vec!["http://bare.example.org"]);
		assert_eq!(record.primary_hosts, 1);
	}

	#[test]
	fn append_assigns_probe_index() {
		let mut record = normalize(json!({ "name": "x", "rules": [] }));
		Ingresses::on_append(&mut record, 4);
		assert_eq!(record.availability.index, 4);
		assert!(!record.availability.is_settled());
	}

	proptest! {
		#[test]
		fn scheme_follows_tls(tls in any::<bool>(), host in "[a-z]{1,12}\\.example", path in "/[a-z]{0,8}") {
			let record = normalize(json!({
				"name": "p",
				"tls": tls,
				"rules": [{ "host": host, "paths": [{ "path": path }] }],
			}));
			let expected = if tls { "https://" } else { "http://" };
			prop_assert!(record.hosts[0].starts_with(expected));
			prop_assert!(record.hosts[0].ends_with(&path));
		}
	}
}
