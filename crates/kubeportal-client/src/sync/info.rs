// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ResourceKind;

/// Cluster statistics such as `k8s_version` or `k8s_node_count`.
#[derive(Debug)]
pub struct ClusterInfo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoRecord {
	pub slug: String,
	pub value: Value,
}

impl ResourceKind for ClusterInfo {
	const NAME: &'static str = "info";
	const LINK_NAME: &'static str = "infos_url";
	// Older servers list links here; current ones send a `links` map.
	const ITEMS_KEY: &'static str = "info_urls";

	/// A single `{slug: value}` entry.
	type Payload = Map<String, Value>;
	type Record = InfoRecord;
	type Extra = ();

	fn normalize(payload: Map<String, Value>, _now: DateTime<Utc>) -> Option<InfoRecord> {
		payload
			.into_iter()
			.next()
			.map(|(slug, value)| InfoRecord { slug, value })
	}
}
