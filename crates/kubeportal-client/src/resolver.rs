// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fan-out of links envelopes into concurrent item fetches.

use futures::stream::{BoxStream, FuturesUnordered, StreamExt};
use serde::de::Error as _;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::ApiError;
use crate::http::ApiClient;

/// Used when the requested key is absent, e.g. the cluster-info endpoint.
const FALLBACK_LINKS_KEY: &str = "links";

/// One settled item fetch. `payload` is `None` when the fetch failed,
/// the link was unusable, or the server returned null.
#[derive(Debug, Clone)]
pub struct ItemFetch {
	pub link: String,
	pub payload: Option<Value>,
}

/// Items in completion order, not envelope order.
pub type ItemStream = BoxStream<'static, ItemFetch>;

#[derive(Debug, Clone)]
pub struct LinkResolver {
	api: ApiClient,
}

impl LinkResolver {
	pub fn new(api: ApiClient) -> Self {
		Self { api }
	}

	/// Fetches the envelope once, then every item link concurrently.
	/// Only a bad envelope fails the call; item failures are logged and
	/// settle with an empty payload.
	pub async fn resolve_collection(
		&self,
		collection_url: &Url,
		item_key: &str,
	) -> Result<ItemStream, ApiError> {
		let envelope: Value = self.api.get_json(collection_url.clone()).await?;
		let links = extract_links(&envelope, item_key).ok_or_else(|| ApiError::Decode {
			url: collection_url.to_string(),
			source: serde_json::Error::custom(format!("envelope has no `{item_key}` list")),
		})?;

		debug!(url = %collection_url, item_key, count = links.len(), "resolved collection links");

		let fetches: FuturesUnordered<_> = links
			.into_iter()
			.map(|link| fetch_item(self.api.clone(), link))
			.collect();
		Ok(fetches.boxed())
	}
}

/// Accepts a list of links or a `name -> link` map.
pub(crate) fn extract_links(envelope: &Value, item_key: &str) -> Option<Vec<String>> {
	let entries = envelope
		.get(item_key)
		.or_else(|| envelope.get(FALLBACK_LINKS_KEY))?;

	let values: Vec<&Value> = match entries {
		Value::Array(items) => items.iter().collect(),
		Value::Object(map) => map.values().collect(),
		_ => return None,
	};

	Some(
		values
			.into_iter()
			.filter_map(|value| match value.as_str() {
				Some(link) => Some(link.to_string()),
				None => {
					warn!(item_key, value = %value, "ignoring non-string entry in links envelope");
					None
				}
			})
			.collect(),
	)
}

async fn fetch_item(api: ApiClient, link: String) -> ItemFetch {
	let url = match api.resolve_link(&link) {
		Ok(url) => url,
		Err(e) => {
			warn!(link = %link, error = %e, "skipping unusable item link");
			return ItemFetch {
				link,
				payload: None,
			};
		}
	};

	let payload = match api.get(url).await {
		Ok(response) if response.is_null() => {
			debug!(link = %link, "item payload is null, skipping");
			None
		}
		Ok(response) => match response.json::<Value>() {
			Ok(value) => Some(value),
			Err(e) => {
				warn!(link = %link, error = %e, "item payload is not JSON");
				None
			}
		},
		Err(e) => {
			warn!(link = %link, error = %e, "item fetch failed");
			None
		}
	};

	ItemFetch { link, payload }
}
