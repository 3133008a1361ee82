// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The portal news feed. Unlike the resource collections, the news endpoint
//! returns the items inline, so the feed keeps server order and swaps the
//! whole list in once every author has been looked up.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use super::{CollectionSnapshot, SyncStatus};
use crate::error::ApiError;
use crate::http::ApiClient;
use crate::time::Timestamp;

#[derive(Debug, Clone, Deserialize)]
struct NewsItemPayload {
	#[serde(default)]
	title: Option<String>,
	#[serde(default)]
	content: Option<String>,
	#[serde(default)]
	created: Option<String>,
	#[serde(default)]
	modified: Option<String>,
	#[serde(default)]
	author_url: Option<String>,
	#[serde(flatten)]
	extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct AuthorPayload {
	#[serde(default)]
	name: Option<String>,
	#[serde(default)]
	username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsRecord {
	pub title: Option<String>,
	pub content: Option<String>,
	pub created: Timestamp,
	pub modified: Timestamp,
	pub author: Option<String>,
	pub author_url: Option<String>,
	/// Fields the feed does not interpret, passed through as received.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

#[derive(Debug, Default)]
struct NewsState {
	url: Option<Url>,
	records: Vec<NewsRecord>,
	generation: u64,
	status: SyncStatus,
}

#[derive(Clone)]
pub struct NewsFeed {
	api: ApiClient,
	state: Arc<RwLock<NewsState>>,
}

impl fmt::Debug for NewsFeed {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("NewsFeed").finish_non_exhaustive()
	}
}

impl NewsFeed {
	pub fn new(api: ApiClient) -> Self {
		Self {
			api,
			state: Arc::new(RwLock::new(NewsState::default())),
		}
	}

	pub async fn set_news_url(&self, url: Url) {
		self.state.write().await.url = Some(url);
	}

	pub async fn news_url(&self) -> Option<Url> {
		self.state.read().await.url.clone()
	}

	pub async fn records(&self) -> Vec<NewsRecord> {
		self.state.read().await.records.clone()
	}

	pub async fn status(&self) -> SyncStatus {
		self.state.read().await.status.clone()
	}

	/// Fetches the feed and each item's author, then replaces the list.
	pub async fn request_news(&self) -> Result<Vec<NewsRecord>, ApiError> {
		let (generation, url) = {
			let mut state = self.state.write().await;
			state.generation += 1;
			state.status = SyncStatus::Loading;
			(state.generation, state.url.clone())
		};

		let result = match url {
			Some(url) => self.fetch(&url).await,
			None => Err(ApiError::MissingLink("news_url")),
		};

		let mut state = self.state.write().await;
		if state.generation != generation {
			debug!(generation, "news request superseded");
			return result;
		}
		match &result {
			Ok(records) => {
				state.records = records.clone();
				state.status = SyncStatus::Ready;
				info!(count = records.len(), "news synchronized");
			}
			Err(e) => {
				warn!(error = %e, "news request failed");
				state.status = SyncStatus::Failed(e.to_string());
			}
		}
		result
	}

	pub async fn reset(&self) {
		let mut state = self.state.write().await;
		let generation = state.generation + 1;
		*state = NewsState {
			generation,
			..NewsState::default()
		};
	}

	pub async fn snapshot(&self) -> CollectionSnapshot<NewsRecord> {
		let state = self.state.read().await;
		CollectionSnapshot {
			link: state.url.clone(),
			records: state.records.clone(),
		}
	}

	pub async fn restore(&self, snapshot: CollectionSnapshot<NewsRecord>) {
		let mut state = self.state.write().await;
		state.generation += 1;
		state.url = snapshot.link;
		state.records = snapshot.records;
		state.status = if state.records.is_empty() {
			SyncStatus::Idle
		} else {
			SyncStatus::Ready
		};
	}

	async fn fetch(&self, url: &Url) -> Result<Vec<NewsRecord>, ApiError> {
		let items: Vec<Value> = self.api.get_json(url.clone()).await?;
		let now = Utc::now();

		let payloads: Vec<NewsItemPayload> = items
			.into_iter()
			.filter(|item| !item.is_null())
			.filter_map(|item| match serde_json::from_value(item) {
				Ok(payload) => Some(payload),
				Err(e) => {
					warn!(error = %e, "skipping malformed news item");
					None
				}
			})
			.collect();

		let authors = join_all(
			payloads
				.iter()
				.map(|item| self.author_name(item.author_url.as_deref())),
		)
		.await;

		Ok(payloads
			.into_iter()
			.zip(authors)
			.map(|(item, author)| news_record(item, author, now))
			.collect())
	}

	async fn author_name(&self, author_url: Option<&str>) -> Option<String> {
		let link = author_url?;
		let url = match self.api.resolve_link(link) {
			Ok(url) => url,
			Err(e) => {
				warn!(link, error = %e, "unusable author link");
				return None;
			}
		};
		match self.api.get_json::<AuthorPayload>(url).await {
			Ok(author) => author.name.or(author.username),
			Err(e) => {
				warn!(link, error = %e, "author lookup failed");
				None
			}
		}
	}
}

fn news_record(item: NewsItemPayload, author: Option<String>, now: DateTime<Utc>) -> NewsRecord {
	NewsRecord {
		created: Timestamp::parse(item.created.as_deref(), now),
		modified: Timestamp::parse(item.modified.as_deref(), now),
		title: item.title,
		content: item.content,
		author,
		author_url: item.author_url,
		extra: item.extra,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn record_passes_through_unknown_fields() {
		let item: NewsItemPayload = serde_json::from_value(json!({
			"title": "Maintenance",
			"content": "<p>Friday</p>",
			"created": "2024-01-01T00:00:00Z",
			"priority": 1,
			"author_url": "/users/7",
		}))
		.unwrap();

		let record = news_record(item, Some("Admin".to_string()), Utc::now());
		assert_eq!(record.title.as_deref(), Some("Maintenance"));
		assert_eq!(record.author.as_deref(), Some("Admin"));
		assert_eq!(record.extra["priority"], json!(1));
		assert!(record.created.at.is_some());
		assert!(record.modified.raw.is_none());
	}

	#[tokio::test]
	async fn request_without_url_fails_observably() {
		let base = Url::parse("http://portal.example/").unwrap();
		let api = ApiClient::with_http(reqwest::Client::new(), base.clone(), base);
		let feed = NewsFeed::new(api);

		let err = feed.request_news().await.unwrap_err();
		assert!(matches!(err, ApiError::MissingLink("news_url")));
		assert!(matches!(feed.status().await, SyncStatus::Failed(_)));
	}
}
