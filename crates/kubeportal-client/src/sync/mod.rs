// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Resource synchronizers.
//!
//! A [`Synchronizer`] owns one list of normalized records for a resource
//! kind. [`Synchronizer::request_all`] clears the list, starts a new
//! generation and appends records in the background as item fetches settle.
//! Records that arrive for a superseded generation are dropped.

mod deployments;
mod info;
mod ingresses;
mod news;
mod pods;
mod pvcs;
mod services;

pub use deployments::{DeploymentPayload, DeploymentRecord, Deployments};
pub use info::{ClusterInfo, InfoRecord};
pub use ingresses::{AnnotationPayload, IngressPayload, IngressRecord, Ingresses, PathPayload, RulePayload};
pub use news::{NewsFeed, NewsRecord};
pub use pods::{
	ContainerPayload, LogEntry, LogPage, PodLogState, PodPayload, PodRecord, Pods, VolumeMountPayload,
	VolumeRecord,
};
pub use pvcs::{PersistentVolumeClaims, PvcPayload, PvcRecord, StorageClassState, DEFAULT_STORAGE_CLASS};
pub use services::{PortPayload, SelectorPayload, ServicePayload, ServiceRecord, Services};

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ApiError, SyncError};
use crate::http::{ApiClient, ApiResponse};
use crate::resolver::{ItemStream, LinkResolver};

/// Describes one kind of collection and how its payloads become records.
pub trait ResourceKind: Send + Sync + 'static {
	const NAME: &'static str;
	/// Name of the link that points at the collection, e.g. `pods_url`.
	const LINK_NAME: &'static str;
	/// Key of the link list inside the collection envelope.
	const ITEMS_KEY: &'static str;

	type Payload: DeserializeOwned + Send;
	type Record: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static;
	/// Kind-specific state kept alongside the records.
	type Extra: Default + fmt::Debug + Send + Sync + 'static;

	/// Returning `None` skips the item.
	fn normalize(payload: Self::Payload, now: DateTime<Utc>) -> Option<Self::Record>;

	/// Called with the record's position as it is appended.
	fn on_append(_record: &mut Self::Record, _index: usize) {}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SyncStatus {
	#[default]
	Idle,
	Loading,
	Ready,
	Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
	pub generation: u64,
	pub fetched: usize,
	pub skipped: usize,
	/// A later `request_all` started before this one finished.
	pub superseded: bool,
}

/// Completion handle for one population run. Dropping it does not stop
/// the run.
#[derive(Debug)]
pub struct SyncHandle {
	generation: u64,
	task: JoinHandle<SyncReport>,
}

impl SyncHandle {
	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub async fn settled(self) -> Result<SyncReport, SyncError> {
		Ok(self.task.await?)
	}
}

/// Serializable view of a synchronizer used for state snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSnapshot<R> {
	pub link: Option<Url>,
	pub records: Vec<R>,
}

impl<R> Default for CollectionSnapshot<R> {
	fn default() -> Self {
		Self {
			link: None,
			records: Vec::new(),
		}
	}
}

pub(crate) struct SyncState<K: ResourceKind> {
	pub(crate) link: Option<Url>,
	pub(crate) records: Vec<K::Record>,
	pub(crate) generation: u64,
	pub(crate) status: SyncStatus,
	pub(crate) skipped: usize,
	pub(crate) extra: K::Extra,
}

impl<K: ResourceKind> Default for SyncState<K> {
	fn default() -> Self {
		Self {
			link: None,
			records: Vec::new(),
			generation: 0,
			status: SyncStatus::Idle,
			skipped: 0,
			extra: K::Extra::default(),
		}
	}
}

struct SyncInner<K: ResourceKind> {
	api: ApiClient,
	resolver: LinkResolver,
	state: RwLock<SyncState<K>>,
}

pub struct Synchronizer<K: ResourceKind> {
	inner: Arc<SyncInner<K>>,
}

impl<K: ResourceKind> Clone for Synchronizer<K> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<K: ResourceKind> fmt::Debug for Synchronizer<K> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Synchronizer").field("kind", &K::NAME).finish()
	}
}

impl<K: ResourceKind> Synchronizer<K> {
	pub fn new(api: ApiClient) -> Self {
		Self {
			inner: Arc::new(SyncInner {
				resolver: LinkResolver::new(api.clone()),
				api,
				state: RwLock::new(SyncState::default()),
			}),
		}
	}

	pub(crate) fn api(&self) -> &ApiClient {
		&self.inner.api
	}

	pub(crate) fn state(&self) -> &RwLock<SyncState<K>> {
		&self.inner.state
	}

	pub async fn set_collection_link(&self, url: Url) {
		debug!(kind = K::NAME, url = %url, "collection link set");
		self.inner.state.write().await.link = Some(url);
	}

	pub async fn collection_link(&self) -> Option<Url> {
		self.inner.state.read().await.link.clone()
	}

	pub async fn records(&self) -> Vec<K::Record> {
		self.inner.state.read().await.records.clone()
	}

	pub async fn status(&self) -> SyncStatus {
		self.inner.state.read().await.status.clone()
	}

	/// Items skipped in the current generation.
	pub async fn skipped(&self) -> usize {
		self.inner.state.read().await.skipped
	}

	pub async fn generation(&self) -> u64 {
		self.inner.state.read().await.generation
	}

	/// Clears the list and repopulates it from the collection link.
	///
	/// The list is empty when this returns; records appear as item fetches
	/// settle, in no particular order. Await the handle to observe the end
	/// of the run.
	pub async fn request_all(&self) -> Result<SyncHandle, SyncError> {
		let (generation, link) = {
			let mut state = self.inner.state.write().await;
			state.records.clear();
			state.skipped = 0;
			state.generation += 1;
			state.status = SyncStatus::Loading;
			(state.generation, state.link.clone())
		};

		let Some(link) = link else {
			self.fail(generation, "collection link not set").await;
			return Err(ApiError::MissingLink(K::LINK_NAME).into());
		};

		debug!(kind = K::NAME, generation, url = %link, "requesting collection");

		let stream = match self
			.inner
			.resolver
			.resolve_collection(&link, K::ITEMS_KEY)
			.await
		{
			Ok(stream) => stream,
			Err(e) => {
				warn!(kind = K::NAME, generation, error = %e, "collection request failed");
				self.fail(generation, e.to_string()).await;
				return Err(e.into());
			}
		};

		let this = self.clone();
		let task = tokio::spawn(async move { this.populate(generation, stream).await });
		Ok(SyncHandle { generation, task })
	}

	/// POSTs a new item. The list is not touched; call `request_all`
	/// afterwards to observe it.
	pub async fn create(&self, payload: Value) -> Result<ApiResponse, SyncError> {
		let link = self
			.collection_link()
			.await
			.ok_or(ApiError::MissingLink(K::LINK_NAME))?;
		info!(kind = K::NAME, url = %link, "creating resource");
		Ok(self.inner.api.post(link, payload).await?)
	}

	/// Forgets the link, the records and any kind-specific state. In-flight
	/// population runs are superseded.
	pub async fn reset(&self) {
		let mut state = self.inner.state.write().await;
		let generation = state.generation + 1;
		*state = SyncState {
			generation,
			..SyncState::default()
		};
		debug!(kind = K::NAME, generation, "synchronizer reset");
	}

	/// Like [`Self::reset`] but keeps the kind-specific state.
	pub async fn clear_collection(&self) {
		let mut state = self.inner.state.write().await;
		state.link = None;
		state.records.clear();
		state.skipped = 0;
		state.generation += 1;
		state.status = SyncStatus::Idle;
		debug!(kind = K::NAME, generation = state.generation, "collection cleared");
	}

	pub async fn snapshot(&self) -> CollectionSnapshot<K::Record> {
		let state = self.inner.state.read().await;
		CollectionSnapshot {
			link: state.link.clone(),
			records: state.records.clone(),
		}
	}

	pub async fn restore(&self, snapshot: CollectionSnapshot<K::Record>) {
		let mut state = self.inner.state.write().await;
		state.generation += 1;
		state.link = snapshot.link;
		state.records = snapshot.records;
		state.skipped = 0;
		state.status = if state.records.is_empty() {
			SyncStatus::Idle
		} else {
			SyncStatus::Ready
		};
	}

	async fn fail(&self, generation: u64, reason: impl Into<String>) {
		let mut state = self.inner.state.write().await;
		if state.generation == generation {
			state.status = SyncStatus::Failed(reason.into());
		}
	}

	pub(crate) async fn populate(self, generation: u64, mut stream: ItemStream) -> SyncReport {
		let mut report = SyncReport {
			generation,
			..SyncReport::default()
		};
		let now = Utc::now();

		while let Some(item) = stream.next().await {
			let record = item
				.payload
				.and_then(|payload| decode::<K>(&item.link, payload, now));

			let mut state = self.inner.state.write().await;
			if state.generation != generation {
				report.superseded = true;
				break;
			}
			match record {
				Some(mut record) => {
					let index = state.records.len();
					K::on_append(&mut record, index);
					state.records.push(record);
					report.fetched += 1;
				}
				None => {
					state.skipped += 1;
					report.skipped += 1;
				}
			}
		}

		if !report.superseded {
			let mut state = self.inner.state.write().await;
			if state.generation == generation {
				state.status = SyncStatus::Ready;
			} else {
				report.superseded = true;
			}
		}

		if report.superseded {
			debug!(kind = K::NAME, generation, "population superseded, late results dropped");
		} else {
			info!(
				kind = K::NAME,
				generation,
				fetched = report.fetched,
				skipped = report.skipped,
				"collection synchronized"
			);
		}
		report
	}
}

fn decode<K: ResourceKind>(link: &str, payload: Value, now: DateTime<Utc>) -> Option<K::Record> {
	match serde_json::from_value::<K::Payload>(payload) {
		Ok(payload) => {
			let record = K::normalize(payload, now);
			if record.is_none() {
				debug!(kind = K::NAME, link, "payload has nothing to show, skipping");
			}
			record
		}
		Err(e) => {
			warn!(kind = K::NAME, link, error = %e, "payload does not match the expected shape");
			None
		}
	}
}

/// Every synchronizer's link and records, as persisted between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourcesSnapshot {
	#[serde(default)]
	pub pods: CollectionSnapshot<PodRecord>,
	#[serde(default)]
	pub deployments: CollectionSnapshot<DeploymentRecord>,
	#[serde(default)]
	pub services: CollectionSnapshot<ServiceRecord>,
	#[serde(default)]
	pub ingresses: CollectionSnapshot<IngressRecord>,
	#[serde(default)]
	pub pvcs: CollectionSnapshot<PvcRecord>,
	#[serde(default)]
	pub cluster_info: CollectionSnapshot<InfoRecord>,
	#[serde(default)]
	pub news: CollectionSnapshot<NewsRecord>,
	#[serde(default)]
	pub storageclasses_url: Option<Url>,
	#[serde(default)]
	pub storageclasses: Vec<String>,
}

/// One synchronizer per collection, all sharing the same client.
#[derive(Debug, Clone)]
pub struct Synchronizers {
	pub pods: Synchronizer<Pods>,
	pub deployments: Synchronizer<Deployments>,
	pub services: Synchronizer<Services>,
	pub ingresses: Synchronizer<Ingresses>,
	pub pvcs: Synchronizer<PersistentVolumeClaims>,
	pub cluster_info: Synchronizer<ClusterInfo>,
	pub news: NewsFeed,
}

impl Synchronizers {
	pub fn new(api: ApiClient) -> Self {
		Self {
			pods: Synchronizer::new(api.clone()),
			deployments: Synchronizer::new(api.clone()),
			services: Synchronizer::new(api.clone()),
			ingresses: Synchronizer::new(api.clone()),
			pvcs: Synchronizer::new(api.clone()),
			cluster_info: Synchronizer::new(api.clone()),
			news: NewsFeed::new(api),
		}
	}

	pub async fn snapshot(&self) -> ResourcesSnapshot {
		ResourcesSnapshot {
			pods: self.pods.snapshot().await,
			deployments: self.deployments.snapshot().await,
			services: self.services.snapshot().await,
			ingresses: self.ingresses.snapshot().await,
			pvcs: self.pvcs.snapshot().await,
			cluster_info: self.cluster_info.snapshot().await,
			news: self.news.snapshot().await,
			storageclasses_url: self.pvcs.storageclasses_url().await,
			storageclasses: self.pvcs.storageclasses().await,
		}
	}

	pub async fn restore(&self, snapshot: ResourcesSnapshot) {
		self.pods.restore(snapshot.pods).await;
		self.deployments.restore(snapshot.deployments).await;
		self.services.restore(snapshot.services).await;
		self.ingresses.restore(snapshot.ingresses).await;
		self.pvcs.restore(snapshot.pvcs).await;
		self
			.pvcs
			.restore_storageclasses(snapshot.storageclasses_url, snapshot.storageclasses)
			.await;
		self.cluster_info.restore(snapshot.cluster_info).await;
		self.news.restore(snapshot.news).await;
	}

	pub async fn reset_all(&self) {
		self.pods.reset().await;
		self.deployments.reset().await;
		self.services.reset().await;
		self.ingresses.reset().await;
		self.pvcs.reset().await;
		self.cluster_info.reset().await;
		self.news.reset().await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::resolver::ItemFetch;
	use futures::stream;
	use serde_json::json;

	#[derive(Debug)]
	struct Widgets;

	#[derive(Debug, Deserialize)]
	struct WidgetPayload {
		name: String,
	}

	#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
	struct WidgetRecord {
		name: String,
		position: usize,
	}

	impl ResourceKind for Widgets {
		const NAME: &'static str = "widget";
		const LINK_NAME: &'static str = "widgets_url";
		const ITEMS_KEY: &'static str = "widget_urls";

		type Payload = WidgetPayload;
		type Record = WidgetRecord;
		type Extra = ();

		fn normalize(payload: WidgetPayload, _now: DateTime<Utc>) -> Option<WidgetRecord> {
			(!payload.name.is_empty()).then_some(WidgetRecord {
				name: payload.name,
				position: usize::MAX,
			})
		}

		fn on_append(record: &mut WidgetRecord, index: usize) {
			record.position = index;
		}
	}

	fn synchronizer() -> Synchronizer<Widgets> {
		let base = Url::parse("http://portal.example/").unwrap();
		let manifest = base.join("api/v2.3.0/").unwrap();
		Synchronizer::new(ApiClient::with_http(reqwest::Client::new(), base, manifest))
	}

	fn items(payloads: Vec<Option<Value>>) -> ItemStream {
		stream::iter(payloads.into_iter().enumerate().map(|(i, payload)| ItemFetch {
			link: format!("/widgets/{i}"),
			payload,
		}))
		.boxed()
	}

	async fn begin_generation(sync: &Synchronizer<Widgets>) -> u64 {
		let mut state = sync.state().write().await;
		state.generation += 1;
		state.status = SyncStatus::Loading;
		state.generation
	}

	#[tokio::test]
	async fn populate_appends_payloads_and_counts_skips() {
		let sync = synchronizer();
		let generation = begin_generation(&sync).await;

		let report = sync
			.clone()
			.populate(
				generation,
				items(vec![
					Some(json!({ "name": "a" })),
					None,
					Some(json!({ "name": "" })),
					Some(json!({ "unexpected": true })),
					Some(json!({ "name": "b" })),
				]),
			)
			.await;

		assert_eq!(report.fetched, 2);
		assert_eq!(report.skipped, 3);
		assert!(!report.superseded);
		assert_eq!(sync.status().await, SyncStatus::Ready);
		assert_eq!(sync.skipped().await, 3);

		let records = sync.records().await;
		assert_eq!(records.len(), 2);
		assert_eq!(records[0].position, 0);
		assert_eq!(records[1].position, 1);
	}

	#[tokio::test]
	async fn superseded_generation_appends_nothing() {
		let sync = synchronizer();
		let stale = begin_generation(&sync).await;
		begin_generation(&sync).await;

		let report = sync
			.clone()
			.populate(stale, items(vec![Some(json!({ "name": "late" }))]))
			.await;

		assert!(report.superseded);
		assert_eq!(report.fetched, 0);
		assert!(sync.records().await.is_empty());
		assert_eq!(sync.status().await, SyncStatus::Loading);
	}

	#[tokio::test]
	async fn request_all_without_link_fails_observably() {
		let sync = synchronizer();
		let err = sync.request_all().await.unwrap_err();
		assert!(matches!(err, SyncError::Api(ApiError::MissingLink("widgets_url"))));
		assert!(matches!(sync.status().await, SyncStatus::Failed(_)));
	}

	#[tokio::test]
	async fn reset_forgets_link_and_supersedes() {
		let sync = synchronizer();
		sync
			.set_collection_link(Url::parse("http://portal.example/widgets/").unwrap())
			.await;
		let generation = begin_generation(&sync).await;

		sync.reset().await;

		assert!(sync.collection_link().await.is_none());
		assert!(sync.generation().await > generation);
		assert_eq!(sync.status().await, SyncStatus::Idle);
	}

	#[tokio::test]
	async fn clear_collection_drops_link_and_records() {
		let sync = synchronizer();
		sync
			.restore(CollectionSnapshot {
				link: Some(Url::parse("http://portal.example/widgets/").unwrap()),
				records: vec![WidgetRecord {
					name: "old".to_string(),
					position: 0,
				}],
			})
			.await;
		let generation = sync.generation().await;

		sync.clear_collection().await;

		assert!(sync.collection_link().await.is_none());
		assert!(sync.records().await.is_empty());
		assert!(sync.generation().await > generation);
	}

	#[tokio::test]
	async fn snapshot_restores_records() {
		let sync = synchronizer();
		let snapshot = CollectionSnapshot {
			link: Some(Url::parse("http://portal.example/widgets/").unwrap()),
			records: vec![WidgetRecord {
				name: "kept".to_string(),
				position: 0,
			}],
		};

		sync.restore(snapshot).await;

		assert_eq!(sync.status().await, SyncStatus::Ready);
		assert_eq!(sync.snapshot().await.records[0].name, "kept");
	}

	#[test]
	fn sync_status_serializes_with_reason() {
		let failed = serde_json::to_value(SyncStatus::Failed("boom".to_string())).unwrap();
		assert_eq!(failed, json!({ "status": "failed", "reason": "boom" }));
		let ready = serde_json::to_value(SyncStatus::Ready).unwrap();
		assert_eq!(ready, json!({ "status": "ready" }));
	}
}
