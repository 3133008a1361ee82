// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client-side session and data synchronization for the kubeportal API.

pub mod error;
pub mod http;
pub mod model;
pub mod probe;
pub mod resolver;
pub mod session;
pub mod store;
pub mod sync;
pub mod time;

pub use error::*;
pub use http::{ApiClient, ApiRequest, ApiResponse, CSRF_HEADER};
pub use model::*;
pub use probe::{AvailabilityProber, ProbeResult, ProbeStatus};
pub use resolver::{ItemFetch, ItemStream, LinkResolver};
pub use session::{Credentials, Session, SessionManager, SessionStatus, SharedSession};
pub use store::{FileStateStore, MemoryStateStore, StateSnapshot, StateStore, STATE_KEY};
pub use sync::{ResourceKind, SyncHandle, SyncReport, SyncStatus, Synchronizer, Synchronizers};
pub use time::Timestamp;
