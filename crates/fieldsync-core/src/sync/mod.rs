//! Offline queue draining: dispatch, retry, conflicts, and media upload.

mod backoff;
mod conflict;
mod connectivity;
mod dispatch;
mod engine;
mod events;
mod http;
mod media;
mod result;

pub use backoff::BackoffPolicy;
pub use conflict::{ConflictAction, ConflictResolver, Resolution};
pub use connectivity::{Connectivity, NetworkMonitor};
pub use dispatch::{
    build_request, classify, resolve_request, Dispatcher, Outcome, RemoteRequest, RemoteResponse,
    RequestBody, TransportError,
};
pub use engine::SyncEngine;
pub use events::SyncEvent;
pub use http::HttpDispatcher;
pub use media::upload_url;
pub use result::{SyncError, SyncErrorKind, SyncResult};
