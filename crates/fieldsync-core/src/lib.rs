//! fieldsync-core - Offline sync engine for field-service devices
//!
//! Queues mutations and captured media durably on the device while it is
//! offline, then drains them to the CRM API in priority order once
//! connectivity returns, with bounded retries and deterministic conflict
//! resolution.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
mod util;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use models::{NewOperation, QueueItem, QueueItemId};
pub use services::OfflineStore;
pub use state::SyncStatus;
pub use sync::{HttpDispatcher, NetworkMonitor, SyncEngine, SyncEvent, SyncResult};
