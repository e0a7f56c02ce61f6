//! Events published while the engine works.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{BinaryKind, ConflictRecord, Entity, OperationKind};

use super::result::{SyncError, SyncResult};

/// Progress notifications for UI subscribers.
///
/// Delivered over a broadcast channel; dropping the receiver unsubscribes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    SyncStart {
        pending: usize,
    },
    SyncComplete {
        result: SyncResult,
    },
    SyncError {
        error: SyncError,
    },
    ItemSynced {
        item_id: String,
        kind: OperationKind,
        entity: Option<Entity>,
    },
    ItemFailed {
        error: SyncError,
        retry_count: u32,
    },
    ConflictDetected {
        item_id: String,
        entity: Option<Entity>,
        server_payload: Option<Value>,
    },
    ConflictResolved {
        record: ConflictRecord,
    },
    MediaUploaded {
        item_id: String,
        kind: BinaryKind,
    },
    MediaFailed {
        kind: BinaryKind,
        error: SyncError,
    },
}

impl SyncEvent {
    /// Wire name of the event type.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SyncStart { .. } => "sync_start",
            Self::SyncComplete { .. } => "sync_complete",
            Self::SyncError { .. } => "sync_error",
            Self::ItemSynced { .. } => "item_synced",
            Self::ItemFailed { .. } => "item_failed",
            Self::ConflictDetected { .. } => "conflict_detected",
            Self::ConflictResolved { .. } => "conflict_resolved",
            Self::MediaUploaded { .. } => "media_uploaded",
            Self::MediaFailed { .. } => "media_failed",
        }
    }
}
