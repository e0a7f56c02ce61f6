//! Cycle outcomes reported to callers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{BinaryItem, QueueItem};

/// Why an item, or a whole cycle, did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    /// Connectivity reported down.
    Offline,
    /// The durable store could not be used.
    StorageUnavailable,
    /// Timeout, connection failure, 5xx, 408 or 429.
    NetworkTransient,
    /// Version conflict that could not be settled.
    Conflict,
    /// A delete found nothing to delete.
    NotFoundOnDelete,
    /// Any other 4xx, or a request that cannot be built.
    TerminalClientError,
    /// Retry budget spent; waiting for manual retry or discard.
    MaxRetriesExceeded,
}

impl SyncErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::StorageUnavailable => "storage_unavailable",
            Self::NetworkTransient => "network_transient",
            Self::Conflict => "conflict",
            Self::NotFoundOnDelete => "not_found_on_delete",
            Self::TerminalClientError => "terminal_client_error",
            Self::MaxRetriesExceeded => "max_retries_exceeded",
        }
    }
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of `SyncResult::errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncError {
    /// Queue item or capture id; absent for cycle-level errors.
    pub item_id: Option<String>,
    pub kind: SyncErrorKind,
    pub message: String,
    /// Whether the engine will try again on a later cycle.
    pub retryable: bool,
}

impl SyncError {
    #[must_use]
    pub fn offline() -> Self {
        Self {
            item_id: None,
            kind: SyncErrorKind::Offline,
            message: "device is offline".to_string(),
            retryable: true,
        }
    }

    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self {
            item_id: None,
            kind: SyncErrorKind::StorageUnavailable,
            message: message.into(),
            retryable: true,
        }
    }

    #[must_use]
    pub fn for_item(
        item: &QueueItem,
        kind: SyncErrorKind,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            item_id: Some(item.id.to_string()),
            kind,
            message: message.into(),
            retryable,
        }
    }

    #[must_use]
    pub fn for_capture(
        item: &BinaryItem,
        kind: SyncErrorKind,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            item_id: Some(item.id.to_string()),
            kind,
            message: message.into(),
            retryable,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.item_id {
            Some(id) => write!(f, "{id}: {} ({})", self.message, self.kind),
            None => write!(f, "{} ({})", self.message, self.kind),
        }
    }
}

/// Aggregate outcome of one drain or upload cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: usize,
    pub failed: usize,
    pub conflicts: usize,
    pub errors: Vec<SyncError>,
    /// Stopped early by `abort()` or lost connectivity.
    pub aborted: bool,
}

impl SyncResult {
    /// Nothing was attempted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.success == 0 && self.failed == 0 && self.conflicts == 0 && self.errors.is_empty()
    }

    /// Finished with no failures and no cycle-level errors.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.errors.is_empty() && !self.aborted
    }

    pub(crate) fn fail(&mut self, error: SyncError) {
        self.failed += 1;
        self.errors.push(error);
    }
}
