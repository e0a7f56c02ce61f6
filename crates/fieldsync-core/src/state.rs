//! UI-facing sync indicator.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::SyncState;

/// Unified sync badge state for host apps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Offline,
    Syncing,
    Synced,
    Pending,
    Error,
}

impl SyncStatus {
    /// Status of an idle, online engine.
    #[must_use]
    pub const fn derive(queue_count: usize, state: &SyncState) -> Self {
        if state.consecutive_failures > 0 {
            Self::Error
        } else if queue_count > 0 {
            Self::Pending
        } else {
            Self::Synced
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_streak_wins_over_pending() {
        let failing = SyncState {
            consecutive_failures: 2,
            ..SyncState::default()
        };
        assert_eq!(SyncStatus::derive(4, &failing), SyncStatus::Error);
        assert_eq!(
            SyncStatus::derive(4, &SyncState::default()),
            SyncStatus::Pending
        );
        assert_eq!(
            SyncStatus::derive(0, &SyncState::default()),
            SyncStatus::Synced
        );
    }
}
