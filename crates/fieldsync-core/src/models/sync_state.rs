//! Persisted sync bookkeeping

use serde::{Deserialize, Serialize};

use crate::sync::BackoffPolicy;

/// Singleton record of drain-cycle history, written only by the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Start of the most recent drain cycle (unix ms)
    pub last_sync_attempt: Option<i64>,
    /// End of the most recent cycle that finished without failures (unix ms)
    pub last_successful_sync: Option<i64>,
    /// Cycles in a row that ended with at least one failure
    pub consecutive_failures: u32,
    /// Set once the first cycle has completed cleanly
    pub is_initialized: bool,
}

impl SyncState {
    /// Earliest time an automatic cycle should start again, given the
    /// failure streak. `None` when there is no streak to cool down from.
    #[must_use]
    pub fn next_attempt_at(&self, backoff: &BackoffPolicy) -> Option<i64> {
        if self.consecutive_failures == 0 {
            return None;
        }
        let last_attempt = self.last_sync_attempt?;
        let delay = backoff.base_delay(self.consecutive_failures);
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        Some(last_attempt.saturating_add(delay_ms))
    }
}
