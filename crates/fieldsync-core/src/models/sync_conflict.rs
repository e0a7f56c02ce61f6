//! Sync conflict model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

use super::queue_item::Entity;

/// How a version conflict was (or will be) resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Server state supersedes the queued local change
    #[default]
    ServerWins,
    /// Local change is re-sent on top of the server's version
    LocalWins,
    /// Server state overlaid with the locally changed fields
    Merged,
}

impl ConflictStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ServerWins => "server_wins",
            Self::LocalWins => "local_wins",
            Self::Merged => "merged",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "server_wins" => Ok(Self::ServerWins),
            "local_wins" => Ok(Self::LocalWins),
            "merged" | "merge" => Ok(Self::Merged),
            other => Err(Error::InvalidInput(format!(
                "Unknown conflict strategy: {other}"
            ))),
        }
    }
}

/// Append-only record of a resolved version conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Conflict row identifier (0 until persisted)
    pub id: i64,
    /// Queued operation that hit the conflict
    pub operation_id: String,
    /// Entity type, absent for raw requests
    pub entity: Option<Entity>,
    /// Local payload as it was sent
    pub local_payload: serde_json::Value,
    /// Server's current representation from the conflict response
    pub server_payload: Option<serde_json::Value>,
    /// Resolution taken
    pub resolution: ConflictStrategy,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
}
