//! Database layer for fieldsync

mod binary_repository;
mod conflict_repository;
mod connection;
mod migrations;
mod queue_repository;
mod sync_state_repository;

pub use binary_repository::{BinaryRepository, LibSqlBinaryRepository};
pub use conflict_repository::{ConflictRepository, LibSqlConflictRepository};
pub use connection::Database;
pub use queue_repository::{LibSqlQueueRepository, QueueRepository};
pub use sync_state_repository::{LibSqlSyncStateRepository, SyncStateRepository};
