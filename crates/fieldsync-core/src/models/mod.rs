//! Data models for fieldsync

mod binary_item;
mod queue_item;
mod sync_conflict;
mod sync_state;

pub use binary_item::{BinaryItem, BinaryItemId, BinaryKind, BinaryStatus, ParentRef};
pub use queue_item::{
    Entity, HttpMethod, NewOperation, OperationKind, QueueItem, QueueItemId, Target,
    DEFAULT_PRIORITY,
};
pub use sync_conflict::{ConflictRecord, ConflictStrategy};
pub use sync_state::SyncState;
