//! Shared handle over the durable offline store.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    BinaryRepository, ConflictRepository, Database, LibSqlBinaryRepository,
    LibSqlConflictRepository, LibSqlQueueRepository, LibSqlSyncStateRepository, QueueRepository,
    SyncStateRepository,
};
use crate::models::{
    BinaryItem, BinaryItemId, BinaryKind, BinaryStatus, ConflictRecord, NewOperation, QueueItem,
    QueueItemId, SyncState,
};
use crate::{Error, Result};

/// Thread-safe handle for queue, capture, conflict, and sync-state storage.
///
/// Cloning shares the same underlying database. Every call takes the lock for
/// the duration of a single repository operation, so enqueues from the UI can
/// interleave with a running drain cycle without tearing either.
#[derive(Clone)]
pub struct OfflineStore {
    db: Arc<Mutex<Option<Database>>>,
    db_path: Option<PathBuf>,
}

impl OfflineStore {
    /// Open the store at the given filesystem path.
    ///
    /// Uploads interrupted by a crash are moved back to `pending`.
    pub async fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        let store = Self {
            db: Arc::new(Mutex::new(Some(db))),
            db_path: Some(db_path),
        };
        store.recover_interrupted_uploads().await?;
        Ok(store)
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(Some(db))),
            db_path: None,
        })
    }

    /// Close the store. Every later call fails with `StorageUnavailable`.
    pub async fn close(&self) {
        let mut slot = self.db.lock().await;
        if slot.take().is_some() {
            tracing::info!(
                "Closed offline store {}",
                self.db_path
                    .as_ref()
                    .map_or_else(|| ":memory:".to_string(), |path| path.display().to_string())
            );
        }
    }

    /// Whether the store is open.
    pub async fn is_open(&self) -> bool {
        self.db.lock().await.is_some()
    }

    fn require(slot: &Option<Database>) -> Result<&Database> {
        slot.as_ref()
            .ok_or_else(|| Error::StorageUnavailable("offline store is closed".to_string()))
    }

    // ---------------------------------------------------------------------
    // Mutation queue
    // ---------------------------------------------------------------------

    /// Durably persist a new operation and return its id.
    pub async fn enqueue(&self, operation: NewOperation) -> Result<QueueItemId> {
        let item = QueueItem::new(operation);
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlQueueRepository::new(db.connection())
            .insert(&item)
            .await?;
        tracing::debug!(
            "Enqueued {} {} (priority {})",
            item.kind,
            item.id,
            item.priority
        );
        Ok(item.id)
    }

    /// Fetch one queued item.
    pub async fn get_item(&self, id: &QueueItemId) -> Result<Option<QueueItem>> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlQueueRepository::new(db.connection()).get(id).await
    }

    /// All queued items in drain order.
    pub async fn list_ordered(&self) -> Result<Vec<QueueItem>> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlQueueRepository::new(db.connection())
            .list_ordered()
            .await
    }

    /// Overwrite a queued item's retry bookkeeping.
    pub async fn update_item(&self, item: &QueueItem) -> Result<()> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlQueueRepository::new(db.connection())
            .update(item)
            .await
    }

    /// Remove items in one transaction.
    pub async fn remove_many(&self, ids: &[QueueItemId]) -> Result<usize> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlQueueRepository::new(db.connection())
            .remove_many(ids)
            .await
    }

    /// Number of queued items.
    pub async fn count(&self) -> Result<usize> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlQueueRepository::new(db.connection()).count().await
    }

    /// Items that will not be retried automatically any more.
    pub async fn list_exceeding_retries(&self, max_retries: u32) -> Result<Vec<QueueItem>> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlQueueRepository::new(db.connection())
            .list_exceeding_retries(max_retries)
            .await
    }

    /// Operator retry: give an item a fresh retry budget.
    pub async fn retry_item(&self, id: &QueueItemId) -> Result<QueueItem> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        let repo = LibSqlQueueRepository::new(db.connection());

        let mut item = repo
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        item.retry_count = 0;
        item.last_error = None;
        repo.update(&item).await?;
        tracing::info!("Reset retry budget for {}", item.id);
        Ok(item)
    }

    /// Operator retry for every exhausted item at once.
    pub async fn retry_exhausted(&self, max_retries: u32) -> Result<usize> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        let repo = LibSqlQueueRepository::new(db.connection());

        let mut items = repo.list_exceeding_retries(max_retries).await?;
        for item in &mut items {
            item.retry_count = 0;
            item.last_error = None;
        }
        repo.update_many(&items).await?;
        Ok(items.len())
    }

    /// Operator discard: drop a pending mutation for good.
    pub async fn discard_item(&self, id: &QueueItemId) -> Result<()> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        let removed = LibSqlQueueRepository::new(db.connection())
            .remove_many(&[*id])
            .await?;
        if removed == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        tracing::warn!("Discarded queued operation {id}");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Photo and signature captures
    // ---------------------------------------------------------------------

    /// Persist a capture before any upload is attempted.
    pub async fn capture(&self, item: &BinaryItem) -> Result<BinaryItemId> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlBinaryRepository::new(db.connection(), item.kind)
            .insert(item)
            .await?;
        tracing::debug!(
            "Captured {} {} for {} {} ({} bytes)",
            item.kind,
            item.id,
            item.parent.entity,
            item.parent.id,
            item.size_bytes()
        );
        Ok(item.id)
    }

    /// Fetch one capture.
    pub async fn get_binary(
        &self,
        kind: BinaryKind,
        id: &BinaryItemId,
    ) -> Result<Option<BinaryItem>> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlBinaryRepository::new(db.connection(), kind)
            .get(id)
            .await
    }

    /// All captures of a kind, oldest first.
    pub async fn list_binaries(&self, kind: BinaryKind) -> Result<Vec<BinaryItem>> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlBinaryRepository::new(db.connection(), kind)
            .list_ordered()
            .await
    }

    /// Captures of a kind in one status.
    pub async fn list_binaries_by_status(
        &self,
        kind: BinaryKind,
        status: BinaryStatus,
    ) -> Result<Vec<BinaryItem>> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlBinaryRepository::new(db.connection(), kind)
            .list_by_status(status)
            .await
    }

    /// Captures of a kind attached to one parent record.
    pub async fn list_binaries_by_parent(
        &self,
        kind: BinaryKind,
        parent_id: &str,
    ) -> Result<Vec<BinaryItem>> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlBinaryRepository::new(db.connection(), kind)
            .list_by_parent(parent_id)
            .await
    }

    /// Captures of a kind whose retry budget is spent.
    pub async fn list_binaries_exceeding_retries(
        &self,
        kind: BinaryKind,
        max_retries: u32,
    ) -> Result<Vec<BinaryItem>> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlBinaryRepository::new(db.connection(), kind)
            .list_exceeding_retries(max_retries)
            .await
    }

    /// Number of captures of a kind.
    pub async fn count_binaries(&self, kind: BinaryKind) -> Result<usize> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlBinaryRepository::new(db.connection(), kind)
            .count()
            .await
    }

    /// Move a capture to `next`, rejecting backwards transitions.
    ///
    /// `Uploading` restarts progress, `Uploaded` completes it, and `Failed`
    /// spends one retry and records `error`.
    pub async fn transition_binary(
        &self,
        kind: BinaryKind,
        id: &BinaryItemId,
        next: BinaryStatus,
        error: Option<String>,
    ) -> Result<BinaryItem> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        let repo = LibSqlBinaryRepository::new(db.connection(), kind);

        let mut item = repo
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if !item.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                id: id.to_string(),
                from: item.status.to_string(),
                to: next.to_string(),
            });
        }

        item.status = next;
        match next {
            BinaryStatus::Uploading => {
                item.upload_progress = kind.tracks_progress().then_some(0);
            }
            BinaryStatus::Uploaded => {
                item.upload_progress = kind.tracks_progress().then_some(100);
                item.last_error = None;
            }
            BinaryStatus::Failed => {
                item.retry_count = item.retry_count.saturating_add(1);
                item.last_error = error;
            }
            BinaryStatus::Pending => {}
        }
        repo.update(&item).await?;
        Ok(item)
    }

    /// Record upload progress for a photo.
    pub async fn update_binary_progress(
        &self,
        kind: BinaryKind,
        id: &BinaryItemId,
        percent: u8,
    ) -> Result<()> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlBinaryRepository::new(db.connection(), kind)
            .update_progress(id, percent)
            .await
    }

    /// Operator retry of a failed upload: back to `pending` with a fresh budget.
    pub async fn retry_binary(&self, kind: BinaryKind, id: &BinaryItemId) -> Result<BinaryItem> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        let repo = LibSqlBinaryRepository::new(db.connection(), kind);

        let mut item = repo
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if !item.status.can_transition_to(BinaryStatus::Pending) {
            return Err(Error::InvalidTransition {
                id: id.to_string(),
                from: item.status.to_string(),
                to: BinaryStatus::Pending.to_string(),
            });
        }
        item.status = BinaryStatus::Pending;
        item.retry_count = 0;
        item.last_error = None;
        repo.update(&item).await?;
        Ok(item)
    }

    /// Remove captures in one transaction.
    pub async fn discard_binaries(&self, kind: BinaryKind, ids: &[BinaryItemId]) -> Result<usize> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlBinaryRepository::new(db.connection(), kind)
            .remove_many(ids)
            .await
    }

    /// Move uploads left in `uploading` by a crash back to `pending`.
    pub async fn recover_interrupted_uploads(&self) -> Result<usize> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;

        let mut recovered = 0;
        for kind in BinaryKind::ALL {
            recovered += LibSqlBinaryRepository::new(db.connection(), kind)
                .reset_status(BinaryStatus::Uploading, BinaryStatus::Pending)
                .await?;
        }
        if recovered > 0 {
            tracing::warn!("Recovered {recovered} interrupted uploads");
        }
        Ok(recovered)
    }

    // ---------------------------------------------------------------------
    // Conflict history
    // ---------------------------------------------------------------------

    /// Append a resolved conflict to history.
    pub async fn record_conflict(&self, record: &ConflictRecord) -> Result<ConflictRecord> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlConflictRepository::new(db.connection())
            .append(record)
            .await
    }

    /// Most recent conflicts first.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<ConflictRecord>> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlConflictRepository::new(db.connection())
            .list_recent(limit)
            .await
    }

    /// Conflicts recorded for one operation.
    pub async fn list_conflicts_for(
        &self,
        operation_id: &QueueItemId,
    ) -> Result<Vec<ConflictRecord>> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlConflictRepository::new(db.connection())
            .list_for_operation(&operation_id.as_str())
            .await
    }

    // ---------------------------------------------------------------------
    // Sync state
    // ---------------------------------------------------------------------

    /// Load sync bookkeeping.
    pub async fn sync_state(&self) -> Result<SyncState> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlSyncStateRepository::new(db.connection()).load().await
    }

    pub(crate) async fn mark_sync_attempt(&self, at: i64) -> Result<()> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlSyncStateRepository::new(db.connection())
            .mark_attempt(at)
            .await
    }

    pub(crate) async fn mark_sync_success(&self, at: i64) -> Result<SyncState> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlSyncStateRepository::new(db.connection())
            .mark_success(at)
            .await
    }

    pub(crate) async fn mark_sync_failure(&self) -> Result<SyncState> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlSyncStateRepository::new(db.connection())
            .mark_failure()
            .await
    }

    /// Forget sync history (e.g. after signing out).
    pub async fn reset_sync_state(&self) -> Result<()> {
        let slot = self.db.lock().await;
        let db = Self::require(&slot)?;
        LibSqlSyncStateRepository::new(db.connection())
            .reset()
            .await
    }
}
