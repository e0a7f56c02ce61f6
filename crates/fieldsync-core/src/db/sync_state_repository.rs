//! Sync state repository implementation

use crate::error::Result;
use crate::models::SyncState;
use libsql::{params, Connection};

/// Trait for sync bookkeeping operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncStateRepository {
    /// Load the singleton state
    async fn load(&self) -> Result<SyncState>;

    /// Record the start of a drain cycle
    async fn mark_attempt(&self, at: i64) -> Result<()>;

    /// Record a cycle that finished without failures
    async fn mark_success(&self, at: i64) -> Result<SyncState>;

    /// Record a cycle that finished with failures
    async fn mark_failure(&self) -> Result<SyncState>;

    /// Forget all history
    async fn reset(&self) -> Result<()>;
}

/// libSQL implementation of `SyncStateRepository`
pub struct LibSqlSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncStateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SyncStateRepository for LibSqlSyncStateRepository<'_> {
    async fn load(&self) -> Result<SyncState> {
        let mut rows = self
            .conn
            .query(
                "SELECT last_sync_attempt, last_successful_sync, consecutive_failures, is_initialized
                 FROM sync_state WHERE id = 1",
                (),
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(SyncState::default());
        };

        let failures: i64 = row.get(2)?;
        let initialized: i64 = row.get(3)?;
        Ok(SyncState {
            last_sync_attempt: row.get(0)?,
            last_successful_sync: row.get(1)?,
            consecutive_failures: u32::try_from(failures).unwrap_or(u32::MAX),
            is_initialized: initialized != 0,
        })
    }

    async fn mark_attempt(&self, at: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_state (id, last_sync_attempt) VALUES (1, ?)
                 ON CONFLICT(id) DO UPDATE SET last_sync_attempt = excluded.last_sync_attempt",
                [at],
            )
            .await?;
        Ok(())
    }

    async fn mark_success(&self, at: i64) -> Result<SyncState> {
        self.conn
            .execute(
                "INSERT INTO sync_state (id, last_successful_sync, consecutive_failures, is_initialized)
                 VALUES (1, ?, 0, 1)
                 ON CONFLICT(id) DO UPDATE SET
                    last_successful_sync = excluded.last_successful_sync,
                    consecutive_failures = 0,
                    is_initialized = 1",
                params![at],
            )
            .await?;
        self.load().await
    }

    async fn mark_failure(&self) -> Result<SyncState> {
        self.conn
            .execute(
                "INSERT INTO sync_state (id, consecutive_failures) VALUES (1, 1)
                 ON CONFLICT(id) DO UPDATE SET consecutive_failures = consecutive_failures + 1",
                (),
            )
            .await?;
        self.load().await
    }

    async fn reset(&self) -> Result<()> {
        self.conn
            .execute(
                "UPDATE sync_state SET last_sync_attempt = NULL, last_successful_sync = NULL,
                    consecutive_failures = 0, is_initialized = 0 WHERE id = 1",
                (),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_default_state() {
        let db = setup().await;
        let repo = LibSqlSyncStateRepository::new(db.connection());

        let state = repo.load().await.unwrap();
        assert_eq!(state, SyncState::default());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failure_streak_resets_on_success() {
        let db = setup().await;
        let repo = LibSqlSyncStateRepository::new(db.connection());

        repo.mark_attempt(100).await.unwrap();
        repo.mark_failure().await.unwrap();
        let state = repo.mark_failure().await.unwrap();
        assert_eq!(state.consecutive_failures, 2);
        assert_eq!(state.last_sync_attempt, Some(100));
        assert!(!state.is_initialized);

        repo.mark_attempt(200).await.unwrap();
        let state = repo.mark_success(250).await.unwrap();
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.last_sync_attempt, Some(200));
        assert_eq!(state.last_successful_sync, Some(250));
        assert!(state.is_initialized);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reset() {
        let db = setup().await;
        let repo = LibSqlSyncStateRepository::new(db.connection());

        repo.mark_attempt(100).await.unwrap();
        repo.mark_success(120).await.unwrap();
        repo.reset().await.unwrap();
        assert_eq!(repo.load().await.unwrap(), SyncState::default());
    }
}
