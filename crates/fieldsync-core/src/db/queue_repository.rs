//! Durable mutation queue repository

use crate::error::{Error, Result};
use crate::models::{HttpMethod, QueueItem, QueueItemId, Target};
use libsql::{params, Connection};

const ITEM_COLUMNS: &str =
    "id, kind, entity, url, method, payload, enqueued_at, priority, retry_count, last_error";

/// Trait for queue storage operations (async)
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Persist a new item
    async fn insert(&self, item: &QueueItem) -> Result<()>;

    /// Get an item by ID
    async fn get(&self, id: &QueueItemId) -> Result<Option<QueueItem>>;

    /// All items in `(priority, enqueued_at, insertion)` order
    async fn list_ordered(&self) -> Result<Vec<QueueItem>>;

    /// Overwrite an item's mutable fields
    async fn update(&self, item: &QueueItem) -> Result<()>;

    /// Overwrite several items in one transaction
    async fn update_many(&self, items: &[QueueItem]) -> Result<()>;

    /// Remove several items in one transaction, returning how many existed
    async fn remove_many(&self, ids: &[QueueItemId]) -> Result<usize>;

    /// Number of queued items
    async fn count(&self) -> Result<usize>;

    /// Items whose retry budget is spent, in queue order
    async fn list_exceeding_retries(&self, max_retries: u32) -> Result<Vec<QueueItem>>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a queue item from a database row
    fn parse_item(row: &libsql::Row) -> Result<QueueItem> {
        let id: String = row.get(0)?;
        let kind: String = row.get(1)?;
        let entity: Option<String> = row.get(2)?;
        let url: Option<String> = row.get(3)?;
        let method: Option<String> = row.get(4)?;
        let payload: String = row.get(5)?;
        let retry_count: i64 = row.get(8)?;

        let target = match (entity, url, method) {
            (Some(entity), _, _) => Target::Entity {
                entity: entity.parse()?,
            },
            (None, Some(url), Some(method)) => Target::Raw {
                url,
                method: method.parse::<HttpMethod>()?,
            },
            _ => {
                return Err(Error::Database(format!(
                    "Queue item {id} has neither an entity nor a raw target"
                )))
            }
        };

        Ok(QueueItem {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid queue item id: {id}")))?,
            kind: kind.parse()?,
            target,
            payload: serde_json::from_str(&payload)?,
            enqueued_at: row.get(6)?,
            priority: row.get(7)?,
            retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
            last_error: row.get(9)?,
        })
    }

    async fn collect(&self, mut rows: libsql::Rows) -> Result<Vec<QueueItem>> {
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(Self::parse_item(&row)?);
        }
        Ok(items)
    }

    async fn write_update(&self, item: &QueueItem) -> Result<u64> {
        let rows = self
            .conn
            .execute(
                "UPDATE queue_items SET payload = ?, priority = ?, retry_count = ?, last_error = ? WHERE id = ?",
                params![
                    serde_json::to_string(&item.payload)?,
                    item.priority,
                    i64::from(item.retry_count),
                    item.last_error.clone(),
                    item.id.as_str()
                ],
            )
            .await?;
        Ok(rows)
    }
}

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn insert(&self, item: &QueueItem) -> Result<()> {
        let (entity, url, method) = match &item.target {
            Target::Entity { entity } => (Some(entity.as_str().to_string()), None, None),
            Target::Raw { url, method } => {
                (None, Some(url.clone()), Some(method.as_str().to_string()))
            }
        };

        self.conn
            .execute(
                "INSERT INTO queue_items (id, seq, kind, entity, url, method, payload, enqueued_at, priority, retry_count, last_error)
                 VALUES (?, (SELECT COALESCE(MAX(seq), 0) + 1 FROM queue_items), ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    item.id.as_str(),
                    item.kind.as_str(),
                    entity,
                    url,
                    method,
                    serde_json::to_string(&item.payload)?,
                    item.enqueued_at,
                    item.priority,
                    i64::from(item.retry_count),
                    item.last_error.clone()
                ],
            )
            .await?;

        Ok(())
    }

    async fn get(&self, id: &QueueItemId) -> Result<Option<QueueItem>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ITEM_COLUMNS} FROM queue_items WHERE id = ?"),
                [id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_item(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_ordered(&self) -> Result<Vec<QueueItem>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM queue_items ORDER BY priority ASC, enqueued_at ASC, seq ASC"
                ),
                (),
            )
            .await?;
        self.collect(rows).await
    }

    async fn update(&self, item: &QueueItem) -> Result<()> {
        if self.write_update(item).await? == 0 {
            return Err(Error::NotFound(item.id.to_string()));
        }
        Ok(())
    }

    async fn update_many(&self, items: &[QueueItem]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        for item in items {
            match self.write_update(item).await {
                Ok(0) => {
                    self.conn.execute("ROLLBACK", ()).await.ok();
                    return Err(Error::NotFound(item.id.to_string()));
                }
                Ok(_) => {}
                Err(e) => {
                    self.conn.execute("ROLLBACK", ()).await.ok();
                    return Err(e);
                }
            }
        }

        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove_many(&self, ids: &[QueueItemId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let mut removed = 0usize;
        for id in ids {
            match self
                .conn
                .execute("DELETE FROM queue_items WHERE id = ?", [id.as_str()])
                .await
            {
                Ok(rows) => removed += usize::try_from(rows).unwrap_or(0),
                Err(e) => {
                    self.conn.execute("ROLLBACK", ()).await.ok();
                    return Err(e.into());
                }
            }
        }

        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM queue_items", ())
            .await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn list_exceeding_retries(&self, max_retries: u32) -> Result<Vec<QueueItem>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM queue_items
                     WHERE retry_count >= ?
                     ORDER BY priority ASC, enqueued_at ASC, seq ASC"
                ),
                [i64::from(max_retries)],
            )
            .await?;
        self.collect(rows).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Entity, NewOperation, OperationKind};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn op(priority: i32, n: i64) -> QueueItem {
        QueueItem::new(
            NewOperation::entity(OperationKind::Create, Entity::Activity, json!({ "n": n }))
                .with_priority(priority),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_and_get_roundtrip() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let item = QueueItem::new(
            NewOperation::raw("/api/custom/sync", HttpMethod::Put, json!({"a": 1})).unwrap(),
        );
        repo.insert(&item).await.unwrap();

        let fetched = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(fetched, item);
        assert!(repo.get(&QueueItemId::new()).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_ordered_by_priority_then_time_then_insertion() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        // Same timestamp for every item so only priority and insertion order decide
        let mut items = vec![op(5, 0), op(1, 1), op(5, 2), op(3, 3), op(1, 4)];
        for item in &mut items {
            item.enqueued_at = 1_000;
            repo.insert(item).await.unwrap();
        }

        let ordered: Vec<i64> = repo
            .list_ordered()
            .await
            .unwrap()
            .iter()
            .map(|item| item.payload["n"].as_i64().unwrap())
            .collect();
        assert_eq!(ordered, vec![1, 4, 3, 0, 2]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_earlier_enqueue_wins_within_priority() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let mut late = op(2, 1);
        late.enqueued_at = 2_000;
        let mut early = op(2, 2);
        early.enqueued_at = 1_000;
        repo.insert(&late).await.unwrap();
        repo.insert(&early).await.unwrap();

        let ordered = repo.list_ordered().await.unwrap();
        assert_eq!(ordered[0].id, early.id);
        assert_eq!(ordered[1].id, late.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_in_place() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let mut item = op(5, 0);
        repo.insert(&item).await.unwrap();

        item.record_failure("HTTP 503", true, 5);
        repo.update(&item).await.unwrap();

        let fetched = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(fetched.retry_count, 1);
        assert_eq!(fetched.last_error.as_deref(), Some("HTTP 503"));

        let missing = op(5, 1);
        assert!(matches!(
            repo.update(&missing).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_many_is_all_or_nothing() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let mut stored = op(5, 0);
        repo.insert(&stored).await.unwrap();
        stored.retry_count = 4;
        let missing = op(5, 1);

        assert!(repo.update_many(&[stored.clone(), missing]).await.is_err());
        let fetched = repo.get(&stored.id).await.unwrap().unwrap();
        assert_eq!(fetched.retry_count, 0);

        repo.update_many(&[stored.clone()]).await.unwrap();
        let fetched = repo.get(&stored.id).await.unwrap().unwrap();
        assert_eq!(fetched.retry_count, 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove_many_and_count() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let items = [op(5, 0), op(5, 1), op(5, 2)];
        for item in &items {
            repo.insert(item).await.unwrap();
        }
        assert_eq!(repo.count().await.unwrap(), 3);

        let removed = repo
            .remove_many(&[items[0].id, items[2].id, QueueItemId::new()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.remove_many(&[]).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_exceeding_retries() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let fresh = op(5, 0);
        let mut spent = op(5, 1);
        spent.retry_count = 5;
        repo.insert(&fresh).await.unwrap();
        repo.insert(&spent).await.unwrap();

        let dead = repo.list_exceeding_retries(5).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, spent.id);
    }
}
