//! Photo and signature capture queues

use crate::error::{Error, Result};
use crate::models::{BinaryItem, BinaryItemId, BinaryKind, BinaryStatus, ParentRef};
use libsql::{params, Connection};

const BINARY_COLUMNS: &str = "id, parent_entity, parent_id, mime_type, data, status, upload_progress, retry_count, last_error, captured_at";

/// Trait for capture queue operations (async)
#[allow(async_fn_in_trait)]
pub trait BinaryRepository {
    /// Persist a fresh capture
    async fn insert(&self, item: &BinaryItem) -> Result<()>;

    /// Get a capture by ID
    async fn get(&self, id: &BinaryItemId) -> Result<Option<BinaryItem>>;

    /// All captures, oldest first
    async fn list_ordered(&self) -> Result<Vec<BinaryItem>>;

    /// Captures in the given status, oldest first
    async fn list_by_status(&self, status: BinaryStatus) -> Result<Vec<BinaryItem>>;

    /// Captures attached to a parent record, oldest first
    async fn list_by_parent(&self, parent_id: &str) -> Result<Vec<BinaryItem>>;

    /// Overwrite status, progress, and retry bookkeeping
    async fn update(&self, item: &BinaryItem) -> Result<()>;

    /// Set upload progress percentage (clamped to 100)
    async fn update_progress(&self, id: &BinaryItemId, percent: u8) -> Result<()>;

    /// Move every capture in `from` to `to`, returning how many moved
    async fn reset_status(&self, from: BinaryStatus, to: BinaryStatus) -> Result<usize>;

    /// Remove several captures in one transaction
    async fn remove_many(&self, ids: &[BinaryItemId]) -> Result<usize>;

    /// Number of captures
    async fn count(&self) -> Result<usize>;

    /// Captures whose retry budget is spent
    async fn list_exceeding_retries(&self, max_retries: u32) -> Result<Vec<BinaryItem>>;
}

/// libSQL implementation of `BinaryRepository`, one per capture kind
pub struct LibSqlBinaryRepository<'a> {
    conn: &'a Connection,
    kind: BinaryKind,
}

impl<'a> LibSqlBinaryRepository<'a> {
    /// Create a repository over the queue for `kind`
    pub const fn new(conn: &'a Connection, kind: BinaryKind) -> Self {
        Self { conn, kind }
    }

    fn parse_item(&self, row: &libsql::Row) -> Result<BinaryItem> {
        let id: String = row.get(0)?;
        let parent_entity: String = row.get(1)?;
        let status: String = row.get(5)?;
        let progress: Option<i64> = row.get(6)?;
        let retry_count: i64 = row.get(7)?;

        Ok(BinaryItem {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid capture id: {id}")))?,
            kind: self.kind,
            parent: ParentRef {
                entity: parent_entity.parse()?,
                id: row.get(2)?,
            },
            mime_type: row.get(3)?,
            data: row.get(4)?,
            status: status.parse()?,
            upload_progress: progress.map(|value| u8::try_from(value.clamp(0, 100)).unwrap_or(100)),
            retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
            last_error: row.get(8)?,
            captured_at: row.get(9)?,
        })
    }

    async fn select(&self, filter: &str, param: Option<libsql::Value>) -> Result<Vec<BinaryItem>> {
        let sql = format!(
            "SELECT {BINARY_COLUMNS} FROM {} {filter} ORDER BY captured_at ASC, rowid ASC",
            self.kind.table()
        );
        let mut rows = match param {
            Some(value) => self.conn.query(&sql, [value]).await?,
            None => self.conn.query(&sql, ()).await?,
        };

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(self.parse_item(&row)?);
        }
        Ok(items)
    }
}

impl BinaryRepository for LibSqlBinaryRepository<'_> {
    async fn insert(&self, item: &BinaryItem) -> Result<()> {
        if item.kind != self.kind {
            return Err(Error::InvalidInput(format!(
                "Cannot store a {} capture in the {} queue",
                item.kind, self.kind
            )));
        }

        self.conn
            .execute(
                &format!(
                    "INSERT INTO {} ({BINARY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    self.kind.table()
                ),
                params![
                    item.id.as_str(),
                    item.parent.entity.as_str(),
                    item.parent.id.clone(),
                    item.mime_type.clone(),
                    item.data.clone(),
                    item.status.as_str(),
                    item.upload_progress.map(i64::from),
                    i64::from(item.retry_count),
                    item.last_error.clone(),
                    item.captured_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &BinaryItemId) -> Result<Option<BinaryItem>> {
        let items = self
            .select("WHERE id = ?", Some(libsql::Value::Text(id.as_str())))
            .await?;
        Ok(items.into_iter().next())
    }

    async fn list_ordered(&self) -> Result<Vec<BinaryItem>> {
        self.select("", None).await
    }

    async fn list_by_status(&self, status: BinaryStatus) -> Result<Vec<BinaryItem>> {
        self.select(
            "WHERE status = ?",
            Some(libsql::Value::Text(status.as_str().to_string())),
        )
        .await
    }

    async fn list_by_parent(&self, parent_id: &str) -> Result<Vec<BinaryItem>> {
        self.select(
            "WHERE parent_id = ?",
            Some(libsql::Value::Text(parent_id.to_string())),
        )
        .await
    }

    async fn update(&self, item: &BinaryItem) -> Result<()> {
        let rows = self
            .conn
            .execute(
                &format!(
                    "UPDATE {} SET status = ?, upload_progress = ?, retry_count = ?, last_error = ? WHERE id = ?",
                    self.kind.table()
                ),
                params![
                    item.status.as_str(),
                    item.upload_progress.map(i64::from),
                    i64::from(item.retry_count),
                    item.last_error.clone(),
                    item.id.as_str()
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(item.id.to_string()));
        }
        Ok(())
    }

    async fn update_progress(&self, id: &BinaryItemId, percent: u8) -> Result<()> {
        if !self.kind.tracks_progress() {
            return Err(Error::InvalidInput(format!(
                "{} uploads do not track progress",
                self.kind
            )));
        }

        let rows = self
            .conn
            .execute(
                &format!(
                    "UPDATE {} SET upload_progress = ? WHERE id = ?",
                    self.kind.table()
                ),
                params![i64::from(percent.min(100)), id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn reset_status(&self, from: BinaryStatus, to: BinaryStatus) -> Result<usize> {
        let rows = self
            .conn
            .execute(
                &format!("UPDATE {} SET status = ? WHERE status = ?", self.kind.table()),
                [to.as_str(), from.as_str()],
            )
            .await?;
        Ok(usize::try_from(rows).unwrap_or(0))
    }

    async fn remove_many(&self, ids: &[BinaryItemId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!("DELETE FROM {} WHERE id = ?", self.kind.table());
        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let mut removed = 0usize;
        for id in ids {
            match self.conn.execute(&sql, [id.as_str()]).await {
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
            .query(&format!("SELECT COUNT(*) FROM {}", self.kind.table()), ())
            .await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn list_exceeding_retries(&self, max_retries: u32) -> Result<Vec<BinaryItem>> {
        self.select(
            "WHERE retry_count >= ?",
            Some(libsql::Value::Integer(i64::from(max_retries))),
        )
        .await
    }
}
