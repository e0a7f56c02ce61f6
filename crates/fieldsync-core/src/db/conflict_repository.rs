//! Append-only conflict history

use crate::error::Result;
use crate::models::{ConflictRecord, Entity};
use libsql::{params, Connection};

/// Trait for conflict history operations (async)
#[allow(async_fn_in_trait)]
pub trait ConflictRepository {
    /// Append a record, returning it with its assigned id
    async fn append(&self, record: &ConflictRecord) -> Result<ConflictRecord>;

    /// Most recently resolved conflicts first
    async fn list_recent(&self, limit: usize) -> Result<Vec<ConflictRecord>>;

    /// Conflicts recorded for one queued operation
    async fn list_for_operation(&self, operation_id: &str) -> Result<Vec<ConflictRecord>>;
}

/// libSQL implementation of `ConflictRepository`
pub struct LibSqlConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_record(row: &libsql::Row) -> Result<ConflictRecord> {
        let entity: Option<String> = row.get(2)?;
        let local_payload: String = row.get(3)?;
        let server_payload: Option<String> = row.get(4)?;
        let resolution: String = row.get(5)?;

        Ok(ConflictRecord {
            id: row.get(0)?,
            operation_id: row.get(1)?,
            entity: entity.map(|value| value.parse::<Entity>()).transpose()?,
            local_payload: serde_json::from_str(&local_payload)?,
            server_payload: server_payload
                .map(|value| serde_json::from_str(&value))
                .transpose()?,
            resolution: resolution.parse()?,
            resolved_at: row.get(6)?,
        })
    }

    async fn collect(mut rows: libsql::Rows) -> Result<Vec<ConflictRecord>> {
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }
}

impl ConflictRepository for LibSqlConflictRepository<'_> {
    async fn append(&self, record: &ConflictRecord) -> Result<ConflictRecord> {
        let server_payload = record
            .server_payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn
            .execute(
                "INSERT INTO sync_conflicts (operation_id, entity, local_payload, server_payload, resolution, resolved_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    record.operation_id.clone(),
                    record.entity.map(|entity| entity.as_str().to_string()),
                    serde_json::to_string(&record.local_payload)?,
                    server_payload,
                    record.resolution.as_str(),
                    record.resolved_at
                ],
            )
            .await?;

        Ok(ConflictRecord {
            id: self.conn.last_insert_rowid(),
            ..record.clone()
        })
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ConflictRecord>> {
        let rows = self
            .conn
            .query(
                "SELECT id, operation_id, entity, local_payload, server_payload, resolution, resolved_at
                 FROM sync_conflicts
                 ORDER BY resolved_at DESC, id DESC
                 LIMIT ?",
                [i64::try_from(limit).unwrap_or(i64::MAX)],
            )
            .await?;
        Self::collect(rows).await
    }

    async fn list_for_operation(&self, operation_id: &str) -> Result<Vec<ConflictRecord>> {
        let rows = self
            .conn
            .query(
                "SELECT id, operation_id, entity, local_payload, server_payload, resolution, resolved_at
                 FROM sync_conflicts
                 WHERE operation_id = ?
                 ORDER BY id ASC",
                [operation_id],
            )
            .await?;
        Self::collect(rows).await
    }
}
