//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }
    if version < 3 {
        migrate_v3(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Run a migration's statements in one transaction.
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version} (target {CURRENT_VERSION})");
    Ok(())
}

/// Migration to version 1: mutation queue and sync bookkeeping
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        1,
        &[
            // Schema version tracking
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            // Pending mutations; seq breaks (priority, enqueued_at) ties in insert order
            "CREATE TABLE IF NOT EXISTS queue_items (
                id TEXT PRIMARY KEY,
                seq INTEGER NOT NULL,
                kind TEXT NOT NULL,
                entity TEXT,
                url TEXT,
                method TEXT,
                payload TEXT NOT NULL,
                enqueued_at INTEGER NOT NULL,
                priority INTEGER NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_queue_items_order ON queue_items(priority, enqueued_at, seq)",
            "CREATE INDEX IF NOT EXISTS idx_queue_items_enqueued ON queue_items(enqueued_at)",
            "CREATE INDEX IF NOT EXISTS idx_queue_items_kind ON queue_items(kind)",
            // Singleton sync bookkeeping row
            "CREATE TABLE IF NOT EXISTS sync_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_sync_attempt INTEGER,
                last_successful_sync INTEGER,
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                is_initialized INTEGER NOT NULL DEFAULT 0
            )",
            "INSERT OR IGNORE INTO sync_state (id) VALUES (1)",
        ],
    )
    .await
}

/// Migration to version 2: conflict history
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        2,
        &[
            "CREATE TABLE IF NOT EXISTS sync_conflicts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                operation_id TEXT NOT NULL,
                entity TEXT,
                local_payload TEXT NOT NULL,
                server_payload TEXT,
                resolution TEXT NOT NULL,
                resolved_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_operation_id ON sync_conflicts(operation_id)",
            "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_resolved_at ON sync_conflicts(resolved_at DESC)",
        ],
    )
    .await
}

/// Migration to version 3: photo and signature capture queues
async fn migrate_v3(conn: &Connection) -> Result<()> {
    apply(
        conn,
        3,
        &[
            "CREATE TABLE IF NOT EXISTS photo_queue (
                id TEXT PRIMARY KEY,
                parent_entity TEXT NOT NULL,
                parent_id TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                data BLOB NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                upload_progress INTEGER,
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                captured_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_photo_queue_parent ON photo_queue(parent_id)",
            "CREATE INDEX IF NOT EXISTS idx_photo_queue_status ON photo_queue(status)",
            "CREATE TABLE IF NOT EXISTS signature_queue (
                id TEXT PRIMARY KEY,
                parent_entity TEXT NOT NULL,
                parent_id TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                data BLOB NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                upload_progress INTEGER,
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                captured_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_signature_queue_parent ON signature_queue(parent_id)",
            "CREATE INDEX IF NOT EXISTS idx_signature_queue_status ON signature_queue(status)",
        ],
    )
    .await
}
