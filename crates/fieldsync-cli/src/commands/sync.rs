use std::path::Path;

use fieldsync_core::models::{BinaryKind, BinaryStatus};
use fieldsync_core::sync::SyncError;
use fieldsync_core::{EngineConfig, HttpDispatcher, NetworkMonitor, SyncEngine, SyncResult};
use serde::Serialize;

use crate::commands::common::{
    conflict_to_list_item, format_conflict_lines, format_timestamp, open_store,
    ConflictListItem,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub queue: SyncResult,
    pub media: Option<SyncResult>,
    pub remaining: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub status: String,
    pub queued: usize,
    pub needs_attention: usize,
    pub pending_photos: usize,
    pub pending_signatures: usize,
    pub consecutive_failures: u32,
    pub last_sync_attempt: Option<String>,
    pub last_successful_sync: Option<String>,
    pub initialized: bool,
}

pub async fn run_sync(
    media: bool,
    as_json: bool,
    config: &EngineConfig,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let dispatcher = HttpDispatcher::from_config(config)?;
    let engine = SyncEngine::new(store.clone(), dispatcher, NetworkMonitor::default(), config);

    let queue = engine.sync().await;
    let media = if media {
        Some(engine.upload_media().await)
    } else {
        None
    };
    let remaining = engine.queue_count().await?;
    store.close().await;

    let report = SyncReport {
        queue,
        media,
        remaining,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in format_sync_report(&report) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Synced {} operations ({} conflicts), {} failed, {} still queued",
        report.queue.success, report.queue.conflicts, report.queue.failed, report.remaining
    )];
    if report.queue.aborted {
        lines.push("Sync stopped early".to_string());
    }
    lines.extend(report.queue.errors.iter().map(format_error_line));

    if let Some(media) = &report.media {
        lines.push(format!(
            "Uploaded {} captures, {} failed",
            media.success, media.failed
        ));
        lines.extend(media.errors.iter().map(format_error_line));
    }
    lines
}

fn format_error_line(error: &SyncError) -> String {
    format!("  ! {error}")
}

pub async fn run_status(
    as_json: bool,
    config: &EngineConfig,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let dispatcher = HttpDispatcher::from_config(config)?;
    let engine = SyncEngine::new(store.clone(), dispatcher, NetworkMonitor::default(), config);

    let status = engine.status().await;
    let state = engine.get_sync_state().await?;
    let queued = engine.queue_count().await?;
    let needs_attention = store.list_exceeding_retries(config.max_retries).await?.len();
    let pending_photos = count_unsent(&store, BinaryKind::Photo).await?;
    let pending_signatures = count_unsent(&store, BinaryKind::Signature).await?;
    store.close().await;

    let report = StatusReport {
        status: status.to_string(),
        queued,
        needs_attention,
        pending_photos,
        pending_signatures,
        consecutive_failures: state.consecutive_failures,
        last_sync_attempt: state.last_sync_attempt.map(format_timestamp),
        last_successful_sync: state.last_successful_sync.map(format_timestamp),
        initialized: state.is_initialized,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Status:            {}", report.status);
    println!("Queued:            {}", report.queued);
    println!("Needs attention:   {}", report.needs_attention);
    println!("Pending photos:    {}", report.pending_photos);
    println!("Pending signatures: {}", report.pending_signatures);
    println!(
        "Last attempt:      {}",
        report.last_sync_attempt.as_deref().unwrap_or("never")
    );
    println!(
        "Last success:      {}",
        report.last_successful_sync.as_deref().unwrap_or("never")
    );
    if report.consecutive_failures > 0 {
        println!("Failure streak:    {}", report.consecutive_failures);
    }
    Ok(())
}

async fn count_unsent(
    store: &fieldsync_core::OfflineStore,
    kind: BinaryKind,
) -> Result<usize, CliError> {
    let mut count = 0;
    for status in [BinaryStatus::Pending, BinaryStatus::Uploading, BinaryStatus::Failed] {
        count += store.list_binaries_by_status(kind, status).await?.len();
    }
    Ok(count)
}

pub async fn run_conflicts(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let conflicts = store.list_conflicts(limit).await?;
    store.close().await;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(conflict_to_list_item)
            .collect::<Vec<ConflictListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}
