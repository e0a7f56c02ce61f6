use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fieldsync_core::models::{ConflictRecord, QueueItem, QueueItemId, Target};
use fieldsync_core::{EngineConfig, OfflineStore};
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

const SHORT_ID_LEN: usize = 13;

#[derive(Debug, Serialize)]
pub struct QueueListItem {
    pub id: String,
    pub kind: String,
    pub target: String,
    pub priority: i32,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub enqueued_at: i64,
    pub relative_time: String,
    pub payload: Value,
}

#[derive(Debug, Serialize)]
pub struct ConflictListItem {
    pub id: i64,
    pub operation_id: String,
    pub entity: Option<String>,
    pub resolution: String,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub local_payload: Value,
    pub server_payload: Option<Value>,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("FIELDSYNC_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fieldsync")
        .join("offline.db")
}

pub fn resolve_config_path(cli_config_path: Option<PathBuf>) -> PathBuf {
    cli_config_path
        .or_else(|| env::var_os("FIELDSYNC_CONFIG").map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fieldsync")
        .join("config.json")
}

/// Load the engine config, falling back to defaults (plus environment
/// overrides) when no config file exists.
pub fn load_config(config_path: &Path) -> Result<EngineConfig, CliError> {
    if config_path.exists() {
        return EngineConfig::load_from_path(config_path)
            .map_err(|error| CliError::Config(format!("{}: {error}", config_path.display())));
    }

    tracing::debug!(
        "No config at {}, using defaults",
        config_path.display()
    );
    EngineConfig::default()
        .with_env_overrides(|key| env::var(key).ok())
        .map_err(|error| CliError::Config(error.to_string()))
}

pub async fn open_store(db_path: &Path) -> Result<OfflineStore, CliError> {
    Ok(OfflineStore::open(db_path).await?)
}

/// Parse `--data`, or JSON piped on stdin when the flag is absent.
pub fn resolve_payload(data: Option<&str>) -> Result<Value, CliError> {
    if let Some(data) = data {
        return parse_payload(data);
    }
    if let Some(piped) = read_piped_stdin()? {
        return parse_payload(&piped);
    }
    Err(CliError::EmptyPayload)
}

pub fn parse_payload(raw: &str) -> Result<Value, CliError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyPayload);
    }
    serde_json::from_str(trimmed).map_err(|error| CliError::InvalidPayload(error.to_string()))
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    let trimmed = buffer.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

pub fn normalize_item_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyItemId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Resolve a full operation ID or a unique prefix of one.
pub async fn resolve_queue_item(query: &str, store: &OfflineStore) -> Result<QueueItem, CliError> {
    let query = normalize_item_identifier(query)?;
    if let Ok(id) = query.parse::<QueueItemId>() {
        if let Some(item) = store.get_item(&id).await? {
            return Ok(item);
        }
    }

    let mut matching = store
        .list_ordered()
        .await?
        .into_iter()
        .filter(|item| item.id.as_str().starts_with(&query))
        .collect::<Vec<_>>();

    match matching.len() {
        0 => Err(CliError::ItemNotFound(query)),
        1 => Ok(matching.remove(0)),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|item| short_id(&item.id.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousItemId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

pub fn describe_target(item: &QueueItem) -> String {
    match &item.target {
        Target::Entity { entity } => entity.to_string(),
        Target::Raw { url, method } => format!("{method} {url}"),
    }
}

pub fn format_queue_lines(items: &[QueueItem]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    items
        .iter()
        .map(|item| {
            let id = short_id(&item.id.as_str());
            let target = describe_target(item);
            let relative_time = format_relative_time(item.enqueued_at, now_ms);
            let line = format!(
                "{id:<13}  p{:<3} {:<6}  {target:<24}  {relative_time}",
                item.priority,
                item.kind.as_str()
            );
            match &item.last_error {
                Some(error) => format!("{line}  retries={} {error}", item.retry_count),
                None => line,
            }
        })
        .collect()
}

pub fn queue_item_to_list_item(item: &QueueItem) -> QueueListItem {
    let now_ms = Utc::now().timestamp_millis();
    QueueListItem {
        id: item.id.to_string(),
        kind: item.kind.to_string(),
        target: describe_target(item),
        priority: item.priority,
        retry_count: item.retry_count,
        last_error: item.last_error.clone(),
        enqueued_at: item.enqueued_at,
        relative_time: format_relative_time(item.enqueued_at, now_ms),
        payload: item.payload.clone(),
    }
}

pub fn conflict_to_list_item(record: &ConflictRecord) -> ConflictListItem {
    ConflictListItem {
        id: record.id,
        operation_id: record.operation_id.clone(),
        entity: record.entity.map(|entity| entity.to_string()),
        resolution: record.resolution.to_string(),
        resolved_at: record.resolved_at,
        resolved_at_iso: format_timestamp(record.resolved_at),
        local_payload: record.local_payload.clone(),
        server_payload: record.server_payload.clone(),
    }
}

pub fn format_conflict_lines(records: &[ConflictRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            format!(
                "{}  {:<11}  {:<10}  op={}",
                format_timestamp(record.resolved_at),
                record.resolution.as_str(),
                record
                    .entity
                    .map_or_else(|| "raw".to_string(), |entity| entity.to_string()),
                short_id(&record.operation_id)
            )
        })
        .collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

/// MIME type for a capture file, from its extension.
pub fn guess_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
