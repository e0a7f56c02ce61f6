use std::path::{Path, PathBuf};

use clap::Parser;
use fieldsync_core::models::{
    BinaryKind, ConflictRecord, ConflictStrategy, Entity, HttpMethod, NewOperation,
    OperationKind, QueueItem,
};
use fieldsync_core::sync::SyncError;
use fieldsync_core::{OfflineStore, SyncResult};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::tempdir;

use crate::cli::{CaptureKind, Cli, Commands};
use crate::commands::capture::{binary_kind, run_capture};
use crate::commands::common::{
    conflict_to_list_item, describe_target, format_conflict_lines, format_queue_lines,
    format_relative_time, format_timestamp, guess_mime_type, normalize_item_identifier,
    parse_payload, queue_item_to_list_item, resolve_db_path, resolve_queue_item, short_id,
};
use crate::commands::enqueue::run_enqueue;
use crate::commands::queue::{run_discard, run_retry};
use crate::commands::sync::{format_sync_report, SyncReport};
use crate::error::CliError;

#[test]
fn parse_payload_requires_json() {
    assert_eq!(
        parse_payload(r#" {"status": "scheduled"} "#).unwrap(),
        json!({"status": "scheduled"})
    );
    assert!(matches!(parse_payload("   "), Err(CliError::EmptyPayload)));
    assert!(matches!(
        parse_payload("{status"),
        Err(CliError::InvalidPayload(_))
    ));
}

#[test]
fn normalize_item_identifier_rejects_blank() {
    assert_eq!(normalize_item_identifier("  abc ").unwrap(), "abc");
    assert!(matches!(
        normalize_item_identifier(" "),
        Err(CliError::EmptyItemId)
    ));
}

#[test]
fn resolve_db_path_prefers_explicit_path() {
    let explicit = PathBuf::from("/tmp/fieldsync-test.db");
    assert_eq!(resolve_db_path(Some(explicit.clone())), explicit);
}

#[test]
fn guess_mime_type_from_extension() {
    assert_eq!(guess_mime_type(Path::new("site.JPG")), "image/jpeg");
    assert_eq!(guess_mime_type(Path::new("sig.png")), "image/png");
    assert_eq!(
        guess_mime_type(Path::new("blob")),
        "application/octet-stream"
    );
}

#[test]
fn capture_kind_maps_to_binary_kind() {
    assert_eq!(binary_kind(CaptureKind::Photo), BinaryKind::Photo);
    assert_eq!(binary_kind(CaptureKind::Signature), BinaryKind::Signature);
}

#[test]
fn format_relative_time_buckets() {
    let now = 10 * 24 * 60 * 60 * 1000;
    assert_eq!(format_relative_time(now - 5_000, now), "just now");
    assert_eq!(format_relative_time(now - 5 * 60_000, now), "5m ago");
    assert_eq!(format_relative_time(now - 3 * 60 * 60_000, now), "3h ago");
    assert_eq!(format_relative_time(0, now), "1w ago");
}

#[test]
fn format_timestamp_renders_utc() {
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn queue_lines_show_target_and_errors() {
    let mut entity_item = QueueItem::new(NewOperation::entity(
        OperationKind::Create,
        Entity::WorkOrder,
        json!({"status": "scheduled"}),
    ));
    let raw_item = QueueItem::new(
        NewOperation::raw("/api/sessions/1", HttpMethod::Delete, json!(null)).unwrap(),
    );
    entity_item.record_failure("HTTP 503", true, 5);

    assert_eq!(describe_target(&entity_item), "work-order");
    assert_eq!(describe_target(&raw_item), "DELETE /api/sessions/1");

    let lines = format_queue_lines(&[entity_item.clone(), raw_item]);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with(&short_id(&entity_item.id.as_str())));
    assert!(lines[0].contains("retries=1 HTTP 503"));
    assert!(lines[1].contains("DELETE /api/sessions/1"));

    let json_item = queue_item_to_list_item(&entity_item);
    assert_eq!(json_item.kind, "create");
    assert_eq!(json_item.payload, json!({"status": "scheduled"}));
}

#[test]
fn conflict_lines_name_resolution() {
    let record = ConflictRecord {
        id: 3,
        operation_id: "0190f3a4-aaaa-7bbb-8ccc-123456789abc".to_string(),
        entity: Some(Entity::Customer),
        local_payload: json!({"id": "c-1"}),
        server_payload: None,
        resolution: ConflictStrategy::ServerWins,
        resolved_at: 0,
    };

    let lines = format_conflict_lines(std::slice::from_ref(&record));
    assert_eq!(
        lines[0],
        "1970-01-01 00:00:00 UTC  server_wins  customer    op=0190f3a4-aaaa"
    );
    assert_eq!(conflict_to_list_item(&record).resolution, "server_wins");
}

#[test]
fn sync_report_lists_errors() {
    let report = SyncReport {
        queue: SyncResult {
            success: 2,
            conflicts: 1,
            errors: vec![SyncError::offline()],
            aborted: true,
            ..SyncResult::default()
        },
        media: Some(SyncResult::default()),
        remaining: 4,
    };

    let lines = format_sync_report(&report);
    assert_eq!(
        lines[0],
        "Synced 2 operations (1 conflicts), 0 failed, 4 still queued"
    );
    assert_eq!(lines[1], "Sync stopped early");
    assert_eq!(lines[2], "  ! device is offline (offline)");
    assert_eq!(lines[3], "Uploaded 0 captures, 0 failed");
}

#[test]
fn cli_parses_enqueue_and_retry_all() {
    let cli = Cli::parse_from([
        "fieldsync",
        "enqueue",
        "create",
        "work-order",
        "--data",
        r#"{"status":"scheduled"}"#,
        "--priority",
        "1",
    ]);
    assert!(matches!(
        cli.command,
        Commands::Enqueue {
            priority: Some(1),
            ..
        }
    ));

    let cli = Cli::parse_from(["fieldsync", "retry", "--all"]);
    assert!(matches!(
        cli.command,
        Commands::Retry {
            id: None,
            all: true
        }
    ));
    assert!(Cli::try_parse_from(["fieldsync", "retry"]).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn enqueue_retry_and_discard_by_prefix() {
    let tmp = tempdir().unwrap();
    let db_path = tmp.path().join("offline.db");

    run_enqueue(
        "create",
        "work_order",
        Some(r#"{"status":"scheduled"}"#),
        Some(2),
        &db_path,
    )
    .await
    .unwrap();

    let store = OfflineStore::open(&db_path).await.unwrap();
    let mut item = store.list_ordered().await.unwrap().remove(0);
    assert_eq!(item.entity(), Some(Entity::WorkOrder));
    assert_eq!(item.priority, 2);
    item.record_failure("HTTP 400", false, 5);
    store.update_item(&item).await.unwrap();

    let prefix = short_id(&item.id.as_str());
    let resolved = resolve_queue_item(&prefix, &store).await.unwrap();
    assert_eq!(resolved.id, item.id);
    store.close().await;

    run_retry(Some(prefix.as_str()), false, 5, &db_path).await.unwrap();
    let store = OfflineStore::open(&db_path).await.unwrap();
    assert_eq!(store.get_item(&item.id).await.unwrap().unwrap().retry_count, 0);
    store.close().await;

    run_discard(&item.id.as_str(), &db_path).await.unwrap();
    let store = OfflineStore::open(&db_path).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
    assert!(matches!(
        resolve_queue_item("ffff", &store).await,
        Err(CliError::ItemNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn enqueue_rejects_unknown_entity() {
    let tmp = tempdir().unwrap();
    let result = run_enqueue(
        "create",
        "ticket",
        Some("{}"),
        None,
        &tmp.path().join("offline.db"),
    )
    .await;
    assert!(matches!(result, Err(CliError::Core(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn capture_stores_file_bytes() {
    let tmp = tempdir().unwrap();
    let db_path = tmp.path().join("offline.db");
    let file = tmp.path().join("signature.png");
    std::fs::write(&file, [1_u8, 2, 3]).unwrap();

    run_capture(
        CaptureKind::Signature,
        "work-order",
        "wo-12",
        &file,
        None,
        &db_path,
    )
    .await
    .unwrap();

    let store = OfflineStore::open(&db_path).await.unwrap();
    let captures = store
        .list_binaries_by_parent(BinaryKind::Signature, "wo-12")
        .await
        .unwrap();
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].mime_type, "image/png");
    assert_eq!(captures[0].data, vec![1, 2, 3]);

    let empty = tmp.path().join("empty.jpg");
    std::fs::write(&empty, b"").unwrap();
    assert!(matches!(
        run_capture(CaptureKind::Photo, "work-order", "wo-12", &empty, None, &db_path).await,
        Err(CliError::EmptyCapture(_))
    ));
}
