use std::path::Path;

use crate::commands::common::{
    format_queue_lines, open_store, queue_item_to_list_item, resolve_queue_item, QueueListItem,
};
use crate::error::CliError;

pub async fn run_queue(
    dead: bool,
    as_json: bool,
    max_retries: u32,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let items = if dead {
        store.list_exceeding_retries(max_retries).await?
    } else {
        store.list_ordered().await?
    };
    store.close().await;

    if as_json {
        let json_items = items
            .iter()
            .map(queue_item_to_list_item)
            .collect::<Vec<QueueListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!(
            "{}",
            if dead {
                "No operations need attention."
            } else {
                "Queue is empty."
            }
        );
        return Ok(());
    }

    for line in format_queue_lines(&items) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_retry(
    id: Option<&str>,
    all: bool,
    max_retries: u32,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;

    if all {
        let count = store.retry_exhausted(max_retries).await?;
        store.close().await;
        println!("Reset {count} operations");
        return Ok(());
    }

    let item = resolve_queue_item(id.unwrap_or_default(), &store).await?;
    store.retry_item(&item.id).await?;
    store.close().await;

    println!("{}", item.id);
    Ok(())
}

pub async fn run_discard(id: &str, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let item = resolve_queue_item(id, &store).await?;
    store.discard_item(&item.id).await?;
    store.close().await;

    println!("{}", item.id);
    Ok(())
}
