use std::path::Path;

use fieldsync_core::models::{Entity, HttpMethod, NewOperation, OperationKind};

use crate::commands::common::{open_store, resolve_payload};
use crate::error::CliError;

pub async fn run_enqueue(
    kind: &str,
    entity: &str,
    data: Option<&str>,
    priority: Option<i32>,
    db_path: &Path,
) -> Result<(), CliError> {
    let kind = kind.parse::<OperationKind>()?;
    let entity = entity.parse::<Entity>()?;
    let payload = resolve_payload(data)?;

    let mut operation = NewOperation::entity(kind, entity, payload);
    if let Some(priority) = priority {
        operation = operation.with_priority(priority);
    }

    let store = open_store(db_path).await?;
    let id = store.enqueue(operation).await?;
    store.close().await;

    println!("{id}");
    Ok(())
}

pub async fn run_request(
    method: &str,
    url: &str,
    data: Option<&str>,
    priority: Option<i32>,
    db_path: &Path,
) -> Result<(), CliError> {
    let method = method.parse::<HttpMethod>()?;
    let payload = match data {
        Some(data) => resolve_payload(Some(data))?,
        None if method == HttpMethod::Delete => serde_json::Value::Null,
        None => resolve_payload(None)?,
    };

    let mut operation = NewOperation::raw(url, method, payload)?;
    if let Some(priority) = priority {
        operation = operation.with_priority(priority);
    }

    let store = open_store(db_path).await?;
    let id = store.enqueue(operation).await?;
    store.close().await;

    println!("{id}");
    Ok(())
}
