use std::path::Path;

use fieldsync_core::models::{BinaryItem, BinaryKind, Entity, ParentRef};

use crate::cli::CaptureKind;
use crate::commands::common::{guess_mime_type, open_store};
use crate::error::CliError;

pub const fn binary_kind(kind: CaptureKind) -> BinaryKind {
    match kind {
        CaptureKind::Photo => BinaryKind::Photo,
        CaptureKind::Signature => BinaryKind::Signature,
    }
}

pub async fn run_capture(
    kind: CaptureKind,
    entity: &str,
    parent_id: &str,
    file: &Path,
    mime_type: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let entity = entity.parse::<Entity>()?;
    let data = std::fs::read(file)?;
    if data.is_empty() {
        return Err(CliError::EmptyCapture(file.display().to_string()));
    }
    let mime_type = mime_type.map_or_else(|| guess_mime_type(file).to_string(), str::to_string);

    let item = BinaryItem::new(
        binary_kind(kind),
        ParentRef {
            entity,
            id: parent_id.to_string(),
        },
        mime_type,
        data,
    )?;

    let store = open_store(db_path).await?;
    let id = store.capture(&item).await?;
    store.close().await;

    println!("{id}");
    Ok(())
}
