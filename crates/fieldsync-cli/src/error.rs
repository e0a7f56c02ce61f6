use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] fieldsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No payload provided; pass --data or pipe JSON on stdin")]
    EmptyPayload,
    #[error("Invalid JSON payload: {0}")]
    InvalidPayload(String),
    #[error("Operation ID cannot be empty")]
    EmptyItemId,
    #[error("No queued operation for id/prefix: {0}")]
    ItemNotFound(String),
    #[error("{0}")]
    AmbiguousItemId(String),
    #[error("Capture file is empty: {0}")]
    EmptyCapture(String),
    #[error("Configuration error: {0}")]
    Config(String),
}
