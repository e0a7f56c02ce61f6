//! Captured photo and signature model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::queue_item::Entity;

/// A unique identifier for a captured binary, using UUID v7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinaryItemId(Uuid);

impl BinaryItemId {
    /// Create a new unique capture ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID.
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for BinaryItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BinaryItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BinaryItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Which binary queue a capture lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryKind {
    Photo,
    Signature,
}

impl BinaryKind {
    pub const ALL: [Self; 2] = [Self::Photo, Self::Signature];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Signature => "signature",
        }
    }

    /// Backing table for this queue.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Photo => "photo_queue",
            Self::Signature => "signature_queue",
        }
    }

    /// Sub-resource the upload is posted to under the parent record.
    #[must_use]
    pub const fn upload_segment(self) -> &'static str {
        match self {
            Self::Photo => "photos",
            Self::Signature => "signatures",
        }
    }

    /// Only photos report incremental upload progress.
    #[must_use]
    pub const fn tracks_progress(self) -> bool {
        matches!(self, Self::Photo)
    }
}

impl fmt::Display for BinaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BinaryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "photo" | "photos" => Ok(Self::Photo),
            "signature" | "signatures" => Ok(Self::Signature),
            other => Err(Error::InvalidInput(format!("Unknown capture kind: {other}"))),
        }
    }
}

/// Upload status of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryStatus {
    Pending,
    Uploading,
    Uploaded,
    Failed,
}

impl BinaryStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Uploaded => "uploaded",
            Self::Failed => "failed",
        }
    }

    /// Forward-only transitions, plus the two ways back to `Pending`:
    /// an explicit retry of a failed upload, and crash recovery of an
    /// interrupted one.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending | Self::Failed, Self::Uploading)
                | (
                    Self::Uploading,
                    Self::Uploaded | Self::Failed | Self::Pending
                )
                | (Self::Failed, Self::Pending)
        )
    }
}

impl fmt::Display for BinaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BinaryStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "uploading" => Ok(Self::Uploading),
            "uploaded" => Ok(Self::Uploaded),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Database(format!("Unknown upload status: {other}"))),
        }
    }
}

/// Domain record a capture belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub entity: Entity,
    pub id: String,
}

/// A captured photo or signature awaiting upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryItem {
    /// Unique capture identifier.
    pub id: BinaryItemId,
    /// Queue the capture belongs to.
    pub kind: BinaryKind,
    /// Owning domain record.
    pub parent: ParentRef,
    /// Content MIME type.
    pub mime_type: String,
    /// Raw captured bytes.
    #[serde(skip_serializing)]
    #[serde(default)]
    pub data: Vec<u8>,
    /// Upload status.
    pub status: BinaryStatus,
    /// Upload progress percentage (photos only).
    pub upload_progress: Option<u8>,
    /// Failed upload attempts so far.
    pub retry_count: u32,
    /// Last failure description.
    pub last_error: Option<String>,
    /// Capture timestamp (Unix ms).
    pub captured_at: i64,
}

impl BinaryItem {
    /// Create a new pending capture.
    pub fn new(
        kind: BinaryKind,
        parent: ParentRef,
        mime_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<Self> {
        let mime_type = mime_type.into().trim().to_string();
        let parent = ParentRef {
            entity: parent.entity,
            id: parent.id.trim().to_string(),
        };

        if parent.id.is_empty() {
            return Err(Error::InvalidInput(
                "Capture parent id cannot be empty".to_string(),
            ));
        }
        if mime_type.is_empty() {
            return Err(Error::InvalidInput(
                "Capture mime_type cannot be empty".to_string(),
            ));
        }
        if data.is_empty() {
            return Err(Error::InvalidInput(
                "Capture payload cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            id: BinaryItemId::new(),
            kind,
            parent,
            mime_type,
            data,
            status: BinaryStatus::Pending,
            upload_progress: kind.tracks_progress().then_some(0),
            retry_count: 0,
            last_error: None,
            captured_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Size of the captured payload in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}
