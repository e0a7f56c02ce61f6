//! Queued mutation model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Priority assigned when the caller does not choose one. Lower is more urgent.
pub const DEFAULT_PRIORITY: i32 = 5;

/// A unique identifier for a queued operation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueItemId(Uuid);

impl QueueItemId {
    /// Create a new unique operation ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for QueueItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// What a queued operation does to its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!(
                "Unknown operation kind: {other}"
            ))),
        }
    }
}

/// Business record types the remote API exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Entity {
    Customer,
    WorkOrder,
    Invoice,
    Payment,
    Prospect,
    Activity,
}

impl Entity {
    pub const ALL: [Self; 6] = [
        Self::Customer,
        Self::WorkOrder,
        Self::Invoice,
        Self::Payment,
        Self::Prospect,
        Self::Activity,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::WorkOrder => "work-order",
            Self::Invoice => "invoice",
            Self::Payment => "payment",
            Self::Prospect => "prospect",
            Self::Activity => "activity",
        }
    }

    /// Collection path on the remote API. Creates post here; updates and
    /// deletes append the resource id.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Customer => "/api/customers",
            Self::WorkOrder => "/api/work-orders",
            Self::Invoice => "/api/invoices",
            Self::Payment => "/api/payments",
            Self::Prospect => "/api/prospects",
            Self::Activity => "/api/activities",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Entity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|entity| entity.as_str() == normalized)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown entity: {s}")))
    }
}

/// HTTP verbs a raw request may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// The operation kind a raw request with this verb is queued as.
    #[must_use]
    pub const fn operation_kind(self) -> OperationKind {
        match self {
            Self::Post => OperationKind::Create,
            Self::Put | Self::Patch => OperationKind::Update,
            Self::Delete => OperationKind::Delete,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!(
                "Unsupported HTTP method: {other}"
            ))),
        }
    }
}

/// Where a queued operation is delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum Target {
    /// Resolved through the static entity path table
    Entity { entity: Entity },
    /// Pre-built request that bypasses the entity table
    Raw { url: String, method: HttpMethod },
}

/// Input to `enqueue`: either an entity mutation or a raw request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOperation {
    pub kind: OperationKind,
    pub target: Target,
    pub payload: serde_json::Value,
    pub priority: Option<i32>,
}

impl NewOperation {
    /// Entity mutation, e.g. `create` on `work-order`.
    #[must_use]
    pub const fn entity(kind: OperationKind, entity: Entity, payload: serde_json::Value) -> Self {
        Self {
            kind,
            target: Target::Entity { entity },
            payload,
            priority: None,
        }
    }

    /// Raw request with an explicit URL and verb.
    pub fn raw(
        url: impl Into<String>,
        method: HttpMethod,
        payload: serde_json::Value,
    ) -> Result<Self> {
        let url = url.into().trim().to_string();
        if url.is_empty() {
            return Err(Error::InvalidInput(
                "Raw request url cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            kind: method.operation_kind(),
            target: Target::Raw { url, method },
            payload,
            priority: None,
        })
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// A durably persisted pending mutation awaiting delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Unique identifier
    pub id: QueueItemId,
    /// Operation kind
    pub kind: OperationKind,
    /// Delivery target
    #[serde(flatten)]
    pub target: Target,
    /// Opaque request data
    pub payload: serde_json::Value,
    /// Enqueue timestamp (Unix ms)
    pub enqueued_at: i64,
    /// Lower is more urgent
    pub priority: i32,
    /// Delivery attempts that failed so far
    pub retry_count: u32,
    /// Last failure description
    pub last_error: Option<String>,
}

impl QueueItem {
    /// Build a fresh queue item for an operation, stamped with the current time
    #[must_use]
    pub fn new(operation: NewOperation) -> Self {
        Self {
            id: QueueItemId::new(),
            kind: operation.kind,
            target: operation.target,
            payload: operation.payload,
            enqueued_at: chrono::Utc::now().timestamp_millis(),
            priority: operation.priority.unwrap_or(DEFAULT_PRIORITY),
            retry_count: 0,
            last_error: None,
        }
    }

    /// Entity this item mutates, absent for raw requests
    #[must_use]
    pub const fn entity(&self) -> Option<Entity> {
        match self.target {
            Target::Entity { entity } => Some(entity),
            Target::Raw { .. } => None,
        }
    }

    /// Whether the retry budget is spent
    #[must_use]
    pub const fn is_exhausted(&self, max_retries: u32) -> bool {
        self.retry_count >= max_retries
    }

    /// Record a failed delivery attempt.
    ///
    /// Non-retryable failures exhaust the budget at once so the item is
    /// surfaced for manual action instead of being retried.
    pub fn record_failure(
        &mut self,
        message: impl Into<String>,
        retryable: bool,
        max_retries: u32,
    ) {
        self.retry_count = self.retry_count.saturating_add(1);
        if !retryable {
            self.retry_count = self.retry_count.max(max_retries);
        }
        self.last_error = Some(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_queue_item_id_parse() {
        let id = QueueItemId::new();
        let parsed: QueueItemId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_entity_from_str_accepts_snake_case() {
        assert_eq!("work-order".parse::<Entity>().unwrap(), Entity::WorkOrder);
        assert_eq!("Work_Order".parse::<Entity>().unwrap(), Entity::WorkOrder);
        assert!("ticket".parse::<Entity>().is_err());
    }

    #[test]
    fn test_entity_paths_are_unique() {
        let mut paths: Vec<_> = Entity::ALL.iter().map(|entity| entity.path()).collect();
        paths.sort_unstable();
        paths.dedup();
        assert_eq!(paths.len(), Entity::ALL.len());
    }

    #[test]
    fn test_new_item_defaults() {
        let item = QueueItem::new(NewOperation::entity(
            OperationKind::Create,
            Entity::Customer,
            json!({"name": "Acme"}),
        ));
        assert_eq!(item.priority, DEFAULT_PRIORITY);
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.entity(), Some(Entity::Customer));
        assert!(item.last_error.is_none());
    }

    #[test]
    fn test_raw_operation_derives_kind_from_method() {
        let op = NewOperation::raw("/api/custom", HttpMethod::Patch, json!({})).unwrap();
        assert_eq!(op.kind, OperationKind::Update);
        assert!(NewOperation::raw("  ", HttpMethod::Post, json!({})).is_err());

        let item = QueueItem::new(op);
        assert_eq!(item.entity(), None);
    }

    #[test]
    fn test_record_failure_exhausts_on_terminal_error() {
        let mut item = QueueItem::new(NewOperation::entity(
            OperationKind::Update,
            Entity::Invoice,
            json!({"id": "inv-1"}),
        ));

        item.record_failure("HTTP 503", true, 5);
        assert_eq!(item.retry_count, 1);
        assert!(!item.is_exhausted(5));

        item.record_failure("HTTP 422", false, 5);
        assert_eq!(item.retry_count, 5);
        assert!(item.is_exhausted(5));
        assert_eq!(item.last_error.as_deref(), Some("HTTP 422"));
    }
}
