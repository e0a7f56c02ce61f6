//! Mapping queue items onto remote requests, and responses back onto outcomes.

use serde_json::Value;
use thiserror::Error;

use crate::models::{HttpMethod, OperationKind, QueueItem, Target};
use crate::util::compact_text;

use super::result::SyncErrorKind;

/// Body of an outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Binary { bytes: Vec<u8>, content_type: String },
}

/// A fully resolved request. `url` is either a path relative to the API base
/// URL or an absolute http(s) URL.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: RequestBody,
}

/// Status and (if it was JSON) body of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl RemoteResponse {
    #[must_use]
    pub const fn new(status: u16, body: Option<Value>) -> Self {
        Self { status, body }
    }
}

/// The request never produced a response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Other(String),
}

/// Sends requests to the remote API.
#[allow(async_fn_in_trait)]
pub trait Dispatcher {
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError>;
}

/// What a response means for the item that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success,
    /// Delete of something already gone.
    NotFoundOnDelete,
    /// Version conflict on an update; carries the server's representation.
    Conflict(Option<Value>),
    Failure {
        kind: SyncErrorKind,
        message: String,
        retryable: bool,
    },
}

/// Build the request for a queued item from its own payload.
pub fn resolve_request(item: &QueueItem) -> Result<RemoteRequest, String> {
    build_request(item, item.payload.clone())
}

/// Build the request for a queued item, sending `payload` instead of the
/// stored one. Used when a conflict resolution re-sends a rewritten body.
pub fn build_request(item: &QueueItem, payload: Value) -> Result<RemoteRequest, String> {
    match &item.target {
        Target::Raw { url, method } => Ok(RemoteRequest {
            method: *method,
            url: url.clone(),
            body: if payload.is_null() {
                RequestBody::Empty
            } else {
                RequestBody::Json(payload)
            },
        }),
        Target::Entity { entity } => match item.kind {
            OperationKind::Create => Ok(RemoteRequest {
                method: HttpMethod::Post,
                url: entity.path().to_string(),
                body: RequestBody::Json(payload),
            }),
            OperationKind::Update => {
                let id = resource_id(&payload)
                    .ok_or_else(|| format!("update of {entity} has no \"id\" in its payload"))?;
                Ok(RemoteRequest {
                    method: HttpMethod::Patch,
                    url: format!("{}/{}", entity.path(), urlencoding::encode(&id)),
                    body: RequestBody::Json(payload),
                })
            }
            OperationKind::Delete => {
                let id = resource_id(&payload)
                    .ok_or_else(|| format!("delete of {entity} has no \"id\" in its payload"))?;
                Ok(RemoteRequest {
                    method: HttpMethod::Delete,
                    url: format!("{}/{}", entity.path(), urlencoding::encode(&id)),
                    body: RequestBody::Empty,
                })
            }
        },
    }
}

fn resource_id(payload: &Value) -> Option<String> {
    match payload.get("id")? {
        Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Classify a response for an operation of the given kind.
#[must_use]
pub fn classify(kind: OperationKind, response: &RemoteResponse) -> Outcome {
    let status = response.status;
    match (status, kind) {
        (200..=299, _) => Outcome::Success,
        (404, OperationKind::Delete) => Outcome::NotFoundOnDelete,
        (409, OperationKind::Update) => Outcome::Conflict(response.body.clone()),
        (408 | 429 | 500..=599, _) => Outcome::Failure {
            kind: SyncErrorKind::NetworkTransient,
            message: describe_status(status, response.body.as_ref()),
            retryable: true,
        },
        (400..=499, _) => Outcome::Failure {
            kind: SyncErrorKind::TerminalClientError,
            message: describe_status(status, response.body.as_ref()),
            retryable: false,
        },
        _ => Outcome::Failure {
            kind: SyncErrorKind::NetworkTransient,
            message: format!("unexpected HTTP {status}"),
            retryable: true,
        },
    }
}

fn describe_status(status: u16, body: Option<&Value>) -> String {
    let detail = body.and_then(|body| {
        body.get("message")
            .or_else(|| body.get("error"))
            .and_then(Value::as_str)
            .map(compact_text)
    });
    match detail {
        Some(detail) if !detail.is_empty() => format!("HTTP {status}: {detail}"),
        _ => format!("HTTP {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entity, NewOperation};
    use serde_json::json;

    fn item(kind: OperationKind, entity: Entity, payload: Value) -> QueueItem {
        QueueItem::new(NewOperation::entity(kind, entity, payload))
    }

    #[test]
    fn create_posts_to_collection() {
        let request = resolve_request(&item(
            OperationKind::Create,
            Entity::WorkOrder,
            json!({"status": "scheduled"}),
        ))
        .unwrap();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "/api/work-orders");
        assert_eq!(request.body, RequestBody::Json(json!({"status": "scheduled"})));
    }

    #[test]
    fn update_and_delete_address_the_resource() {
        let update = resolve_request(&item(
            OperationKind::Update,
            Entity::Customer,
            json!({"id": "c 1/2", "name": "Acme"}),
        ))
        .unwrap();
        assert_eq!(update.method, HttpMethod::Patch);
        assert_eq!(update.url, "/api/customers/c%201%2F2");

        let delete = resolve_request(&item(
            OperationKind::Delete,
            Entity::Invoice,
            json!({"id": 42}),
        ))
        .unwrap();
        assert_eq!(delete.method, HttpMethod::Delete);
        assert_eq!(delete.url, "/api/invoices/42");
        assert_eq!(delete.body, RequestBody::Empty);
    }

    #[test]
    fn missing_id_cannot_be_resolved() {
        let error = resolve_request(&item(
            OperationKind::Update,
            Entity::Payment,
            json!({"amount": 10}),
        ))
        .unwrap_err();
        assert!(error.contains("payment"));
        assert!(resolve_request(&item(OperationKind::Delete, Entity::Activity, json!({"id": ""})))
            .is_err());
    }

    #[test]
    fn raw_requests_bypass_the_table() {
        let op = NewOperation::raw(
            "https://hooks.example.com/notify",
            HttpMethod::Put,
            json!({"ok": true}),
        )
        .unwrap();
        let request = resolve_request(&QueueItem::new(op)).unwrap();
        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.url, "https://hooks.example.com/notify");

        let op = NewOperation::raw("/api/sessions/1", HttpMethod::Delete, Value::Null).unwrap();
        assert_eq!(
            resolve_request(&QueueItem::new(op)).unwrap().body,
            RequestBody::Empty
        );
    }

    #[test]
    fn classification_table() {
        let ok = RemoteResponse::new(201, None);
        assert_eq!(classify(OperationKind::Create, &ok), Outcome::Success);

        let missing = RemoteResponse::new(404, None);
        assert_eq!(
            classify(OperationKind::Delete, &missing),
            Outcome::NotFoundOnDelete
        );
        assert!(matches!(
            classify(OperationKind::Update, &missing),
            Outcome::Failure {
                kind: SyncErrorKind::TerminalClientError,
                retryable: false,
                ..
            }
        ));

        let conflict = RemoteResponse::new(409, Some(json!({"version": 3})));
        assert_eq!(
            classify(OperationKind::Update, &conflict),
            Outcome::Conflict(Some(json!({"version": 3})))
        );
        assert!(matches!(
            classify(OperationKind::Create, &conflict),
            Outcome::Failure {
                kind: SyncErrorKind::TerminalClientError,
                ..
            }
        ));

        for status in [408, 429, 500, 503] {
            assert!(matches!(
                classify(OperationKind::Create, &RemoteResponse::new(status, None)),
                Outcome::Failure {
                    kind: SyncErrorKind::NetworkTransient,
                    retryable: true,
                    ..
                }
            ));
        }
    }

    #[test]
    fn failure_message_uses_error_body() {
        let response = RemoteResponse::new(422, Some(json!({"message": "  name is required "})));
        let Outcome::Failure { message, .. } = classify(OperationKind::Create, &response) else {
            panic!("expected failure");
        };
        assert_eq!(message, "HTTP 422: name is required");
    }
}
