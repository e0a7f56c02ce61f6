//! HTTP dispatcher backed by `reqwest`.

use std::time::Duration;

use reqwest::Method;

use crate::config::EngineConfig;
use crate::models::HttpMethod;
use crate::util::is_http_url;
use crate::{Error, Result};

use super::dispatch::{Dispatcher, RemoteRequest, RemoteResponse, RequestBody, TransportError};

/// Sends queued operations to the CRM API.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDispatcher {
    /// Builds a dispatcher for an explicit API base URL and request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if !is_http_url(&base_url) {
            return Err(Error::InvalidInput(
                "API base URL must include http:// or https://".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                Error::InvalidInput(format!("Failed to construct HTTP client: {error}"))
            })?;
        Ok(Self { base_url, client })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(
            config.api_base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Returns the base URL this dispatcher was configured with.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn absolute_url(&self, url: &str) -> String {
        if is_http_url(url) {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{url}", self.base_url)
        } else {
            format!("{}/{url}", self.base_url)
        }
    }
}

impl Dispatcher for HttpDispatcher {
    async fn send(
        &self,
        request: RemoteRequest,
    ) -> std::result::Result<RemoteResponse, TransportError> {
        let url = self.absolute_url(&request.url);
        tracing::debug!("{} {url}", request.method);

        let mut builder = self
            .client
            .request(to_method(request.method), &url)
            .header(reqwest::header::ACCEPT, "application/json");
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(payload) => builder.json(&payload),
            RequestBody::Binary {
                bytes,
                content_type,
            } => builder
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(bytes),
        };

        let response = builder.send().await.map_err(|error| transport_error(&error))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|error| transport_error(&error))?;
        let body = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&text).ok()
        };

        Ok(RemoteResponse { status, body })
    }
}

const fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn transport_error(error: &reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::body::Bytes;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{delete, patch, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;

    type Seen = Arc<Mutex<Vec<(String, Value)>>>;

    async fn spawn_stub_api() -> (String, Seen) {
        let seen: Seen = Arc::default();
        let router = Router::new()
            .route("/api/work-orders", post(create_work_order))
            .route("/api/customers/{id}", patch(update_customer))
            .route("/api/invoices/{id}", delete(delete_invoice))
            .route("/api/work-orders/{id}/photos", post(upload_photo))
            .route("/slow", post(slow))
            .with_state(Arc::clone(&seen));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let address = listener.local_addr().expect("local address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        (format!("http://{address}"), seen)
    }

    async fn create_work_order(
        State(seen): State<Seen>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        seen.lock()
            .unwrap()
            .push(("POST /api/work-orders".to_string(), body));
        (StatusCode::CREATED, Json(json!({"id": "wo-1"})))
    }

    async fn update_customer(Path(id): Path<String>) -> (StatusCode, Json<Value>) {
        (
            StatusCode::CONFLICT,
            Json(json!({"id": id, "name": "Server", "version": 9})),
        )
    }

    async fn delete_invoice() -> StatusCode {
        StatusCode::NOT_FOUND
    }

    async fn upload_photo(
        State(seen): State<Seen>,
        Path(id): Path<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        let content_type = headers
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        seen.lock().unwrap().push((
            format!("UPLOAD {id}"),
            json!({"content_type": content_type, "len": body.len()}),
        ));
        StatusCode::CREATED
    }

    async fn slow() -> StatusCode {
        tokio::time::sleep(Duration::from_secs(2)).await;
        StatusCode::OK
    }

    fn request(method: HttpMethod, url: &str, body: RequestBody) -> RemoteRequest {
        RemoteRequest {
            method,
            url: url.to_string(),
            body,
        }
    }

    #[test]
    fn rejects_non_http_base_url() {
        assert!(HttpDispatcher::new("crm.example.com", Duration::from_secs(1)).is_err());
        let dispatcher =
            HttpDispatcher::new("https://crm.example.com/", Duration::from_secs(1)).unwrap();
        assert_eq!(dispatcher.base_url(), "https://crm.example.com");
        assert_eq!(
            dispatcher.absolute_url("/api/customers"),
            "https://crm.example.com/api/customers"
        );
        assert_eq!(
            dispatcher.absolute_url("api/customers"),
            "https://crm.example.com/api/customers"
        );
        assert_eq!(
            dispatcher.absolute_url("https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn posts_json_and_parses_response() {
        let (base_url, seen) = spawn_stub_api().await;
        let dispatcher = HttpDispatcher::new(base_url, Duration::from_secs(5)).unwrap();

        let response = dispatcher
            .send(request(
                HttpMethod::Post,
                "/api/work-orders",
                RequestBody::Json(json!({"status": "scheduled"})),
            ))
            .await
            .unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(response.body, Some(json!({"id": "wo-1"})));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, json!({"status": "scheduled"}));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn surfaces_conflict_and_missing_statuses() {
        let (base_url, _) = spawn_stub_api().await;
        let dispatcher = HttpDispatcher::new(base_url, Duration::from_secs(5)).unwrap();

        let conflict = dispatcher
            .send(request(
                HttpMethod::Patch,
                "/api/customers/c-1",
                RequestBody::Json(json!({"id": "c-1"})),
            ))
            .await
            .unwrap();
        assert_eq!(conflict.status, 409);
        assert_eq!(conflict.body.unwrap()["version"], 9);

        let missing = dispatcher
            .send(request(HttpMethod::Delete, "/api/invoices/i-1", RequestBody::Empty))
            .await
            .unwrap();
        assert_eq!(missing.status, 404);
        assert_eq!(missing.body, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn uploads_binary_with_content_type() {
        let (base_url, seen) = spawn_stub_api().await;
        let dispatcher = HttpDispatcher::new(base_url, Duration::from_secs(5)).unwrap();

        let response = dispatcher
            .send(request(
                HttpMethod::Post,
                "/api/work-orders/wo-7/photos",
                RequestBody::Binary {
                    bytes: vec![0xFF, 0xD8, 0xFF],
                    content_type: "image/jpeg".to_string(),
                },
            ))
            .await
            .unwrap();

        assert_eq!(response.status, 201);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, "UPLOAD wo-7");
        assert_eq!(seen[0].1, json!({"content_type": "image/jpeg", "len": 3}));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_responses_time_out() {
        let (base_url, _) = spawn_stub_api().await;
        let dispatcher = HttpDispatcher::new(base_url, Duration::from_millis(200)).unwrap();

        let error = dispatcher
            .send(request(HttpMethod::Post, "/slow", RequestBody::Empty))
            .await
            .unwrap_err();
        assert!(matches!(error, TransportError::Timeout));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_host_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let dispatcher =
            HttpDispatcher::new(format!("http://{address}"), Duration::from_secs(2)).unwrap();
        let error = dispatcher
            .send(request(HttpMethod::Post, "/api/customers", RequestBody::Empty))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            TransportError::Connect(_) | TransportError::Other(_)
        ));
    }
}
