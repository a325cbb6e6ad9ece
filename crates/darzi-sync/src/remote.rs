//! # Remote API Seam
//!
//! The single trait through which anything in this crate reaches the
//! billing server. The engine and facade depend on the trait, never on
//! reqwest directly, so tests drive them with a scripted in-memory remote.
//!
//! ## Endpoint Mapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Remote API Mapping                                 │
//! │                                                                         │
//! │  EntityKind          │ Collection Path                                 │
//! │  ────────────────────┼──────────────────                               │
//! │  Bill                │ /bills                                          │
//! │  Customer            │ /customers                                      │
//! │  MeasurementConfig   │ /measurement-configs                            │
//! │  Service             │ /services                                       │
//! │  Payment             │ /payments                                       │
//! │                                                                         │
//! │  create(kind, body)  │ POST   {base}/{collection}                      │
//! │  update(kind, id, b) │ PUT    {base}/{collection}/{id}                 │
//! │  delete(kind, id)    │ DELETE {base}/{collection}/{id}                 │
//! │  fetch(kind, id)     │ GET    {base}/{collection}/{id}                 │
//! │  list(kind)          │ GET    {base}/{collection}                      │
//! │                                                                         │
//! │  create responses carry the server-assigned canonical id               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use darzi_core::EntityKind;

use crate::connectivity::ConnectivityProbe;

// =============================================================================
// Remote Errors
// =============================================================================

/// Failures talking to the billing server.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Could not reach the server at all.
    #[error("Network error: {0}")]
    Network(String),

    /// The request timed out.
    #[error("Request timed out")]
    Timeout,

    /// The server failed (5xx). Retryable.
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// The server rejected the request (4xx other than 404). Permanent.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The server does not know the record (404).
    #[error("{kind} not found on server: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// The server answered with a body this client cannot use.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// True if a later attempt may succeed without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Network(_) | RemoteError::Timeout | RemoteError::Server { .. }
        )
    }
}

/// Result alias for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

// =============================================================================
// Remote API Trait
// =============================================================================

/// Per-entity CRUD against the billing server, in the wire JSON format
/// (camelCase field names).
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Creates a record. The response is the canonical record, including
    /// the server-assigned id.
    async fn create(&self, kind: EntityKind, payload: &Value) -> RemoteResult<Value>;

    /// Replaces a record by id, returning the canonical record.
    async fn update(&self, kind: EntityKind, id: &str, payload: &Value) -> RemoteResult<Value>;

    /// Deletes a record by id.
    async fn delete(&self, kind: EntityKind, id: &str) -> RemoteResult<()>;

    /// Fetches one record by id.
    async fn fetch(&self, kind: EntityKind, id: &str) -> RemoteResult<Value>;

    /// Fetches the full collection.
    async fn list(&self, kind: EntityKind) -> RemoteResult<Value>;
}

/// Extracts the record id from a server response.
///
/// Measurement configs are keyed by garment type instead of a plain id.
pub fn response_id(value: &Value) -> RemoteResult<String> {
    value
        .get("id")
        .or_else(|| value.get("garmentType"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RemoteError::InvalidResponse("response has no string 'id' field".into()))
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// The collection path for an entity kind.
fn collection_path(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Bill => "bills",
        EntityKind::Customer => "customers",
        EntityKind::MeasurementConfig => "measurement-configs",
        EntityKind::Service => "services",
        EntityKind::Payment => "payments",
    }
}

/// reqwest-backed [`RemoteApi`] for the billing REST API.
#[derive(Debug, Clone)]
pub struct HttpRemoteApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteApi {
    /// Creates a client for the given base URL (no trailing slash).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> RemoteResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(HttpRemoteApi {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}/{}", self.base_url, collection_path(kind))
    }

    fn record_url(&self, kind: EntityKind, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection_path(kind), id)
    }

    /// Maps a response to a RemoteError or passes it through.
    async fn check(
        response: reqwest::Response,
        kind: EntityKind,
        id: &str,
    ) -> RemoteResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        let status = status.as_u16();

        match status {
            404 => Err(RemoteError::NotFound {
                kind,
                id: id.to_string(),
            }),
            400..=499 => Err(RemoteError::Rejected { status, message }),
            _ => Err(RemoteError::Server { status, message }),
        }
    }

    fn transport_error(err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout
        } else {
            RemoteError::Network(err.to_string())
        }
    }

    async fn json_body(response: reqwest::Response) -> RemoteResult<Value> {
        response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }
}

/// Reachability is probed with a bare GET against the API base URL; any
/// response at all counts as reachable.
#[async_trait]
impl ConnectivityProbe for HttpRemoteApi {
    async fn check(&self) -> bool {
        self.client.get(&self.base_url).send().await.is_ok()
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn create(&self, kind: EntityKind, payload: &Value) -> RemoteResult<Value> {
        let url = self.collection_url(kind);
        debug!(kind = %kind, url = %url, "POST create");

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let response = Self::check(response, kind, "").await?;
        Self::json_body(response).await
    }

    async fn update(&self, kind: EntityKind, id: &str, payload: &Value) -> RemoteResult<Value> {
        let url = self.record_url(kind, id);
        debug!(kind = %kind, id = %id, "PUT update");

        let response = self
            .client
            .put(&url)
            .json(payload)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let response = Self::check(response, kind, id).await?;
        Self::json_body(response).await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> RemoteResult<()> {
        let url = self.record_url(kind, id);
        debug!(kind = %kind, id = %id, "DELETE");

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(Self::transport_error)?;

        Self::check(response, kind, id).await?;
        Ok(())
    }

    async fn fetch(&self, kind: EntityKind, id: &str) -> RemoteResult<Value> {
        let url = self.record_url(kind, id);
        debug!(kind = %kind, id = %id, "GET fetch");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let response = Self::check(response, kind, id).await?;
        Self::json_body(response).await
    }

    async fn list(&self, kind: EntityKind) -> RemoteResult<Value> {
        let url = self.collection_url(kind);
        debug!(kind = %kind, "GET list");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let response = Self::check(response, kind, "").await?;
        Self::json_body(response).await
    }
}

// =============================================================================
// Scripted Remote (test support)
// =============================================================================


// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_paths() {
        assert_eq!(collection_path(EntityKind::Bill), "bills");
        assert_eq!(
            collection_path(EntityKind::MeasurementConfig),
            "measurement-configs"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(RemoteError::Network("refused".into()).is_retryable());
        assert!(RemoteError::Timeout.is_retryable());
        assert!(RemoteError::Server {
            status: 502,
            message: "bad gateway".into()
        }
        .is_retryable());

        assert!(!RemoteError::Rejected {
            status: 422,
            message: "invalid".into()
        }
        .is_retryable());
        assert!(!RemoteError::NotFound {
            kind: EntityKind::Bill,
            id: "b-1".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_response_id_extraction() {
        let ok = serde_json::json!({"id": "bill-7"});
        assert_eq!(response_id(&ok).unwrap(), "bill-7");

        let bad = serde_json::json!({"id": 7});
        assert!(response_id(&bad).is_err());
    }

    #[tokio::test]
    async fn test_mock_create_assigns_canonical_id() {
        use mock::MockRemoteApi;

        let remote = MockRemoteApi::new();
        let record = remote
            .create(EntityKind::Service, &serde_json::json!({"name": "Hemming"}))
            .await
            .unwrap();

        let id = response_id(&record).unwrap();
        assert!(id.starts_with("service-"));
        assert!(remote.record(EntityKind::Service, &id).is_some());
    }
}
