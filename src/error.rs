//! Directory Error Taxonomy
//!
//! Every fallible operation in the library returns [`DirectoryResult`]. The
//! variants map one-to-one onto the failure classes callers are expected to
//! react to differently:
//!
//! - **Caller errors** (`Validation`, `NotFound`, `CookieMismatch`, `Conflict`)
//!   are returned immediately and never retried.
//! - **Capacity errors** (`VolumeExhausted`) are surfaced to operators who
//!   provision more volumes.
//! - **Transient errors** (`StoreUnavailable`) are the only class the retry
//!   layer (`crate::retry`) will attempt again.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type DirectoryResult<T> = Result<T, DirectoryError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// Malformed identifier, size or cookie.
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Key absent, or the mapping is tombstoned.
    #[error("{key} not found")]
    NotFound { key: String },

    /// Delete was attempted with a cookie that does not match the mapping.
    #[error("Cookie does not match {key}")]
    CookieMismatch { key: String },

    /// A record already occupies the key (lost create race or reused key).
    #[error("{key} already exists")]
    Conflict { key: String },

    /// No write-enabled volume has enough free space for the request.
    #[error("No write-enabled volume has {requested_bytes} bytes free")]
    VolumeExhausted { requested_bytes: u64 },

    /// Backing store timed out, refused the connection, or CAS contention
    /// could not be resolved within the attempt budget.
    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// Keyspace or table missing or malformed.
    #[error("Schema error: {message}")]
    Schema { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DirectoryError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn conflict(key: impl Into<String>) -> Self {
        Self::Conflict { key: key.into() }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Only transient store failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Stable machine-readable name used in wire error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::CookieMismatch { .. } => "cookie_mismatch",
            Self::Conflict { .. } => "conflict",
            Self::VolumeExhausted { .. } => "volume_exhausted",
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::Schema { .. } => "schema",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::CookieMismatch { .. } => StatusCode::FORBIDDEN,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::VolumeExhausted { .. } => StatusCode::INSUFFICIENT_STORAGE,
            Self::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Schema { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Rebuilds an error received from a table server.
    ///
    /// Table servers only ever produce the storage-level kinds; anything else
    /// arriving over the wire means the peer is misbehaving.
    pub fn from_wire(body: ErrorResponse) -> Self {
        match body.error.as_str() {
            "store_unavailable" => Self::unavailable(body.message),
            "schema" => Self::schema(body.message),
            "validation" => Self::validation("request", body.message),
            _ => Self::internal(body.message),
        }
    }
}

impl From<serde_json::Error> for DirectoryError {
    fn from(e: serde_json::Error) -> Self {
        Self::internal(format!("Stored record could not be decoded: {}", e))
    }
}

/// JSON error body shared by every HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl From<&DirectoryError> for ErrorResponse {
    fn from(e: &DirectoryError) -> Self {
        Self {
            error: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for DirectoryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}
