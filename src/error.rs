//! Link error types with HTTP status code mapping.
//!
//! [`LinkError`] is the central error type of the crate. Codec failures are
//! wrapped from [`FrameError`]; each variant maps to a stable numeric code
//! and, for the REST surface, to an HTTP status and JSON error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::codec::FrameError;
use crate::domain::ConnectionId;

/// Structured JSON error response body.
///
/// All REST error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "unknown entity: temp"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see [`LinkError::error_code`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Crate-wide error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status               |
/// |-----------|-------------------|---------------------------|
/// | 1000–1999 | Schema / command  | 400 Bad Request           |
/// | 2000–2999 | Lookup            | 404 Not Found             |
/// | 3000–3999 | Connection        | 409 / 503                 |
/// | 4000–4999 | Frame codec       | 422 Unprocessable Entity  |
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Entity definition rejected (duplicate id/name, bad type sequence).
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// No entity registered under the given id or name.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// Value shape does not match the entity's layout.
    #[error("entity '{entity}' expects {expected}, got {actual}")]
    ArityMismatch {
        /// Entity name.
        entity: String,
        /// Expected shape.
        expected: String,
        /// Shape that was supplied.
        actual: String,
    },

    /// Binary frame encode/decode failure.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Command payload is not valid JSON.
    #[error("invalid json: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Text message matches no known command prefix.
    #[error("invalid command format")]
    InvalidCommand,

    /// Connection refused by the identity policy.
    #[error("connection rejected: {0}")]
    ConnectionRejected(String),

    /// The connection's writer side has gone away.
    #[error("connection {0} closed")]
    ChannelClosed(ConnectionId),

    /// The connection's outbound queue stayed full past the send timeout.
    #[error("send to connection {0} timed out")]
    SendTimeout(ConnectionId),

    /// The server is shutting down and accepts no new work.
    #[error("server is shutting down")]
    ShuttingDown,
}

impl LinkError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidSchema(_) => 1001,
            Self::ArityMismatch { .. } => 1002,
            Self::JsonParse(_) => 1003,
            Self::InvalidCommand => 1004,
            Self::UnknownEntity(_) => 2001,
            Self::ConnectionRejected(_) => 3001,
            Self::ChannelClosed(_) => 3002,
            Self::SendTimeout(_) => 3003,
            Self::ShuttingDown => 3004,
            Self::Frame(_) => 4001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSchema(_)
            | Self::ArityMismatch { .. }
            | Self::JsonParse(_)
            | Self::InvalidCommand => StatusCode::BAD_REQUEST,
            Self::UnknownEntity(_) => StatusCode::NOT_FOUND,
            Self::ConnectionRejected(_) => StatusCode::CONFLICT,
            Self::ChannelClosed(_) | Self::SendTimeout(_) | Self::ShuttingDown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Frame(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    /// Returns `true` for errors that end the affected connection.
    #[must_use]
    pub const fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::ChannelClosed(_) | Self::SendTimeout(_))
    }
}

impl IntoResponse for LinkError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
