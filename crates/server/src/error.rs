//! Structured errors for the caching host.
//!
//! These map interception failures onto HTTP statuses.

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde_json::json;

use gramsevak_core::Error;

/// Errors surfaced to the client application.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Install and activation have not completed.
    #[error("NOT_READY: cache is not active")]
    NotReady,

    /// The inbound request could not be described.
    #[error("INVALID_INPUT: {0}")]
    BadRequest(String),

    /// Interception or pass-through failed.
    #[error("{0}")]
    Upstream(#[from] Error),
}

impl HostError {
    pub fn status(&self) -> StatusCode {
        match self {
            HostError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            HostError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HostError::Upstream(Error::InvalidInput(_) | Error::InvalidUrl(_)) => StatusCode::BAD_REQUEST,
            HostError::Upstream(Error::FetchTimeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            HostError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for HostError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            HostError::Upstream(e) if !e.is_network() => {
                tracing::error!(status = status.as_u16(), error = %self, "request failed")
            }
            _ => tracing::warn!(status = status.as_u16(), error = %self, "request failed"),
        }
        (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}
