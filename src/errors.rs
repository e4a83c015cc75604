//! API error types.
//!
//! Every variant maps to an HTTP status and body shape.  The enum
//! implements [`axum::response::IntoResponse`] so handlers can simply
//! return `Err(ApiError::MissingParameter { .. })`.

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes)
}

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A required query parameter was absent or empty.
    #[error("Missing {name}")]
    MissingParameter { name: &'static str },

    /// No access token could be obtained.
    #[error("Failed to obtain access token")]
    Credential(#[source] anyhow::Error),

    /// The folder listing call failed. Status and body are relayed as-is.
    #[error("Upstream listing failed with status {status}")]
    UpstreamList { status: StatusCode, body: String },

    /// A media fetch returned a non-success status. The status is mirrored,
    /// along with the upstream range headers.
    #[error("Upstream fetch failed with status {status}")]
    UpstreamFetch {
        status: StatusCode,
        body: String,
        range_headers: HeaderMap,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Return the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingParameter { .. } => StatusCode::BAD_REQUEST,
            ApiError::Credential(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::UpstreamList { status, .. } => *status,
            ApiError::UpstreamFetch { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable detail for the `details` field of the JSON body.
    fn details(&self) -> String {
        match self {
            ApiError::MissingParameter { .. } => String::new(),
            ApiError::Credential(e) | ApiError::Internal(e) => format!("{e:#}"),
            ApiError::UpstreamList { body, .. } => body.clone(),
            ApiError::UpstreamFetch { status, body, .. } => {
                if body.is_empty() {
                    format!("upstream returned {status}")
                } else {
                    format!("upstream returned {status}: {body}")
                }
            }
        }
    }
}

impl ApiError {
    fn json_response(&self, status: StatusCode) -> Response {
        tracing::error!(error = %self, details = %self.details(), "Request failed");
        (
            status,
            axum::Json(json!({
                "error": self.to_string(),
                "details": self.details(),
            })),
        )
            .into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match self {
            ApiError::MissingParameter { .. } => {
                (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
            }
            // Relay the lister's own diagnostics untouched.
            ApiError::UpstreamList { body, .. } => {
                let content_type = if serde_json::from_str::<serde_json::Value>(&body).is_ok() {
                    "application/json"
                } else {
                    "text/plain; charset=utf-8"
                };
                let mut response = (status, body).into_response();
                response
                    .headers_mut()
                    .insert("content-type", HeaderValue::from_static(content_type));
                response
            }
            ApiError::UpstreamFetch {
                ref range_headers, ..
            } => {
                let mut response = self.json_response(status);
                response.headers_mut().extend(range_headers.clone());
                response
            }
            _ => self.json_response(status),
        }
    }
}
