//! `GET /proxy` -- stream an audio object through this service.
//!
//! The upstream response is relayed chunk by chunk. Only the headers a
//! player needs for seeking are copied; everything else the storage
//! service sends (cookies, cache policy, upload ids) stays behind.

use axum::body::Body;
use axum::http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use axum::http::{HeaderMap, HeaderName};
use axum::response::Response;
use std::sync::Arc;
use tracing::info;

use crate::drive::DriveError;
use crate::errors::ApiError;
use crate::library;
use crate::metrics::record_proxy_stream;
use crate::AppState;

/// Upstream headers copied onto the proxied response.
pub const FORWARDED_HEADERS: [HeaderName; 4] =
    [CONTENT_TYPE, CONTENT_LENGTH, ACCEPT_RANGES, CONTENT_RANGE];

/// Keep only the whitelisted headers. `HeaderMap` names are already
/// lowercase, so the match is case-insensitive.
pub fn forward_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for name in FORWARDED_HEADERS.iter() {
        for value in upstream.get_all(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Turn an upstream media response into a streaming response with the
/// same status and the whitelisted headers.
pub fn relay(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = forward_headers(upstream.headers());

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Stream `file_id`, passing the client's `Range` header upstream.
#[utoipa::path(
    get,
    path = "/proxy",
    tag = "Stream",
    operation_id = "ProxyStream",
    params(("fileId" = String, Query, description = "File to stream")),
    responses(
        (status = 200, description = "Full audio body"),
        (status = 206, description = "Requested byte range"),
        (status = 400, description = "fileId missing"),
        (status = 404, description = "Upstream file not found"),
        (status = 500, description = "Credential or network failure")
    )
)]
pub async fn stream_file(
    state: Arc<AppState>,
    file_id: Option<&str>,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let file_id = file_id
        .filter(|f| !f.is_empty())
        .ok_or(ApiError::MissingParameter { name: "fileId" })?;

    let token = library::access_token(&state).await?;
    let range = headers.get(RANGE);

    let upstream = state
        .drive
        .open_media(file_id, &token, range)
        .await
        .map_err(|e| match e {
            DriveError::Status {
                status,
                body,
                range_headers,
            } => ApiError::UpstreamFetch {
                status,
                body,
                range_headers,
            },
            other => ApiError::Internal(other.into()),
        })?;

    record_proxy_stream(upstream.status());
    info!(
        file_id,
        status = upstream.status().as_u16(),
        ranged = range.is_some(),
        "Proxying stream"
    );
    Ok(relay(upstream))
}
