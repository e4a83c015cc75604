//! Endpoint logic for the music API.
//!
//! The router in [`crate::server`] extracts request parts and calls into
//! these modules. Each handler carries its own OpenAPI annotation.

pub mod music;
pub mod proxy;
pub mod thumbnail;

use axum::http::HeaderMap;

use crate::config::ServerConfig;

/// Base URL that browsers use to reach this service.
///
/// `server.public_base_url` wins when set. Otherwise the URL is rebuilt
/// from the request's `Host` header, honouring `x-forwarded-proto` when a
/// reverse proxy terminates TLS in front of us.
pub fn request_base_url(server: &ServerConfig, headers: &HeaderMap) -> String {
    if !server.public_base_url.is_empty() {
        return server.public_base_url.trim_end_matches('/').to_string();
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");
    let host = headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| server.bind_address());

    format!("{scheme}://{host}")
}
