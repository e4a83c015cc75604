//! Axum router construction and route mapping.
//!
//! The [`app`] function wires every endpoint to its handler in
//! [`crate::handlers`] and returns a ready-to-serve [`axum::Router`].
//! Embedding hosts can mount the same router under their own runtime.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi;

use crate::config::CorsConfig;
use crate::errors::{generate_request_id, ApiError};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the CloudTunes API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "CloudTunes API",
        version = "0.1.0",
        description = "Music listing and streaming over a cloud storage folder"
    ),
    paths(
        health_check,
        crate::handlers::music::list_music,
        crate::handlers::proxy::stream_file,
        crate::handlers::thumbnail::get_thumbnail,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Music", description = "Folder listing and cover art"),
        (name = "Stream", description = "Audio streaming proxy"),
    )
)]
struct ApiDoc;

// -- Router -------------------------------------------------------------------

/// Build the axum [`Router`] with all routes and layers.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        .route("/api/music", get(handle_list_music))
        .route("/proxy", get(handle_proxy))
        .route("/thumbnail/:file_id", get(handle_thumbnail))
        .with_state(state)
        // Inner layers run first; metrics is outermost so it sees every
        // response, including CORS preflights.
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
}

/// CORS for browser players: explicit origins with credentials allowed.
fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::RANGE, header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([
            header::CONTENT_RANGE,
            header::CONTENT_LENGTH,
            header::ACCEPT_RANGES,
        ])
}

// -- Common headers middleware ------------------------------------------------

/// Adds `x-request-id` (16 hex chars) and `server` to every response.
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }
    headers.insert(header::SERVER, HeaderValue::from_static("CloudTunes"));

    response
}

// -- Health / docs ------------------------------------------------------------

/// `GET /health` -- liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service is up"))
)]
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// `GET /openapi.json` -- the generated OpenAPI document.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// -- Route handlers -----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MusicQuery {
    #[serde(rename = "folderId")]
    folder_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProxyQuery {
    #[serde(rename = "fileId")]
    file_id: Option<String>,
}

/// `GET /api/music?folderId=...`
async fn handle_list_music(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MusicQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    crate::handlers::music::list_music(state, query.folder_id.as_deref(), &headers).await
}

/// `GET /proxy?fileId=...`
async fn handle_proxy(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    crate::handlers::proxy::stream_file(state, query.file_id.as_deref(), &headers).await
}

/// `GET /thumbnail/:file_id`
async fn handle_thumbnail(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Response {
    crate::handlers::thumbnail::get_thumbnail(state, &file_id).await
}

// -- Tests --------------------------------------------------------------------
