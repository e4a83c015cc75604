//! `GET /thumbnail/{fileId}` -- raw cover art for one file.

use axum::http::header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{error, warn};

use crate::cover_art;
use crate::library;
use crate::metrics::{record_thumbnail, ThumbnailOutcome};
use crate::AppState;

fn plain(status: StatusCode, message: &'static str) -> Response {
    (status, [(CONTENT_TYPE, "text/plain; charset=utf-8")], message).into_response()
}

/// Return the embedded picture of `file_id` as raw bytes.
///
/// No mime hint is passed to the extractor; the container is sniffed.
#[utoipa::path(
    get,
    path = "/thumbnail/{fileId}",
    tag = "Music",
    operation_id = "GetThumbnail",
    params(("fileId" = String, Path, description = "File whose cover art to return")),
    responses(
        (status = 200, description = "Image bytes, content-type is the image mime"),
        (status = 404, description = "File has no embedded picture"),
        (status = 500, description = "Credential or fetch failure")
    )
)]
pub async fn get_thumbnail(state: Arc<AppState>, file_id: &str) -> Response {
    let token = match library::access_token(&state).await {
        Ok(token) => token,
        Err(e) => {
            error!(file_id, "Thumbnail token failure: {:#}", anyhow::Error::new(e));
            return plain(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch thumbnail");
        }
    };

    let buffer = match library::probe_bytes(&state, file_id, &token).await {
        Ok(buffer) => buffer,
        Err(e) => {
            warn!(file_id, "Thumbnail fetch failed: {}", e);
            record_thumbnail(ThumbnailOutcome::FetchFailed);
            return plain(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch thumbnail");
        }
    };

    match cover_art::extract_blocking(buffer, None).await {
        Some(thumbnail) => {
            record_thumbnail(ThumbnailOutcome::Found);
            (
                StatusCode::OK,
                [
                    (CONTENT_TYPE, thumbnail.mime_type),
                    (X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
                ],
                thumbnail.data,
            )
                .into_response()
        }
        None => {
            record_thumbnail(ThumbnailOutcome::Absent);
            plain(StatusCode::NOT_FOUND, "Thumbnail not found")
        }
    }
}
