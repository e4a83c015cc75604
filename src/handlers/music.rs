//! `GET /api/music` -- folder listing with cover art.

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use crate::errors::ApiError;
use crate::library::{self, MusicListing};
use crate::AppState;

/// List the audio files in a folder.
///
/// `folder_id` falls back to `library.default_folder_id` when absent or
/// empty. Stream URLs point back at this service's `/proxy` route.
#[utoipa::path(
    get,
    path = "/api/music",
    tag = "Music",
    operation_id = "ListMusic",
    params(("folderId" = Option<String>, Query, description = "Folder to list")),
    responses(
        (status = 200, description = "Audio files with cover art", body = MusicListing),
        (status = 500, description = "Credential or listing failure")
    )
)]
pub async fn list_music(
    state: Arc<AppState>,
    folder_id: Option<&str>,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let folder_id = folder_id
        .filter(|f| !f.is_empty())
        .unwrap_or(state.config.library.default_folder_id.as_str());
    let base_url = super::request_base_url(&state.config.server, headers);

    let files = library::list_songs(&state, folder_id, &base_url).await?;
    Ok(Json(MusicListing { files }).into_response())
}
