//! Song listing: folder listing plus concurrent cover-art extraction.
//!
//! One access token is acquired per listing and borrowed by every
//! per-file fetch. Per-file work (partial fetch, then parse on the
//! blocking pool) runs concurrently up to
//! `library.max_concurrent_extractions`, and results come back in the
//! order the folder listing returned them.

use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cover_art::{self, Thumbnail};
use crate::credentials::AccessToken;
use crate::drive::{AudioObjectRef, DriveError};
use crate::errors::ApiError;
use crate::metrics::{record_thumbnail, ThumbnailOutcome};
use crate::AppState;

/// One entry of the `/api/music` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SongDescriptor {
    /// Drive file id.
    pub id: String,
    /// File name.
    pub name: String,
    /// Declared audio mime type.
    pub mime_type: String,
    /// Cover art as a `data:` URI, or null.
    pub thumbnail: Option<String>,
    /// Stream URL served by this service's `/proxy` route.
    pub url: String,
}

impl SongDescriptor {
    fn new(file: AudioObjectRef, thumbnail: Option<Thumbnail>, base_url: &str) -> Self {
        let url = stream_url(base_url, &file.id);
        Self {
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
            thumbnail: thumbnail.map(|t| t.to_data_uri()),
            url,
        }
    }
}

/// `{"files": [...]}` body of `/api/music`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MusicListing {
    pub files: Vec<SongDescriptor>,
}

/// Stream URL for a file id. The id is embedded as-is (percent-encoded),
/// so the URL always resolves to the same object.
pub fn stream_url(base_url: &str, file_id: &str) -> String {
    format!(
        "{}/proxy?fileId={}",
        base_url.trim_end_matches('/'),
        percent_encoding::utf8_percent_encode(file_id, percent_encoding::NON_ALPHANUMERIC)
    )
}

/// Acquire an access token, mapping failure to [`ApiError::Credential`].
pub async fn access_token(state: &AppState) -> Result<AccessToken, ApiError> {
    state
        .credentials
        .access_token()
        .await
        .map_err(ApiError::Credential)
}

/// Fetch the leading byte range used for cover-art extraction.
pub async fn probe_bytes(
    state: &AppState,
    file_id: &str,
    token: &AccessToken,
) -> Result<Bytes, DriveError> {
    let library = &state.config.library;
    let timeout = library.thumbnail_fetch_timeout_secs.map(Duration::from_secs);
    state
        .drive
        .fetch_partial(file_id, token, library.thumbnail_probe_bytes, timeout)
        .await
}

/// Fetch the leading bytes of a file and extract its cover art.
///
/// Never fails: fetch and parse errors are logged and become `None`.
pub async fn thumbnail_for(
    state: &AppState,
    file_id: &str,
    mime_hint: Option<&str>,
    token: &AccessToken,
) -> Option<Thumbnail> {
    let buffer = match probe_bytes(state, file_id, token).await {
        Ok(buffer) => buffer,
        Err(e) => {
            warn!(file_id, "Cover art fetch failed: {}", e);
            record_thumbnail(ThumbnailOutcome::FetchFailed);
            return None;
        }
    };

    let hint = mime_hint.filter(|m| !m.is_empty()).map(str::to_string);
    let found = cover_art::extract_blocking(buffer, hint).await;
    if found.is_some() {
        record_thumbnail(ThumbnailOutcome::Found);
    } else {
        debug!(file_id, "No cover art found");
        record_thumbnail(ThumbnailOutcome::Absent);
    }
    found
}

/// List the audio files of `folder_id` with their cover art.
pub async fn list_songs(
    state: &AppState,
    folder_id: &str,
    base_url: &str,
) -> Result<Vec<SongDescriptor>, ApiError> {
    let token = access_token(state).await?;

    let files = state
        .drive
        .list_audio_files(folder_id, &token)
        .await
        .map_err(|e| match e {
            DriveError::Status { status, body, .. } => ApiError::UpstreamList { status, body },
            other => ApiError::Internal(other.into()),
        })?;

    let concurrency = state.config.library.max_concurrent_extractions.max(1);
    info!(
        "Listing folder={} files={} concurrency={}",
        folder_id,
        files.len(),
        concurrency
    );

    let token = &token;
    let songs = stream::iter(files)
        .map(|file| async move {
            let thumbnail = thumbnail_for(state, &file.id, Some(file.mime_type.as_str()), token).await;
            SongDescriptor::new(file, thumbnail, base_url)
        })
        .buffered(concurrency)
        .collect::<Vec<_>>()
        .await;

    Ok(songs)
}
