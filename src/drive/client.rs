//! Drive v3 REST client built on `reqwest`.
//!
//! Endpoints used:
//!   List:   `GET {api_base}/drive/v3/files?q=...&fields=...&pageToken=...`
//!   Media:  `GET {api_base}/drive/v3/files/{id}?alt=media`
//!
//! The API base is configurable so tests can point the client at a local
//! fake.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_RANGES, AUTHORIZATION, CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use super::types::{AudioObjectRef, FileListPage};
use crate::credentials::AccessToken;

/// Fields requested from `files.list`.
const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType)";

/// Errors from a single Drive call.
#[derive(Debug, Error)]
pub enum DriveError {
    /// The request never produced a response, or the body broke mid-read.
    #[error("Drive request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Drive answered with a non-success status. `range_headers` keeps the
    /// range headers of the reply (a 416 carries `content-range: bytes */len`).
    #[error("Drive returned {status}")]
    Status {
        status: StatusCode,
        body: String,
        range_headers: HeaderMap,
    },

    /// The response body could not be decoded.
    #[error("Malformed Drive response: {0}")]
    Decode(String),
}

/// Thin client over the Drive v3 files API.
#[derive(Clone)]
pub struct DriveClient {
    client: reqwest::Client,
    api_base: String,
}

impl DriveClient {
    pub fn new(client: reqwest::Client, api_base: impl Into<String>) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self { client, api_base }
    }

    /// URL-encode a Drive file id for use in API paths.
    fn encode_id(file_id: &str) -> String {
        percent_encoding::utf8_percent_encode(file_id, percent_encoding::NON_ALPHANUMERIC)
            .to_string()
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.api_base)
    }

    fn media_url(&self, file_id: &str) -> String {
        format!(
            "{}/drive/v3/files/{}?alt=media",
            self.api_base,
            Self::encode_id(file_id)
        )
    }

    /// Build the `q` expression selecting non-trashed audio files in a folder.
    pub fn audio_folder_query(folder_id: &str) -> String {
        let escaped = folder_id.replace('\\', "\\\\").replace('\'', "\\'");
        format!("'{escaped}' in parents and mimeType contains 'audio/' and trashed = false")
    }

    /// Turn a non-success response into [`DriveError::Status`].
    async fn status_error(resp: reqwest::Response) -> DriveError {
        let status = resp.status();
        let mut range_headers = HeaderMap::new();
        for name in [CONTENT_RANGE, ACCEPT_RANGES] {
            if let Some(value) = resp.headers().get(&name) {
                range_headers.insert(name, value.clone());
            }
        }
        let body = resp.text().await.unwrap_or_default();
        DriveError::Status {
            status,
            body,
            range_headers,
        }
    }

    /// List the audio files of `folder_id` in Drive's order, following
    /// page tokens until the listing is exhausted.
    pub async fn list_audio_files(
        &self,
        folder_id: &str,
        token: &AccessToken,
    ) -> Result<Vec<AudioObjectRef>, DriveError> {
        let query = Self::audio_folder_query(folder_id);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self
                .client
                .get(self.files_url())
                .header(AUTHORIZATION, token.bearer())
                .query(&[("q", query.as_str()), ("fields", LIST_FIELDS)]);

            if let Some(ref t) = page_token {
                req = req.query(&[("pageToken", t.as_str())]);
            }

            let resp = req.send().await?;
            if !resp.status().is_success() {
                return Err(Self::status_error(resp).await);
            }

            let page: FileListPage = resp
                .json()
                .await
                .map_err(|e| DriveError::Decode(e.to_string()))?;
            files.extend(page.files);

            match page.next_page_token {
                Some(t) if !t.is_empty() => page_token = Some(t),
                _ => break,
            }
        }

        debug!("Drive list: folder={} files={}", folder_id, files.len());
        Ok(files)
    }

    /// Read bytes `0..=byte_limit` of a file.
    ///
    /// If the server ignores the `Range` header and sends the whole file,
    /// reading stops once `byte_limit + 1` bytes have arrived.
    pub async fn fetch_partial(
        &self,
        file_id: &str,
        token: &AccessToken,
        byte_limit: u64,
        timeout: Option<Duration>,
    ) -> Result<Bytes, DriveError> {
        let mut req = self
            .client
            .get(self.media_url(file_id))
            .header(AUTHORIZATION, token.bearer())
            .header(RANGE, format!("bytes=0-{byte_limit}"));
        if let Some(t) = timeout {
            req = req.timeout(t);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(Self::status_error(resp).await);
        }

        let cap = usize::try_from(byte_limit.saturating_add(1)).unwrap_or(usize::MAX);
        let mut buf = BytesMut::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let room = cap - buf.len();
            if chunk.len() >= room {
                buf.extend_from_slice(&chunk[..room]);
                break;
            }
            buf.extend_from_slice(&chunk);
        }

        debug!("Drive partial fetch: id={} bytes={}", file_id, buf.len());
        Ok(buf.freeze())
    }

    /// Open the media stream of a file, forwarding an optional client
    /// `Range` header. The body is left unread for the caller to relay.
    pub async fn open_media(
        &self,
        file_id: &str,
        token: &AccessToken,
        range: Option<&HeaderValue>,
    ) -> Result<reqwest::Response, DriveError> {
        let mut req = self
            .client
            .get(self.media_url(file_id))
            .header(AUTHORIZATION, token.bearer());
        if let Some(r) = range {
            req = req.header(RANGE, r.clone());
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(Self::status_error(resp).await);
        }
        Ok(resp)
    }
}
