//! Test support: a fake Drive + OAuth upstream and audio fixtures.
//!
//! [`FakeDrive`] binds an axum server on `127.0.0.1:0` that answers the
//! subset of the Drive v3 files API the service uses, plus a token
//! endpoint. It records what it was asked so tests can assert on ranges,
//! pagination and concurrency.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use id3::TagLike;

/// Bearer token the fake accepts.
pub(crate) const TEST_TOKEN: &str = "test-token";

/// A tiny JFIF-shaped payload. Only its bytes matter.
pub(crate) const JPEG_FIXTURE: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0xFF, 0xDB, 0x00, 0x04, 0x00, 0x08, 0xFF, 0xD9,
];

/// PNG signature plus an IEND chunk.
pub(crate) const PNG_FIXTURE: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x00, b'I', b'E', b'N',
    b'D', 0xAE, 0x42, 0x60, 0x82,
];

/// An ID3v2.4 tag holding `pictures` in order, followed by `filler` bytes
/// standing in for audio frames.
pub(crate) fn id3_fixture(pictures: &[(&str, &[u8])], filler: usize) -> Vec<u8> {
    let mut tag = id3::Tag::new();
    for (i, (mime, data)) in pictures.iter().enumerate() {
        tag.add_frame(id3::frame::Picture {
            mime_type: mime.to_string(),
            picture_type: if i == 0 {
                id3::frame::PictureType::CoverFront
            } else {
                id3::frame::PictureType::Other
            },
            description: format!("picture {i}"),
            data: data.to_vec(),
        });
    }
    finish_fixture(tag, filler)
}

/// An ID3v2.4 tag with a title but no picture.
pub(crate) fn id3_fixture_with_title_only(filler: usize) -> Vec<u8> {
    let mut tag = id3::Tag::new();
    tag.set_title("No Artwork");
    tag.set_artist("Fixture");
    finish_fixture(tag, filler)
}

fn finish_fixture(tag: id3::Tag, filler: usize) -> Vec<u8> {
    let mut out = Vec::new();
    tag.write_to(&mut out, id3::Version::Id3v24)
        .expect("fixture tag encodes");
    out.extend(std::iter::repeat(0u8).take(filler));
    out
}

/// CRC-8 (polynomial 0x07) as used by FLAC frame headers.
fn flac_crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |mut crc, byte| {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
        }
        crc
    })
}

/// A FLAC stream: STREAMINFO (44.1 kHz, stereo, 16-bit, 4096-sample
/// blocks), one PICTURE block, then the header of the first audio frame
/// followed by `filler` bytes.
pub(crate) fn flac_fixture(picture_mime: &str, picture: &[u8], filler: usize) -> Vec<u8> {
    let mut out = b"fLaC".to_vec();

    let mut info = Vec::with_capacity(34);
    info.extend_from_slice(&4096u16.to_be_bytes());
    info.extend_from_slice(&4096u16.to_be_bytes());
    info.extend_from_slice(&[0u8; 6]);
    let packed: u64 = (44_100u64 << 44) | (1u64 << 41) | (15u64 << 36);
    info.extend_from_slice(&packed.to_be_bytes());
    info.extend_from_slice(&[0u8; 16]);
    out.push(0x00);
    out.extend_from_slice(&(info.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(&info);

    let mut block = Vec::new();
    block.extend_from_slice(&3u32.to_be_bytes());
    block.extend_from_slice(&(picture_mime.len() as u32).to_be_bytes());
    block.extend_from_slice(picture_mime.as_bytes());
    block.extend_from_slice(&0u32.to_be_bytes());
    for _ in 0..4 {
        block.extend_from_slice(&0u32.to_be_bytes());
    }
    block.extend_from_slice(&(picture.len() as u32).to_be_bytes());
    block.extend_from_slice(picture);
    out.push(0x80 | 6);
    out.extend_from_slice(&(block.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(&block);

    // Fixed blocking, 4096 samples, 44.1 kHz, two channels, 16 bits, frame 0.
    let mut frame = vec![0xFF, 0xF8, 0xC9, 0x18, 0x00];
    frame.push(flac_crc8(&frame));
    out.extend_from_slice(&frame);
    out.extend(std::iter::repeat(0u8).take(filler));
    out
}

/// A file served by the fake.
#[derive(Debug, Clone)]
pub(crate) struct FakeFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl FakeFile {
    pub fn audio(id: &str, name: &str, data: Vec<u8>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: "audio/mpeg".to_string(),
            data: Bytes::from(data),
        }
    }

    pub fn with_mime(mut self, mime: &str) -> Self {
        self.mime_type = mime.to_string();
        self
    }
}

struct Shared {
    folders: HashMap<String, Vec<FakeFile>>,
    files: HashMap<String, FakeFile>,
    page_size: usize,
    ignore_range: bool,
    media_delay: Duration,
    reject_token_refresh: bool,
    list_calls: AtomicUsize,
    token_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    media_requests: Mutex<Vec<(String, Option<String>)>>,
}

/// Builder for [`FakeDrive`].
pub(crate) struct FakeDriveBuilder {
    folders: Vec<(String, Vec<FakeFile>)>,
    page_size: usize,
    ignore_range: bool,
    media_delay: Duration,
    reject_token_refresh: bool,
}

impl FakeDriveBuilder {
    pub fn folder(mut self, id: &str, files: Vec<FakeFile>) -> Self {
        self.folders.push((id.to_string(), files));
        self
    }

    pub fn page_size(mut self, n: usize) -> Self {
        self.page_size = n.max(1);
        self
    }

    /// Answer media requests with the full body even when a range is asked.
    pub fn ignore_range(mut self) -> Self {
        self.ignore_range = true;
        self
    }

    /// Delay every media response, so concurrent fetches overlap.
    pub fn media_delay(mut self, delay: Duration) -> Self {
        self.media_delay = delay;
        self
    }

    /// Make the token endpoint answer `invalid_grant`.
    pub fn reject_token_refresh(mut self) -> Self {
        self.reject_token_refresh = true;
        self
    }

    pub async fn spawn(self) -> FakeDrive {
        let mut files = HashMap::new();
        let mut folders = HashMap::new();
        for (folder, entries) in self.folders {
            for f in &entries {
                files.insert(f.id.clone(), f.clone());
            }
            folders.insert(folder, entries);
        }

        let shared = Arc::new(Shared {
            folders,
            files,
            page_size: self.page_size,
            ignore_range: self.ignore_range,
            media_delay: self.media_delay,
            reject_token_refresh: self.reject_token_refresh,
            list_calls: AtomicUsize::new(0),
            token_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            media_requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/drive/v3/files", get(list_files))
            .route("/drive/v3/files/:id", get(get_media))
            .route("/token", post(issue_token))
            .with_state(shared.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake drive");
        let addr = listener.local_addr().expect("fake drive addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        FakeDrive { addr, shared }
    }
}

/// Handle to a running fake upstream.
pub(crate) struct FakeDrive {
    addr: SocketAddr,
    shared: Arc<Shared>,
}

impl FakeDrive {
    pub fn builder() -> FakeDriveBuilder {
        FakeDriveBuilder {
            folders: Vec::new(),
            page_size: 100,
            ignore_range: false,
            media_delay: Duration::ZERO,
            reject_token_refresh: false,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn token_uri(&self) -> String {
        format!("http://{}/token", self.addr)
    }

    pub fn list_calls(&self) -> usize {
        self.shared.list_calls.load(Ordering::SeqCst)
    }

    pub fn token_calls(&self) -> usize {
        self.shared.token_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    /// `Range` headers received for `file_id`, in arrival order.
    pub fn media_ranges(&self, file_id: &str) -> Vec<Option<String>> {
        self.shared
            .media_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == file_id)
            .map(|(_, range)| range.clone())
            .collect()
    }
}

fn drive_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": { "code": status.as_u16(), "message": message }
        })),
    )
        .into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TEST_TOKEN}"))
}

/// Pull the folder id out of `'<folder>' in parents and ...`.
fn folder_from_query(q: &str) -> Option<&str> {
    q.strip_prefix('\'')?.split_once("' in parents").map(|(f, _)| f)
}

async fn list_files(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    shared.list_calls.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return drive_error(StatusCode::UNAUTHORIZED, "Invalid Credentials");
    }

    let q = params.get("q").map(String::as_str).unwrap_or("");
    let Some(folder) = folder_from_query(q) else {
        return drive_error(StatusCode::BAD_REQUEST, "Invalid Value");
    };
    let Some(entries) = shared.folders.get(folder) else {
        return drive_error(StatusCode::NOT_FOUND, &format!("File not found: {folder}."));
    };

    let start: usize = params
        .get("pageToken")
        .and_then(|t| t.parse().ok())
        .unwrap_or(0);
    let end = (start + shared.page_size).min(entries.len());
    let files: Vec<serde_json::Value> = entries[start.min(end)..end]
        .iter()
        .map(|f| serde_json::json!({ "id": f.id, "name": f.name, "mimeType": f.mime_type }))
        .collect();

    let mut body = serde_json::json!({ "files": files });
    if end < entries.len() {
        body["nextPageToken"] = serde_json::Value::String(end.to_string());
    }
    Json(body).into_response()
}

/// Resolve `bytes=a-b` / `bytes=a-` against `total`.
fn resolve_range(range: &str, total: usize) -> Option<(usize, usize)> {
    let spec = range.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: usize = start.parse().ok()?;
    if start >= total {
        return None;
    }
    let end = if end.is_empty() {
        total - 1
    } else {
        end.parse::<usize>().ok()?.min(total - 1)
    };
    (start <= end).then_some((start, end))
}

struct InFlight<'a>(&'a Shared);

impl<'a> InFlight<'a> {
    fn enter(shared: &'a Shared) -> Self {
        let now = shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        shared.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn get_media(
    State(shared): State<Arc<Shared>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let range = headers
        .get("range")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    shared
        .media_requests
        .lock()
        .unwrap()
        .push((id.clone(), range.clone()));

    if !authorized(&headers) {
        return drive_error(StatusCode::UNAUTHORIZED, "Invalid Credentials");
    }

    let _guard = InFlight::enter(&shared);
    if !shared.media_delay.is_zero() {
        tokio::time::sleep(shared.media_delay).await;
    }

    let Some(file) = shared.files.get(&id) else {
        return drive_error(StatusCode::NOT_FOUND, &format!("File not found: {id}."));
    };

    let total = file.data.len();
    let (status, body, content_range) = match range.as_deref() {
        Some(r) if !shared.ignore_range => match resolve_range(r, total) {
            Some((start, end)) => (
                StatusCode::PARTIAL_CONTENT,
                file.data.slice(start..end + 1),
                Some(format!("bytes {start}-{end}/{total}")),
            ),
            None => {
                return (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    [("content-range", format!("bytes */{total}"))],
                )
                    .into_response()
            }
        },
        _ => (StatusCode::OK, file.data.clone(), None),
    };

    let mut response = (status, body).into_response();
    let hdrs = response.headers_mut();
    hdrs.insert(
        "content-type",
        HeaderValue::from_str(&file.mime_type).expect("fixture mime is a valid header"),
    );
    hdrs.insert("accept-ranges", HeaderValue::from_static("bytes"));
    if let Some(cr) = content_range {
        hdrs.insert("content-range", HeaderValue::from_str(&cr).expect("valid range"));
    }
    // Upstream-internal headers that must never reach clients.
    hdrs.insert("cache-control", HeaderValue::from_static("private, max-age=0"));
    hdrs.insert("x-goog-hash", HeaderValue::from_static("crc32c=AAAAAA=="));
    hdrs.insert("x-guploader-uploadid", HeaderValue::from_static("fake-upload-id"));
    hdrs.insert("set-cookie", HeaderValue::from_static("upstream=1"));
    response
}

async fn issue_token(State(shared): State<Arc<Shared>>) -> Response {
    shared.token_calls.fetch_add(1, Ordering::SeqCst);
    if shared.reject_token_refresh {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "invalid_grant" })),
        )
            .into_response();
    }
    Json(serde_json::json!({ "access_token": TEST_TOKEN, "expires_in": 3600 })).into_response()
}
