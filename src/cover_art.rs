//! Embedded cover-art extraction from a leading byte range of an audio file.
//!
//! The buffer handed to [`extract`] is usually a prefix of the real file,
//! so parsers must cope with containers that stop mid-structure:
//!
//!   1. A buffer starting with an ID3v2 header is decoded with the `id3`
//!      crate. A tag cut short by the range still yields the frames decoded
//!      before the cut.
//!   2. Otherwise, or when that tag carries no picture, the buffer is probed
//!      with symphonia, using the declared mime type as a hint only. This
//!      covers FLAC picture blocks, MP4 `covr` atoms and Vorbis comments.
//!
//! The first picture in container order wins. Every failure degrades to
//! `None`; cover art is decoration, never a reason to fail a request.

use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::{MetadataOptions, Visual};
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, warn};

/// Default inclusive end of the byte range fetched for cover art (512 KiB).
///
/// Heuristic only: large embedded images or containers that keep their
/// metadata at the end (some MP4 encoders) will not fit.
pub const THUMBNAIL_PROBE_BYTES: u64 = 512 * 1024;

/// Mime type assumed when a picture does not declare one.
const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// An embedded picture pulled out of an audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    /// Image mime type, e.g. `image/png`.
    pub mime_type: String,
    /// Raw image bytes.
    pub data: Bytes,
}

impl Thumbnail {
    /// Build a thumbnail, normalising the declared mime type.
    pub fn new(declared_mime: &str, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: normalize_mime(declared_mime),
            data: data.into(),
        }
    }

    /// Encode as `data:<mime>;base64,<payload>`.
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            BASE64_STANDARD.encode(&self.data)
        )
    }
}

/// Why a buffer could not be parsed.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("ID3 tag could not be decoded: {0}")]
    Id3(#[from] id3::Error),

    #[error("container probe failed: {0}")]
    Probe(#[from] symphonia::core::errors::Error),

    #[error("parser panicked")]
    Panicked,
}

/// Map a declared picture mime to a full image mime type.
///
/// ID3v2.2 `PIC` frames carry a bare three-letter format instead of a mime.
/// Anything that is not a plain raster `image/*` type becomes
/// `image/jpeg`, since the result is served as a `Content-Type`.
fn normalize_mime(declared: &str) -> String {
    let declared = declared.trim();
    if declared.contains('/') {
        let lower = declared.to_ascii_lowercase();
        let acceptable = lower.strip_prefix("image/").is_some_and(|subtype| {
            !subtype.is_empty()
                && !subtype.starts_with("svg")
                && subtype
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        });
        return if acceptable {
            lower
        } else {
            DEFAULT_IMAGE_MIME.to_string()
        };
    }
    match declared.to_ascii_uppercase().as_str() {
        "PNG" => "image/png",
        "GIF" => "image/gif",
        "BMP" => "image/bmp",
        "WEBP" => "image/webp",
        _ => DEFAULT_IMAGE_MIME,
    }
    .to_string()
}

/// File extension symphonia associates with a declared audio mime.
fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let base = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match base.as_str() {
        "audio/mpeg" | "audio/mp3" | "audio/mpeg3" => Some("mp3"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" | "audio/aac" => Some("m4a"),
        "audio/ogg" | "audio/vorbis" | "audio/opus" => Some("ogg"),
        "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
        _ => None,
    }
}

fn has_id3v2_header(buffer: &[u8]) -> bool {
    buffer.len() >= 10 && buffer.starts_with(b"ID3")
}

/// Offset where a leading ID3v2 tag's frames end, from the syncsafe size
/// in its header.
fn id3v2_tag_end(buffer: &[u8]) -> Option<usize> {
    if !has_id3v2_header(buffer) {
        return None;
    }
    let size = buffer[6..10]
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | usize::from(b & 0x7f));
    Some(10 + size)
}

/// First non-empty picture of a leading ID3v2 tag.
///
/// When the buffer stops before the declared end of the tag, the frame
/// decoded last may be a cut-off copy of the real one and is skipped.
fn read_id3_picture(buffer: &[u8]) -> Result<Option<Thumbnail>, id3::Error> {
    let tag = match id3::Tag::read_from2(Cursor::new(buffer)) {
        Ok(tag) => tag,
        // Truncated tag: keep whatever frames decoded before the cut.
        Err(id3::Error {
            partial_tag: Some(tag),
            ..
        }) => tag,
        Err(e) => return Err(e),
    };

    let truncated = id3v2_tag_end(buffer).is_some_and(|end| end > buffer.len());
    let frames: Vec<&id3::Frame> = tag.frames().collect();
    let complete = if truncated {
        &frames[..frames.len().saturating_sub(1)]
    } else {
        &frames[..]
    };

    let found = complete
        .iter()
        .filter_map(|frame| frame.content().picture())
        .find(|p| !p.data.is_empty())
        .map(|p| Thumbnail::new(&p.mime_type, p.data.clone()));
    Ok(found)
}

fn first_visual(visuals: &[Visual]) -> Option<Thumbnail> {
    visuals
        .iter()
        .find(|v| !v.data.is_empty())
        .map(|v| Thumbnail::new(&v.media_type, Bytes::copy_from_slice(&v.data)))
}

/// Probe the buffer with symphonia and return the first visual found in
/// the leading tags, then in the container's own metadata.
fn probe_picture(buffer: &[u8], mime_hint: Option<&str>) -> Result<Option<Thumbnail>, symphonia::core::errors::Error> {
    let source = Cursor::new(buffer.to_vec());
    let mss = MediaSourceStream::new(Box::new(source), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(mime) = mime_hint.filter(|m| !m.is_empty()) {
        hint.mime_type(mime);
        if let Some(ext) = extension_for_mime(mime) {
            hint.with_extension(ext);
        }
    }

    let mut probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    if let Some(metadata) = probed.metadata.get() {
        if let Some(found) = metadata.current().and_then(|rev| first_visual(rev.visuals())) {
            return Ok(Some(found));
        }
    }

    let metadata = probed.format.metadata();
    Ok(metadata.current().and_then(|rev| first_visual(rev.visuals())))
}

/// Parse `buffer` and return its first embedded picture.
///
/// `Ok(None)` means the buffer parsed but holds no picture.
pub fn try_extract(buffer: &[u8], mime_hint: Option<&str>) -> Result<Option<Thumbnail>, ExtractionError> {
    let mut id3_error = None;
    let mut tag_read = false;

    if has_id3v2_header(buffer) {
        match read_id3_picture(buffer) {
            Ok(Some(thumbnail)) => return Ok(Some(thumbnail)),
            Ok(None) => tag_read = true,
            Err(e) => id3_error = Some(e),
        }
    }

    match probe_picture(buffer, mime_hint) {
        Ok(found) => Ok(found),
        // The tag was readable and simply had no picture.
        Err(_) if tag_read => Ok(None),
        Err(e) => Err(match id3_error {
            Some(id3_err) => ExtractionError::Id3(id3_err),
            None => ExtractionError::Probe(e),
        }),
    }
}

/// Like [`try_extract`], but never fails: errors and parser panics are
/// logged and reported as `None`.
pub fn extract(buffer: &[u8], mime_hint: Option<&str>) -> Option<Thumbnail> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| try_extract(buffer, mime_hint)))
        .unwrap_or(Err(ExtractionError::Panicked));

    match outcome {
        Ok(found) => found,
        Err(e) => {
            debug!("Cover art extraction failed: {}", e);
            None
        }
    }
}

/// Run [`extract`] on the blocking thread pool.
pub async fn extract_blocking(buffer: Bytes, mime_hint: Option<String>) -> Option<Thumbnail> {
    match tokio::task::spawn_blocking(move || extract(&buffer, mime_hint.as_deref())).await {
        Ok(found) => found,
        Err(e) => {
            warn!("Cover art extraction task failed: {}", e);
            None
        }
    }
}
