//! CloudTunes library -- music listing and streaming over a Drive folder.
//!
//! This crate lists the audio files of a cloud storage folder, extracts
//! embedded cover art from the leading bytes of each file, and relays
//! audio bytes to players through a streaming proxy.

use std::sync::Arc;

pub mod config;
pub mod cover_art;
pub mod credentials;
pub mod drive;
pub mod errors;
pub mod handlers;
pub mod library;
pub mod metrics;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::Config;
use crate::credentials::CredentialProvider;
use crate::drive::DriveClient;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Service configuration.
    pub config: Config,
    /// Source of bearer tokens for Drive calls.
    pub credentials: Arc<dyn CredentialProvider>,
    /// Drive files API client.
    pub drive: DriveClient,
}
