//! Google Drive access.
//!
//! [`client::DriveClient`] wraps the three Drive calls the service makes:
//! listing the audio files of a folder, reading a leading byte range of a
//! file, and opening a file's full media stream.  Every call borrows an
//! [`AccessToken`](crate::credentials::AccessToken) for its duration only.

pub mod client;
pub mod types;

pub use client::{DriveClient, DriveError};
pub use types::AudioObjectRef;
