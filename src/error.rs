// Tatakai Offline - Offline episode downloads for the Tatakai client
// Copyright (C) 2025 Tatakai contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Error types for the offline download core
//!
//! All fallible operations in this crate return [`Result<T>`], an alias over
//! [`OfflineError`]. The variants fall into four groups:
//!
//! ### Queue preconditions (rejected synchronously)
//! - `AlreadyQueued`, `AlreadyDownloaded` at enqueue time
//! - `JobNotFound`, `InvalidTransition` for retry misuse
//!
//! ### Transfer failures (caught per job, recorded on the job)
//! - `EmptyPlaylist`, `SegmentFailed`, `HttpStatus`, `PlaylistTooDeep`
//! - `TransferFailed` for the native bulk-transfer layer
//!
//! ### Cancellation
//! - `Cancelled` is not a failure. The queue removes a cancelled job instead
//!   of marking it `failed`.
//!
//! ### Platform / infrastructure
//! - filesystem, local storage, configuration and the `#[from]` wrappers

use thiserror::Error;

/// Result type alias using our OfflineError type
pub type Result<T> = std::result::Result<T, OfflineError>;

/// Main error type for the download core
#[derive(Error, Debug)]
pub enum OfflineError {
    // ===== Queue Preconditions =====

    /// A job with the same id is already in the queue
    #[error("Already in queue: {0}")]
    AlreadyQueued(String),

    /// The episode already has a completed offline copy
    #[error("Already downloaded: {0}")]
    AlreadyDownloaded(String),

    /// No job with this id exists in the queue
    #[error("Download job not found: {0}")]
    JobNotFound(String),

    /// A status change outside the job transition table
    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    /// The stored source URL for a job is missing
    #[error("No video URL found in storage for {0}")]
    MissingSource(String),

    // ===== Transfer Errors =====

    /// Playlist resolved to zero media segments
    #[error("No segments found in playlist: {0}")]
    EmptyPlaylist(String),

    /// A media segment failed on both the first attempt and the retry
    #[error("Segment {index}/{total} failed: {reason}")]
    SegmentFailed {
        /// 1-based segment position
        index: usize,
        total: usize,
        reason: String,
    },

    /// Server answered with a non-success status
    #[error("HTTP {code} for {url}")]
    HttpStatus { code: u16, url: String },

    /// Variant playlists nested deeper than the configured limit
    #[error("Playlist nesting exceeds {depth} levels")]
    PlaylistTooDeep { depth: usize },

    /// Native bulk transfer reported a failure
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// Source or segment URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Transfer was cancelled by the user or system
    #[error("Download cancelled")]
    Cancelled,

    // ===== Platform Errors =====

    /// Platform service (wake lock, notification) unavailable
    #[error("Platform not supported: {0}")]
    PlatformNotSupported(String),

    /// Generic file I/O error with context
    #[error("File I/O error: {0}")]
    FileIoError(String),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Local storage schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed base64 chunk handed to the filesystem bridge
    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    /// URL join/parse error
    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl OfflineError {
    /// Create an HttpStatus error
    pub fn http_status<S: Into<String>>(code: u16, url: S) -> Self {
        OfflineError::HttpStatus {
            code,
            url: url.into(),
        }
    }

    /// True for user/system cancellation; such jobs are removed, not failed
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OfflineError::Cancelled)
    }

    /// True for errors rejected before any job is created or mutated
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            OfflineError::AlreadyQueued(_)
                | OfflineError::AlreadyDownloaded(_)
                | OfflineError::JobNotFound(_)
                | OfflineError::InvalidTransition { .. }
        )
    }

    /// Check if a failed fetch may be attempted again
    ///
    /// Cancellation and precondition errors never are. Everything raised by
    /// the network or the filesystem during a segment fetch is.
    pub fn is_retryable(&self) -> bool {
        !self.is_cancelled() && !self.is_precondition()
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            OfflineError::AlreadyQueued(_) => "This episode is already in your download queue.".to_string(),
            OfflineError::AlreadyDownloaded(_) => "This episode is already available offline.".to_string(),
            OfflineError::EmptyPlaylist(_) => "The stream has no downloadable segments.".to_string(),
            OfflineError::SegmentFailed { index, total, .. } => {
                format!("Download stopped at segment {}/{}. Tap retry to start again.", index, total)
            }
            OfflineError::HttpStatus { code, .. } => format!("The server refused the download (HTTP {}).", code),
            OfflineError::Cancelled => "Download cancelled.".to_string(),
            _ => self.to_string(),
        }
    }
}
