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


//! Tatakai offline downloads
//!
//! Queue, transfer and library core behind the mobile app's offline
//! episodes. The host shell injects its filesystem, native transfer, wake
//! lock and notification services through [`platform`]; desktop builds and
//! the `tatakai-dl` CLI use the bundled implementations.
//!
//! # Modules
//! - [`download`]: queue manager and transfer pipeline
//! - [`platform`]: device service traits and desktop implementations
//! - [`storage`]: SQLite-backed local storage for the queue
//! - [`file`]: library path layout
//! - [`config`], [`error`]

uniffi::setup_scaffolding!();

pub mod config;
pub mod download;
pub mod error;
pub mod file;
pub mod platform;
pub mod storage;

pub use config::DownloadConfig;
pub use download::{DownloadJob, DownloadManager, EnqueueRequest, JobStatus, ManagerDeps};
pub use error::{OfflineError, Result};

/// Queue id for an episode, as the app builds it
#[uniffi::export]
pub fn episode_job_id(anime_id: String, season: u32, episode: u32) -> String {
    download::episode_job_id(&anime_id, season, episode)
}

/// Directory-safe form of a content id
#[uniffi::export]
pub fn sanitize_content_id(content_id: String, max_len: u32) -> String {
    file::sanitize_content_id(&content_id, max_len as usize)
}

/// Whether a source URL will be downloaded segment by segment
#[uniffi::export]
pub fn is_hls_source(url: String) -> bool {
    download::TransferStrategy::select(&url) == download::TransferStrategy::Hls
}
