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


//! Offline episode download pipeline
//!
//! Leaves first:
//! - [`fetcher`]: HTTP GETs, retry-once segment fetch
//! - [`writer`]: windowed base64 appends to the video file
//! - [`playlist`]: M3U8 variant/media parsing
//! - [`strategy`] and [`stream`]: HLS versus native transfer with fallback
//! - [`session`]: wake lock and foreground notification
//! - [`progress`] and [`events`]: throughput, ETA, queue broadcast
//! - [`library`]: manifests of finished episodes
//! - [`manager`]: the queue and its single worker

pub mod events;
pub mod fetcher;
pub mod job;
pub mod library;
pub mod manager;
pub mod playlist;
pub mod progress;
pub mod session;
pub mod strategy;
pub mod stream;
pub mod writer;

pub use events::{QueueEvents, QueueSnapshot};
pub use fetcher::{HttpFetcher, ReqwestFetcher};
pub use job::{episode_job_id, DownloadJob, DownloadSource, EnqueueRequest, JobId, JobStatus};
pub use library::{OfflineEpisode, OfflineLibrary};
pub use manager::{DownloadManager, ManagerDeps};
pub use strategy::TransferStrategy;
