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


//! Moves one job's media from the network to its video file
//!
//! # Paths
//! - HLS: resolve the playlist, then fetch and append segments strictly in
//!   playlist order, one at a time
//! - Direct: hand the URL to the native [`BulkTransfer`]; if that fails for
//!   any reason other than cancellation, stream the body through
//!   [`HttpFetcher::get_stream`] and the [`ChunkedWriter`] instead
//!
//! Cancellation is checked before every segment and every stream read, and
//! raced against requests that are in flight.

use crate::config::DownloadConfig;
use crate::download::fetcher::{cancellable, HttpFetcher, SegmentFetcher};
use crate::download::job::DownloadSource;
use crate::download::playlist::resolve_segments;
use crate::download::progress::{ProgressTracker, ProgressUpdate};
use crate::download::strategy::TransferStrategy;
use crate::download::writer::ChunkedWriter;
use crate::error::{OfflineError, Result};
use crate::platform::{BulkTransfer, FileSystem, TransferProgress, TransferProgressFn};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Receives progress while a job is transferring
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, update: ProgressUpdate);
}

/// Everything one transfer needs, borrowed from the queue for its duration
pub struct JobStream<'a> {
    pub fetcher: &'a dyn HttpFetcher,
    pub transfer: &'a dyn BulkTransfer,
    pub fs: &'a dyn FileSystem,
    pub config: &'a DownloadConfig,
    pub source: &'a DownloadSource,
    pub token: &'a CancellationToken,
    pub progress: &'a dyn ProgressSink,
}

impl<'a> JobStream<'a> {
    /// Transfer the source into `video_path`; returns bytes written
    pub async fn run(&self, video_path: &str) -> Result<u64> {
        if self.token.is_cancelled() {
            return Err(OfflineError::Cancelled);
        }

        match TransferStrategy::select(&self.source.url) {
            TransferStrategy::Hls => self.download_hls(video_path).await,
            TransferStrategy::Direct => self.download_direct(video_path).await,
        }
    }

    async fn download_hls(&self, video_path: &str) -> Result<u64> {
        let url = Url::parse(&self.source.url)
            .map_err(|e| OfflineError::InvalidUrl(format!("{}: {}", self.source.url, e)))?;

        let segments = resolve_segments(
            self.fetcher,
            &url,
            &self.source.headers,
            self.token,
            self.config.max_playlist_depth,
        )
        .await?;

        let total = segments.len();
        info!(segments = total, "Playlist resolved");

        let mut writer = ChunkedWriter::create(self.fs, video_path, self.config.encode_window_bytes).await?;
        let segment_fetcher = SegmentFetcher::new(self.fetcher, &self.source.headers, self.token);
        let mut tracker = ProgressTracker::segments(total as u64, self.config.progress_interval());

        for (index, segment) in segments.iter().enumerate() {
            if self.token.is_cancelled() {
                return Err(OfflineError::Cancelled);
            }

            let bytes = segment_fetcher.fetch(index, total, segment).await?;
            writer.append(&bytes).await?;
            debug!(segment = index + 1, total, bytes = bytes.len(), "Segment written");

            if let Some(update) = tracker.record((index + 1) as u64, writer.bytes_written(), Instant::now()) {
                self.progress.report(update).await;
            }
        }

        Ok(writer.bytes_written())
    }

    async fn download_direct(&self, video_path: &str) -> Result<u64> {
        match self.download_native(video_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!(error = %e, "Native transfer failed, falling back to streamed fetch");
                self.download_streamed(video_path).await
            }
        }
    }

    async fn download_native(&self, video_path: &str) -> Result<u64> {
        let uri = self.fs.resolve_uri(video_path)?;
        // Metered from before the transfer starts; the size arrives with the first event
        let mut tracker = ProgressTracker::bytes(None, self.config.progress_interval());

        let (tx, mut rx) = mpsc::unbounded_channel::<TransferProgress>();
        let on_progress: TransferProgressFn = Arc::new(move |p| {
            let _ = tx.send(p);
        });

        let transfer = self
            .transfer
            .download_file(&self.source.url, &uri, &self.source.headers, on_progress);
        tokio::pin!(transfer);

        let mut received = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(OfflineError::Cancelled),
                Some(p) = rx.recv() => {
                    received = p.bytes;
                    tracker.learn_total(p.content_length);
                    if let Some(update) = tracker.record(p.bytes, p.bytes, Instant::now()) {
                        self.progress.report(update).await;
                    }
                }
                result = &mut transfer => {
                    result?;
                    break;
                }
            }
        }

        // Late progress events still carry the final byte count
        while let Ok(p) = rx.try_recv() {
            received = p.bytes;
        }

        Ok(received)
    }

    async fn download_streamed(&self, video_path: &str) -> Result<u64> {
        let response = cancellable(
            self.token,
            self.fetcher.get_stream(&self.source.url, &self.source.headers),
        )
        .await?;

        let mut writer = ChunkedWriter::create(self.fs, video_path, self.config.encode_window_bytes).await?;
        let mut tracker = ProgressTracker::bytes(response.content_length, self.config.progress_interval());
        let mut body = response.body;

        loop {
            if self.token.is_cancelled() {
                return Err(OfflineError::Cancelled);
            }

            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(OfflineError::Cancelled),
                chunk = body.next() => chunk,
            };

            let Some(chunk) = next else { break };
            let chunk = chunk?;
            writer.append(&chunk).await?;

            let written = writer.bytes_written();
            if let Some(update) = tracker.record(written, written, Instant::now()) {
                self.progress.report(update).await;
            }
        }

        Ok(writer.bytes_written())
    }
}
