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


//! Download job model
//!
//! A [`DownloadJob`] is one queued episode. Its status only moves along the
//! edges in [`JobStatus::can_transition_to`]:
//!
//! ```text
//! queued ──► downloading ──► completed
//!    ▲            │
//!    │            ├──► failed ──► queued   (retry)
//!    └────────────┘                        (restart recovery)
//! ```
//!
//! Cancellation is not a status; a cancelled job is removed from the queue.

use crate::error::{OfflineError, Result};
use crate::platform::RequestHeaders;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Queue key of one episode, `"{anime_id}-S{season}E{episode}"`
pub type JobId = String;

/// Build the job id for an episode
pub fn episode_job_id(anime_id: &str, season: u32, episode: u32) -> JobId {
    format!("{}-S{}E{}", anime_id, season, episode)
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
}

impl JobStatus {
    /// Transition table; every status mutation goes through this check
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Downloading)
                | (Downloading, Completed)
                | (Downloading, Failed)
                | (Downloading, Queued)
                | (Failed, Queued)
        )
    }

    /// Queued or downloading; these keep the worker and session alive
    pub fn is_pending(self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Downloading)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller asks to download
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub anime_id: String,
    pub anime_title: String,
    pub season: u32,
    pub episode: u32,
    /// M3U8 playlist or direct media URL
    pub video_url: String,
    pub poster: Option<String>,
    /// Referer / user agent for providers that check them
    #[serde(default)]
    pub headers: RequestHeaders,
}

impl EnqueueRequest {
    pub fn job_id(&self) -> JobId {
        episode_job_id(&self.anime_id, self.season, self.episode)
    }
}

/// Source URL and headers, stored apart from the queue snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSource {
    pub url: String,
    #[serde(default)]
    pub headers: RequestHeaders,
}

/// One entry in the download queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadJob {
    pub id: JobId,
    pub anime_id: String,
    pub anime_title: String,
    pub season: u32,
    pub episode: u32,
    #[serde(default)]
    pub poster: Option<String>,
    pub status: JobStatus,
    /// Percent complete, 0-100
    #[serde(default)]
    pub progress: u8,

    /// Display-only throughput, never persisted
    #[serde(skip)]
    pub speed: Option<String>,

    /// Display-only time remaining, never persisted
    #[serde(skip)]
    pub eta: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadJob {
    /// New queued job for a request
    pub fn new(request: &EnqueueRequest) -> Self {
        Self {
            id: request.job_id(),
            anime_id: request.anime_id.clone(),
            anime_title: request.anime_title.clone(),
            season: request.season,
            episode: request.episode,
            poster: request.poster.clone(),
            status: JobStatus::Queued,
            progress: 0,
            speed: None,
            eta: None,
            error: None,
        }
    }

    /// Move to `next`, rejecting edges outside the transition table
    ///
    /// Leaving `downloading` clears speed/ETA; any status but `failed` clears
    /// the error; `completed` pins progress to 100.
    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(OfflineError::InvalidTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }

        self.status = next;
        if next != JobStatus::Downloading {
            self.speed = None;
            self.eta = None;
        }
        if next != JobStatus::Failed {
            self.error = None;
        }
        match next {
            JobStatus::Completed => self.progress = 100,
            JobStatus::Queued => self.progress = 0,
            _ => {}
        }

        Ok(())
    }

    /// Record a failure message
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(message.into());
        Ok(())
    }

    /// Raise progress while downloading; never lowers it and never reaches
    /// 100, which is reserved for `completed`
    pub fn advance(&mut self, percent: u8) {
        if self.status == JobStatus::Downloading {
            self.progress = self.progress.max(percent.min(99));
        }
    }

    /// Display label used for notifications and logs
    pub fn label(&self) -> String {
        format!("{} S{}E{}", self.anime_title, self.season, self.episode)
    }
}
