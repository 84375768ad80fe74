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


//! Download configuration
//!
//! Every field has a default so a partial JSON file is enough:
//!
//! ```json
//! { "root_dir": "/data/user/0/app/files", "progress_interval_ms": 750 }
//! ```

use crate::error::{OfflineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the offline download queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Platform data directory the filesystem bridge is rooted at
    pub root_dir: PathBuf,

    /// Library directory name below `root_dir`
    pub library_dir_name: String,

    /// Local storage key holding the serialized job queue
    pub queue_key: String,

    /// Local storage key prefix for per-job source URLs
    pub source_key_prefix: String,

    /// Minimum interval between throughput/ETA recalculations
    pub progress_interval_ms: u64,

    /// Bytes per base64 append call
    pub encode_window_bytes: usize,

    /// Pause between finishing one job and starting the next
    pub next_job_delay_ms: u64,

    /// Maximum variant-playlist nesting
    pub max_playlist_depth: usize,

    /// Maximum characters kept from a content id when building paths
    pub max_id_len: usize,

    /// User agent sent when the caller provides none
    pub default_user_agent: String,

    /// HTTP request timeout
    pub request_timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            library_dir_name: "TatakaiOffline".to_string(),
            queue_key: "tatakai_mobile_downloads".to_string(),
            source_key_prefix: "dl_url_".to_string(),
            progress_interval_ms: 500,
            encode_window_bytes: 32 * 1024,
            next_job_delay_ms: 500,
            max_playlist_depth: 5,
            max_id_len: 80,
            default_user_agent:
                "Mozilla/5.0 (Linux; Android 13) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Mobile Safari/537.36"
                    .to_string(),
            request_timeout_secs: 300,
        }
    }
}

impl DownloadConfig {
    /// Config rooted at `root_dir`, everything else default
    pub fn with_root<P: Into<PathBuf>>(root_dir: P) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Load a JSON config file; missing keys take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            OfflineError::ConfigurationError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| {
            OfflineError::ConfigurationError(format!("Invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.encode_window_bytes == 0 {
            return Err(OfflineError::ConfigurationError(
                "encode_window_bytes must be greater than zero".to_string(),
            ));
        }
        if self.progress_interval_ms == 0 {
            return Err(OfflineError::ConfigurationError(
                "progress_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_playlist_depth == 0 {
            return Err(OfflineError::ConfigurationError(
                "max_playlist_depth must be at least 1".to_string(),
            ));
        }
        if self.library_dir_name.trim().is_empty() || self.queue_key.is_empty() {
            return Err(OfflineError::ConfigurationError(
                "library_dir_name and queue_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn next_job_delay(&self) -> Duration {
        Duration::from_millis(self.next_job_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Storage key for a job's source URL and headers
    pub fn source_key(&self, job_id: &str) -> String {
        format!("{}{}", self.source_key_prefix, job_id)
    }
}
