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


//! Offline library: completed episodes and their manifests
//!
//! A manifest is written only after the video file is complete, so any
//! manifest found on disk refers to playable media.

use crate::error::Result;
use crate::file::EpisodePaths;
use crate::platform::FileSystem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Library record, stored as the episode's JSON manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineEpisode {
    pub anime_id: String,
    pub anime_title: String,
    pub season: u32,
    pub episode: u32,
    #[serde(default)]
    pub poster: Option<String>,
    /// Relative to the filesystem root
    pub video_path: String,
    pub downloaded_at: DateTime<Utc>,
}

pub struct OfflineLibrary {
    fs: Arc<dyn FileSystem>,
    library_dir: String,
    max_id_len: usize,
}

impl OfflineLibrary {
    pub fn new(fs: Arc<dyn FileSystem>, library_dir: impl Into<String>, max_id_len: usize) -> Self {
        Self {
            fs,
            library_dir: library_dir.into(),
            max_id_len,
        }
    }

    pub fn paths(&self, anime_id: &str, season: u32, episode: u32) -> EpisodePaths {
        EpisodePaths::new(&self.library_dir, anime_id, season, episode, self.max_id_len)
    }

    /// Record a finished episode; call only once the video is fully written
    pub async fn write_manifest(&self, record: &OfflineEpisode) -> Result<()> {
        let paths = self.paths(&record.anime_id, record.season, record.episode);
        let json = serde_json::to_string_pretty(record)?;
        self.fs.write_string(&paths.manifest, &json).await?;

        info!(
            anime_id = %record.anime_id,
            season = record.season,
            episode = record.episode,
            "Episode saved to offline library"
        );
        Ok(())
    }

    /// Read one episode's manifest, `None` if absent or unreadable
    pub async fn get(&self, anime_id: &str, season: u32, episode: u32) -> Option<OfflineEpisode> {
        let paths = self.paths(anime_id, season, episode);
        let json = self.fs.read_to_string(&paths.manifest).await.ok()?;
        serde_json::from_str(&json).ok()
    }

    pub async fn is_downloaded(&self, anime_id: &str, season: u32, episode: u32) -> bool {
        self.get(anime_id, season, episode).await.is_some()
    }

    /// Every manifest under the library, newest first
    ///
    /// A missing library directory is an empty library. Manifests that fail
    /// to read or parse are skipped.
    pub async fn list(&self) -> Result<Vec<OfflineEpisode>> {
        if !self.fs.exists(&self.library_dir).await {
            return Ok(Vec::new());
        }

        let mut episodes = Vec::new();
        for dir in self.fs.read_dir(&self.library_dir).await? {
            if !dir.is_dir {
                continue;
            }

            let content_dir = format!("{}/{}", self.library_dir, dir.name);
            let entries = match self.fs.read_dir(&content_dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(dir = %content_dir, error = %e, "Skipping unreadable library directory");
                    continue;
                }
            };

            for entry in entries.iter().filter(|e| !e.is_dir && e.name.ends_with(".json")) {
                let path = format!("{}/{}", content_dir, entry.name);
                let parsed = match self.fs.read_to_string(&path).await {
                    Ok(json) => serde_json::from_str::<OfflineEpisode>(&json).map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                match parsed {
                    Ok(episode) => episodes.push(episode),
                    Err(e) => debug!(path = %path, error = %e, "Skipping unreadable manifest"),
                }
            }
        }

        episodes.sort_by(|a, b| b.downloaded_at.cmp(&a.downloaded_at));
        Ok(episodes)
    }

    /// Playable URI for a downloaded episode
    pub async fn video_uri(&self, anime_id: &str, season: u32, episode: u32) -> Option<String> {
        let record = self.get(anime_id, season, episode).await?;
        self.fs.resolve_uri(&record.video_path).ok()
    }

    /// Remove an episode's video and manifest; missing files are fine
    pub async fn delete_episode(&self, anime_id: &str, season: u32, episode: u32) -> Result<()> {
        let paths = self.paths(anime_id, season, episode);
        self.fs.delete_file(&paths.video).await?;
        self.fs.delete_file(&paths.manifest).await?;

        info!(anime_id, season, episode, "Offline episode deleted");
        Ok(())
    }
}
