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


//! Offline library path layout
//!
//! Paths are relative to the platform data directory and always use `/`:
//!
//! ```text
//! {library}/{sanitized content id}/S{season}E{episode}.mp4
//! {library}/{sanitized content id}/S{season}E{episode}.json
//! ```

/// Characters that are invalid in a filename on at least one platform
const INVALID_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Sanitize a content id for use as a directory name
///
/// Invalid characters become `_`; the result is cut to `max_len` characters.
pub fn sanitize_content_id(name: &str, max_len: usize) -> String {
    name.chars()
        .map(|c| if INVALID_CHARS.contains(&c) { '_' } else { c })
        .take(max_len)
        .collect()
}

/// Location of one episode's video and manifest inside the library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodePaths {
    /// Directory holding every episode of one content id
    pub content_dir: String,

    /// Video file (appended to during transfer)
    pub video: String,

    /// JSON manifest, written only after the video is complete
    pub manifest: String,
}

impl EpisodePaths {
    pub fn new(library_dir: &str, anime_id: &str, season: u32, episode: u32, max_id_len: usize) -> Self {
        let content_dir = format!("{}/{}", library_dir, sanitize_content_id(anime_id, max_id_len));
        let stem = format!("S{}E{}", season, episode);

        Self {
            video: format!("{}/{}.mp4", content_dir, stem),
            manifest: format!("{}/{}.json", content_dir, stem),
            content_dir,
        }
    }
}
