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


//! M3U8 playlist parsing
//!
//! Only what an offline copy needs: a playlist is either a variant list
//! (follow the first nested playlist, no bitrate selection) or a media
//! playlist (every non-comment line is a segment URL).

use crate::download::fetcher::{cancellable, HttpFetcher};
use crate::error::{OfflineError, Result};
use crate::platform::RequestHeaders;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Parsed playlist body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Playlist {
    /// Nested playlist to follow
    Variant(Url),
    /// Media segment URLs in playback order
    Media(Vec<Url>),
}

/// True if a URL or playlist line points at an M3U8 playlist
///
/// Checks the path only, so query strings such as `?token=..` are ignored.
pub fn is_playlist_url(line: &str) -> bool {
    let path = line.split(|c| c == '?' || c == '#').next().unwrap_or(line);
    path.to_ascii_lowercase().ends_with(".m3u8")
}

/// Parse a playlist body; relative lines are resolved against `base`
pub fn parse_playlist(text: &str, base: &Url) -> Result<Playlist> {
    let mut segments = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let url = base.join(line)?;
        if is_playlist_url(line) {
            return Ok(Playlist::Variant(url));
        }
        segments.push(url);
    }

    Ok(Playlist::Media(segments))
}

/// Fetch `url` and follow variant playlists until a media playlist is found
///
/// Fails with `PlaylistTooDeep` after `max_depth` nested playlists and with
/// `EmptyPlaylist` if the media playlist lists no segments. No segment is
/// requested here.
pub async fn resolve_segments(
    fetcher: &dyn HttpFetcher,
    url: &Url,
    headers: &RequestHeaders,
    token: &CancellationToken,
    max_depth: usize,
) -> Result<Vec<Url>> {
    let mut current = url.clone();

    for depth in 0..=max_depth {
        if token.is_cancelled() {
            return Err(OfflineError::Cancelled);
        }

        let text = cancellable(token, fetcher.get_text(current.as_str(), headers)).await?;

        match parse_playlist(&text, &current)? {
            Playlist::Variant(next) => {
                debug!(depth, variant = %next, "Following variant playlist");
                current = next;
            }
            Playlist::Media(segments) if segments.is_empty() => {
                return Err(OfflineError::EmptyPlaylist(current.to_string()));
            }
            Playlist::Media(segments) => return Ok(segments),
        }
    }

    Err(OfflineError::PlaylistTooDeep { depth: max_depth })
}
