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


//! Transfer path selection

use serde::{Deserialize, Serialize};

/// How a source URL is transferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStrategy {
    /// Walk the M3U8 playlist and append segments one by one
    Hls,
    /// Native bulk transfer, with a streamed fetch as fallback
    Direct,
}

impl TransferStrategy {
    /// HLS when the URL mentions `.m3u8` anywhere
    ///
    /// Proxied sources carry the playlist URL in their query string, so the
    /// whole URL is checked rather than the path alone.
    pub fn select(url: &str) -> Self {
        if url.to_ascii_lowercase().contains(".m3u8") {
            TransferStrategy::Hls
        } else {
            TransferStrategy::Direct
        }
    }
}
