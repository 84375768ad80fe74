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


//! Incremental file writer over the base64 append bridge
//!
//! The platform filesystem only accepts base64 strings, so every buffer is
//! encoded in fixed windows and appended one window at a time. At most one
//! window's encoding exists at once, which bounds memory to a single segment
//! plus one window regardless of video size.

use crate::error::Result;
use crate::platform::FileSystem;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Appends raw bytes to one file through [`FileSystem::append_base64`]
pub struct ChunkedWriter<'a> {
    fs: &'a dyn FileSystem,
    path: String,
    window: usize,
    bytes_written: u64,
}

impl<'a> ChunkedWriter<'a> {
    /// Create (or truncate) `path` and return a writer positioned at byte 0
    pub async fn create(fs: &'a dyn FileSystem, path: impl Into<String>, window: usize) -> Result<Self> {
        let path = path.into();
        fs.create_empty(&path).await?;

        Ok(Self {
            fs,
            path,
            window: window.max(1),
            bytes_written: 0,
        })
    }

    /// Append `data` in `window`-sized slices
    pub async fn append(&mut self, data: &[u8]) -> Result<()> {
        let mut encoded = String::new();

        for slice in data.chunks(self.window) {
            encoded.clear();
            STANDARD.encode_string(slice, &mut encoded);
            self.fs.append_base64(&self.path, &encoded).await?;
            self.bytes_written += slice.len() as u64;
        }

        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}
