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


//! Platform services consumed by the download pipeline
//!
//! Each trait stands in for one device API the mobile shell provides:
//! - [`FileSystem`]: directory create/read/delete, chunked base64 append,
//!   URI resolution
//! - [`BulkTransfer`]: native file transfer with progress events
//! - [`KeepAwake`]: wake lock
//! - [`ForegroundService`]: persistent foreground notification
//!
//! Desktop builds use [`LocalFileSystem`], [`HttpBulkTransfer`] and
//! [`HeadlessPlatform`]. Mobile hosts inject their own implementations.

pub mod headless;
pub mod local_fs;
pub mod transfer;

pub use headless::HeadlessPlatform;
pub use local_fs::LocalFileSystem;
pub use transfer::HttpBulkTransfer;

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Extra HTTP headers (referer, user agent) some providers require
pub type RequestHeaders = HashMap<String, String>;

/// One entry returned by [`FileSystem::read_dir`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Filesystem bridge; all paths are relative to the app data directory
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Create a directory and any missing parents
    async fn mkdir_all(&self, path: &str) -> Result<()>;

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>>;

    async fn read_to_string(&self, path: &str) -> Result<String>;

    /// Write a UTF-8 file, creating parent directories
    async fn write_string(&self, path: &str, data: &str) -> Result<()>;

    /// Create or truncate a file to zero length, creating parent directories
    async fn create_empty(&self, path: &str) -> Result<()>;

    /// Decode one base64 payload and append the bytes to `path`
    async fn append_base64(&self, path: &str, data: &str) -> Result<()>;

    /// Deleting a missing file is not an error
    async fn delete_file(&self, path: &str) -> Result<()>;

    async fn exists(&self, path: &str) -> bool;

    /// Absolute URI for handing a file to the player or transfer layer
    fn resolve_uri(&self, path: &str) -> Result<String>;
}

/// Progress reported by a native transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes received so far
    pub bytes: u64,

    /// Total size when the server announced one
    pub content_length: Option<u64>,
}

/// Callback type for native transfer progress
pub type TransferProgressFn = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Native bulk-file transfer
#[async_trait]
pub trait BulkTransfer: Send + Sync {
    /// Download `url` straight to `destination_uri`
    async fn download_file(
        &self,
        url: &str,
        destination_uri: &str,
        headers: &RequestHeaders,
        on_progress: TransferProgressFn,
    ) -> Result<()>;
}

/// Device wake lock
#[async_trait]
pub trait KeepAwake: Send + Sync {
    async fn keep_awake(&self) -> Result<()>;

    async fn allow_sleep(&self) -> Result<()>;
}

/// Foreground service notification that keeps the process alive
#[async_trait]
pub trait ForegroundService: Send + Sync {
    async fn start(&self, title: &str, body: &str) -> Result<()>;

    async fn update(&self, title: &str, body: &str) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}
