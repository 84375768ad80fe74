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


//! `tokio::fs` implementation of the filesystem bridge

use crate::error::{OfflineError, Result};
use crate::platform::{DirEntry, FileSystem};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Filesystem rooted at the app data directory
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a relative path onto the root, refusing anything that escapes it
    fn full_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if escapes {
            return Err(OfflineError::FileIoError(format!(
                "Path must stay inside the data directory: {}",
                path
            )));
        }

        Ok(self.root.join(relative))
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                OfflineError::FileIoError(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn mkdir_all(&self, path: &str) -> Result<()> {
        let full = self.full_path(path)?;
        fs::create_dir_all(&full).await.map_err(|e| {
            OfflineError::FileIoError(format!("Failed to create directory {}: {}", full.display(), e))
        })
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let full = self.full_path(path)?;
        let mut reader = fs::read_dir(&full).await?;
        let mut entries = Vec::new();

        while let Some(entry) = reader.next_entry().await? {
            let file_type = entry.file_type().await?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
            });
        }

        Ok(entries)
    }

    async fn read_to_string(&self, path: &str) -> Result<String> {
        let full = self.full_path(path)?;
        Ok(fs::read_to_string(&full).await?)
    }

    async fn write_string(&self, path: &str, data: &str) -> Result<()> {
        let full = self.full_path(path)?;
        Self::ensure_parent(&full).await?;
        fs::write(&full, data).await?;
        Ok(())
    }

    async fn create_empty(&self, path: &str) -> Result<()> {
        let full = self.full_path(path)?;
        Self::ensure_parent(&full).await?;
        fs::File::create(&full).await?;
        Ok(())
    }

    async fn append_base64(&self, path: &str, data: &str) -> Result<()> {
        let full = self.full_path(path)?;
        let bytes = STANDARD.decode(data)?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        let full = self.full_path(path)?;
        match fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OfflineError::FileIoError(format!(
                "Delete failed: {}: {}",
                full.display(),
                e
            ))),
        }
    }

    async fn exists(&self, path: &str) -> bool {
        match self.full_path(path) {
            Ok(full) => fs::try_exists(full).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    fn resolve_uri(&self, path: &str) -> Result<String> {
        let mut full = self.full_path(path)?;
        if full.is_relative() {
            full = std::env::current_dir()?.join(full);
        }

        url::Url::from_file_path(&full)
            .map(|u| u.to_string())
            .map_err(|_| OfflineError::FileIoError(format!("Cannot build URI for {}", full.display())))
    }
}
