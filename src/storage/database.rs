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

//! SQLite backing for the offline queue's local storage
//!
//! Holds the persisted queue snapshot and each job's source. One file per
//! install; mobile hosts pass their own data directory, desktop runs fall
//! back to [`Database::get_default_path`].

use crate::error::{OfflineError, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous},
    ConnectOptions,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

const DB_FILE_NAME: &str = "offline.db";
const APP_DIR_NAME: &str = "Tatakai";

/// Queue writes are serialized by the manager, so a small pool is enough
const MAX_CONNECTIONS: u32 = 2;

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    /// `None` for in-memory databases
    path: Option<PathBuf>,
}

fn connect_options(url: &str) -> Result<SqliteConnectOptions> {
    Ok(SqliteConnectOptions::from_str(url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(10))
        .disable_statement_logging())
}

impl Database {
    /// Open (creating if needed) the database at `database_path` and migrate it
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let path = database_path.as_ref();

        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                std::fs::create_dir_all(parent).map_err(|e| {
                    OfflineError::FileIoError(format!("creating {}: {}", parent.display(), e))
                })?;
            }
            _ => {}
        }

        let options = connect_options(&format!("sqlite://{}", path.display()))?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        debug!(path = %path.display(), "Local storage opened");
        Self::ready(pool, Some(path.to_path_buf())).await
    }

    /// Private in-memory database, used by tests
    pub async fn new_in_memory() -> Result<Self> {
        // Every connection to :memory: is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options("sqlite::memory:")?)
            .await?;

        Self::ready(pool, None).await
    }

    async fn ready(pool: SqlitePool, path: Option<PathBuf>) -> Result<Self> {
        let db = Self { pool, path };
        db.migrate().await?;
        Ok(db)
    }

    pub async fn migrate(&self) -> Result<()> {
        crate::storage::migrations::run_migrations(&self.pool)
            .await
            .map_err(|e| OfflineError::MigrationFailed(e.to_string()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn close(self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    /// Desktop database location
    ///
    /// - macOS: `~/Library/Application Support/Tatakai/offline.db`
    /// - Linux: `$XDG_DATA_HOME/Tatakai/offline.db`, else `~/.local/share/...`
    /// - Windows: `%APPDATA%\Tatakai\offline.db`
    /// - elsewhere: `./offline.db`
    pub fn get_default_path() -> PathBuf {
        let env_dir = |key: &str| std::env::var_os(key).map(PathBuf::from);

        let data_dir = if cfg!(target_os = "macos") {
            env_dir("HOME").map(|home| home.join("Library").join("Application Support"))
        } else if cfg!(target_os = "linux") {
            env_dir("XDG_DATA_HOME").or_else(|| env_dir("HOME").map(|home| home.join(".local").join("share")))
        } else if cfg!(target_os = "windows") {
            env_dir("APPDATA")
        } else {
            None
        };

        match data_dir {
            Some(dir) => dir.join(APP_DIR_NAME).join(DB_FILE_NAME),
            None => PathBuf::from(DB_FILE_NAME),
        }
    }
}
