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


//! Local persistence
//!
//! SQLite-backed key/value storage for the download queue.
//!
//! # Keys
//! - `tatakai_mobile_downloads`: JSON array of download jobs
//! - `dl_url_{job id}`: JSON source (URL + request headers) for one job
//!
//! # Usage Example
//! ```no_run
//! use tatakai_offline::storage::{Database, KeyValueStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new("./offline.db").await?;
//! db.set("tatakai_mobile_downloads", "[]").await?;
//! let queue = db.get("tatakai_mobile_downloads").await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod local_storage;
pub mod migrations;

pub use database::Database;
pub use local_storage::KeyValueStore;
