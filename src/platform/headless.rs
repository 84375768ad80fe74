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


//! Wake lock and notification stand-ins for hosts without either

use crate::error::Result;
use crate::platform::{ForegroundService, KeepAwake};
use async_trait::async_trait;
use tracing::{debug, info};

/// Logs session changes instead of touching device APIs
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessPlatform;

#[async_trait]
impl KeepAwake for HeadlessPlatform {
    async fn keep_awake(&self) -> Result<()> {
        debug!("Wake lock requested (headless)");
        Ok(())
    }

    async fn allow_sleep(&self) -> Result<()> {
        debug!("Wake lock released (headless)");
        Ok(())
    }
}

#[async_trait]
impl ForegroundService for HeadlessPlatform {
    async fn start(&self, title: &str, body: &str) -> Result<()> {
        info!(title, body, "Download session started");
        Ok(())
    }

    async fn update(&self, title: &str, body: &str) -> Result<()> {
        debug!(title, body, "Download session updated");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        info!("Download session stopped");
        Ok(())
    }
}
