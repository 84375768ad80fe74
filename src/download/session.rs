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


//! Wake lock and foreground notification for the lifetime of the queue
//!
//! The session opens before the first request of a job and stays open
//! across consecutive jobs; it closes only once nothing is queued or
//! downloading. Platform failures are logged and ignored.

use crate::platform::{ForegroundService, KeepAwake};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const STARTING_TITLE: &str = "Downloading...";

#[derive(Debug, Default)]
struct SessionState {
    awake: bool,
    notifying: bool,
}

/// Holds the wake lock and notification while downloads are pending
pub struct BackgroundSessionKeeper {
    keep_awake: Arc<dyn KeepAwake>,
    notifications: Arc<dyn ForegroundService>,
    state: Mutex<SessionState>,
}

impl BackgroundSessionKeeper {
    pub fn new(keep_awake: Arc<dyn KeepAwake>, notifications: Arc<dyn ForegroundService>) -> Self {
        Self {
            keep_awake,
            notifications,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Acquire the wake lock and show (or retitle) the notification
    pub async fn activate(&self, label: &str) {
        let mut state = self.state.lock().await;

        if !state.awake {
            match self.keep_awake.keep_awake().await {
                Ok(()) => state.awake = true,
                Err(e) => warn!(error = %e, "Wake lock unavailable, continuing without it"),
            }
        }

        if state.notifying {
            if let Err(e) = self.notifications.update(STARTING_TITLE, label).await {
                debug!(error = %e, "Notification update failed");
            }
        } else {
            match self.notifications.start(STARTING_TITLE, label).await {
                Ok(()) => state.notifying = true,
                Err(e) => warn!(error = %e, "Foreground notification unavailable, continuing without it"),
            }
        }
    }

    /// Show the current percent in the notification title
    pub async fn tick(&self, label: &str, percent: u8) {
        let state = self.state.lock().await;
        if !state.notifying {
            return;
        }

        let title = format!("Downloading {}%", percent);
        if let Err(e) = self.notifications.update(&title, label).await {
            debug!(error = %e, "Notification update failed");
        }
    }

    /// Release both resources unless more work is pending
    pub async fn release_if_idle(&self, has_pending: bool) {
        if has_pending {
            return;
        }

        let mut state = self.state.lock().await;

        if state.awake {
            if let Err(e) = self.keep_awake.allow_sleep().await {
                warn!(error = %e, "Failed to release wake lock");
            }
            state.awake = false;
        }

        if state.notifying {
            if let Err(e) = self.notifications.stop().await {
                warn!(error = %e, "Failed to stop foreground notification");
            }
            state.notifying = false;
        }
    }

    pub async fn is_active(&self) -> bool {
        let state = self.state.lock().await;
        state.awake || state.notifying
    }
}
