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


//! Queue change broadcast
//!
//! Every mutation and progress tick publishes the whole queue. Subscribers
//! only read; a lagging receiver skips straight to newer snapshots.

use crate::download::job::DownloadJob;
use tokio::sync::broadcast;
use tracing::trace;

/// Full queue in insertion order
pub type QueueSnapshot = Vec<DownloadJob>;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct QueueEvents {
    tx: broadcast::Sender<QueueSnapshot>,
}

impl QueueEvents {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueSnapshot> {
        self.tx.subscribe()
    }

    /// Publish a snapshot; having no subscribers is fine
    pub fn emit(&self, snapshot: QueueSnapshot) {
        if self.tx.send(snapshot).is_err() {
            trace!("Queue update dropped, no subscribers");
        }
    }
}

impl Default for QueueEvents {
    fn default() -> Self {
        Self::new()
    }
}
