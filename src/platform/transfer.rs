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


//! reqwest-backed native transfer
//!
//! Streams the response body straight to the destination file through a
//! `BufWriter`, reporting progress after every flush window. Used on desktop
//! and by the CLI; mobile shells inject their platform transfer plugin.

use crate::error::{OfflineError, Result};
use crate::platform::{BulkTransfer, RequestHeaders, TransferProgress, TransferProgressFn};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

const DOWNLOAD_BUFF_SZ: usize = 8 * 1024;
const PROGRESS_FLUSH_SZ: u64 = 256 * 1024;

/// Direct-file transfer over plain HTTP
#[derive(Debug, Clone)]
pub struct HttpBulkTransfer {
    client: Client,
    default_user_agent: String,
}

impl HttpBulkTransfer {
    pub fn new(timeout: Duration, default_user_agent: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            default_user_agent: default_user_agent.into(),
        })
    }

    fn destination_path(uri: &str) -> Result<PathBuf> {
        let parsed = url::Url::parse(uri)?;
        parsed
            .to_file_path()
            .map_err(|_| OfflineError::TransferFailed(format!("Not a file URI: {}", uri)))
    }
}

#[async_trait]
impl BulkTransfer for HttpBulkTransfer {
    async fn download_file(
        &self,
        url: &str,
        destination_uri: &str,
        headers: &RequestHeaders,
        on_progress: TransferProgressFn,
    ) -> Result<()> {
        let path = Self::destination_path(destination_uri)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut request = self.client.get(url);
        let mut has_user_agent = false;
        for (key, value) in headers {
            has_user_agent |= key.eq_ignore_ascii_case("user-agent");
            request = request.header(key, value);
        }
        if !has_user_agent {
            request = request.header(reqwest::header::USER_AGENT, &self.default_user_agent);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OfflineError::http_status(status.as_u16(), url));
        }

        let content_length = response.content_length();
        debug!(url, ?content_length, "Native transfer started");

        let file = File::create(&path).await?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFF_SZ, file);
        let mut stream = response.bytes_stream();

        let mut written = 0u64;
        let mut next_report = PROGRESS_FLUSH_SZ;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if written >= next_report {
                writer.flush().await?;
                on_progress(TransferProgress {
                    bytes: written,
                    content_length,
                });
                next_report = written + PROGRESS_FLUSH_SZ;
            }
        }

        writer.flush().await?;
        on_progress(TransferProgress {
            bytes: written,
            content_length,
        });

        if let Some(total) = content_length {
            if written < total {
                return Err(OfflineError::TransferFailed(format!(
                    "Download incomplete: {}/{} bytes",
                    written, total
                )));
            }
        }

        Ok(())
    }
}
