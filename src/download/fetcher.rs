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


//! HTTP access for playlists, segments and the streamed fallback
//!
//! [`HttpFetcher`] is the seam the pipeline talks to; [`ReqwestFetcher`] is
//! the production client. [`SegmentFetcher`] layers the retry-once policy
//! and cancellation on top.

use crate::error::{OfflineError, Result};
use crate::platform::RequestHeaders;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// A response body delivered chunk by chunk
pub struct ByteStream {
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes>>,
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// GET requests used by the pipeline
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Fetch a playlist body
    async fn get_text(&self, url: &str, headers: &RequestHeaders) -> Result<String>;

    /// Fetch one media segment in full
    async fn get_bytes(&self, url: &str, headers: &RequestHeaders) -> Result<Bytes>;

    /// Open a streamed body for the direct-download fallback
    async fn get_stream(&self, url: &str, headers: &RequestHeaders) -> Result<ByteStream>;
}

/// Race `fut` against `token`; a fired token wins and yields `Cancelled`
pub async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(OfflineError::Cancelled),
        result = fut => result,
    }
}

/// reqwest implementation of [`HttpFetcher`]
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
    default_user_agent: String,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration, default_user_agent: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            default_user_agent: default_user_agent.into(),
        })
    }

    async fn send(&self, url: &str, headers: &RequestHeaders) -> Result<reqwest::Response> {
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

        Ok(response)
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get_text(&self, url: &str, headers: &RequestHeaders) -> Result<String> {
        let response = self.send(url, headers).await?;
        Ok(response.text().await?)
    }

    async fn get_bytes(&self, url: &str, headers: &RequestHeaders) -> Result<Bytes> {
        let response = self.send(url, headers).await?;
        Ok(response.bytes().await?)
    }

    async fn get_stream(&self, url: &str, headers: &RequestHeaders) -> Result<ByteStream> {
        let response = self.send(url, headers).await?;
        let content_length = response.content_length();
        let body = response.bytes_stream().map_err(OfflineError::from).boxed();

        Ok(ByteStream {
            content_length,
            body,
        })
    }
}

/// Fetches media segments with exactly one retry
pub struct SegmentFetcher<'a> {
    fetcher: &'a dyn HttpFetcher,
    headers: &'a RequestHeaders,
    token: &'a CancellationToken,
}

impl<'a> SegmentFetcher<'a> {
    pub fn new(
        fetcher: &'a dyn HttpFetcher,
        headers: &'a RequestHeaders,
        token: &'a CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            headers,
            token,
        }
    }

    /// Fetch segment `index` (0-based) of `total`
    ///
    /// A failed first attempt is retried once. Cancellation is returned as-is
    /// and never retried; a second failure becomes `SegmentFailed` with the
    /// 1-based position.
    pub async fn fetch(&self, index: usize, total: usize, url: &Url) -> Result<Bytes> {
        if self.token.is_cancelled() {
            return Err(OfflineError::Cancelled);
        }

        let first = cancellable(self.token, self.fetcher.get_bytes(url.as_str(), self.headers)).await;
        let err = match first {
            Ok(bytes) => return Ok(bytes),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        warn!(segment = index + 1, total, error = %err, "Segment fetch failed, retrying once");

        match cancellable(self.token, self.fetcher.get_bytes(url.as_str(), self.headers)).await {
            Ok(bytes) => {
                debug!(segment = index + 1, total, "Segment retry succeeded");
                Ok(bytes)
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => Err(OfflineError::SegmentFailed {
                index: index + 1,
                total,
                reason: e.to_string(),
            }),
        }
    }
}
