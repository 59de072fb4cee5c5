//! HTTP client wrapper implementing [`TransferSource`].
//!
//! This module provides the `HttpClient` struct which opens streaming GET
//! requests with browser-like headers, proper timeout configuration and
//! error mapping.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use super::source::{TransferBody, TransferSource};
use crate::user_agent::{BROWSER_USER_AGENT, default_download_headers};

/// HTTP client for streaming downloads.
///
/// This client is designed to be created once and shared by every job,
/// taking advantage of connection pooling.
///
/// # Example
///
/// ```no_run
/// use transfer_deck::download::{HttpClient, TransferSource};
/// use futures_util::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let url = url::Url::parse("https://example.com/file.zip")?;
/// let mut body = client.open(&url).await?;
/// while let Some(chunk) = body.chunks.next().await {
///     println!("{} bytes", chunk?.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes (for large files)
    /// - Browser User-Agent, caching disabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = build_client(connect_timeout_secs, read_timeout_secs)
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    async fn send_request(&self, url: &Url) -> Result<reqwest::Response, DownloadError> {
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url.as_str())
            } else {
                DownloadError::network(url.as_str(), e)
            }
        })?;

        if !response.status().is_success() {
            return Err(DownloadError::http_status(
                url.as_str(),
                response.status().as_u16(),
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl TransferSource for HttpClient {
    #[instrument(skip(self), fields(url = %url))]
    async fn open(&self, url: &Url) -> Result<TransferBody, DownloadError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url.as_str()));
        }

        let response = self.send_request(url).await?;
        let total_bytes = response.content_length().filter(|len| *len > 0);
        debug!(status = response.status().as_u16(), ?total_bytes, "response received");

        let owned_url = url.to_string();
        let chunks = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|e| {
                    if e.is_timeout() {
                        DownloadError::timeout(owned_url.clone())
                    } else {
                        DownloadError::network(owned_url.clone(), e)
                    }
                })
            })
            .boxed();

        Ok(TransferBody {
            total_bytes,
            chunks,
        })
    }
}

fn build_client(
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(read_timeout_secs))
        .gzip(true)
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(default_download_headers())
        .build()
}
