//! HTTP client used to fetch release archives.

use anyhow::{Context, Result};
use log::debug;
use reqwest::{Client, Url};
use std::io::Write;

use super::status::classify_status;

/// Hosts the GitHub token is sent to. Every other host is fetched anonymously.
const GITHUB_HOSTS: &[&str] = &["github.com", "api.github.com", "codeload.github.com"];

/// Thin wrapper over a configured reqwest [`Client`].
///
/// A fetch is attempted exactly once; failures are returned to the caller.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    github_token: Option<String>,
}

impl HttpClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            github_token: None,
        }
    }

    /// Authenticate requests to GitHub hosts with `token`.
    pub fn with_github_token(mut self, token: String) -> Self {
        self.github_token = Some(token);
        self
    }

    /// The token to send with a request for `url`, if any.
    pub(crate) fn token_for(&self, url: &str) -> Option<&str> {
        let token = self.github_token.as_deref()?;
        let url = Url::parse(url).ok()?;
        let host = url.host_str()?;
        (url.scheme() == "https" && GITHUB_HOSTS.contains(&host)).then_some(token)
    }

    /// Stream the body of `url` into the writer produced by `create_writer`.
    ///
    /// The writer is only created once the server has answered with a
    /// success status, so a failed request leaves nothing behind.
    #[tracing::instrument(skip(self, create_writer))]
    pub async fn download_file<W, F>(&self, url: &str, create_writer: F) -> Result<u64>
    where
        W: Write,
        F: FnOnce() -> Result<W>,
    {
        debug!("Downloading file from {}...", url);

        let mut request = self.client.get(url);
        if let Some(token) = self.token_for(url) {
            debug!("Authenticating request to {} with GITHUB_TOKEN", url);
            request = request.bearer_auth(token);
        }

        let mut response = request
            .send()
            .await
            .context("Failed to start download request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let failure = classify_status(status, &body)
                .with_context(|| format!("Unexpected HTTP status {}", status))?;
            return Err(failure.into());
        }

        let mut writer = create_writer()?;
        let mut downloaded_bytes: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read chunk from download stream")?
        {
            writer
                .write_all(&chunk)
                .context("Failed to write chunk to file")?;
            downloaded_bytes += chunk.len() as u64;
        }
        writer.flush().context("Failed to flush downloaded file")?;

        debug!(
            "Downloaded {:.2} MB",
            downloaded_bytes as f64 / (1024.0 * 1024.0)
        );

        Ok(downloaded_bytes)
    }
}
