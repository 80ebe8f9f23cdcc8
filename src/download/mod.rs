use crate::http::HttpClient;
use crate::runtime::Runtime;
use anyhow::Result;
use async_trait::async_trait;
use log::info;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Source of archive bytes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch `url` once, streaming the body into `dest`. Returns the byte count.
    async fn download(&self, url: &str, dest: Box<dyn Write + Send>) -> Result<u64>;
}

/// [`Downloader`] backed by the HTTP client.
pub struct HttpDownloader {
    http_client: HttpClient,
}

impl HttpDownloader {
    pub fn new(http_client: HttpClient) -> Self {
        Self { http_client }
    }

    pub fn http_client(&self) -> &HttpClient {
        &self.http_client
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: Box<dyn Write + Send>) -> Result<u64> {
        self.http_client.download_file(url, move || Ok(dest)).await
    }
}

/// Which side of a download failed: the local file or the transfer.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to create {path:?}: {cause:#}")]
    Create { path: PathBuf, cause: anyhow::Error },

    #[error("{cause:#}")]
    Transfer { cause: anyhow::Error },
}

/// Downloads `url` to `temp_path`, creating the file through the runtime.
#[tracing::instrument(skip(runtime, temp_path, downloader))]
pub async fn download_file<R: Runtime, D: Downloader + ?Sized>(
    runtime: &R,
    url: &str,
    temp_path: &Path,
    downloader: &D,
) -> Result<u64, DownloadError> {
    info!("Downloading file from {}...", url);

    let file = runtime
        .create_file(temp_path)
        .map_err(|cause| DownloadError::Create {
            path: temp_path.to_path_buf(),
            cause,
        })?;
    let bytes = downloader
        .download(url, file)
        .await
        .map_err(|cause| DownloadError::Transfer { cause })?;

    info!("Download complete ({} bytes).", bytes);
    Ok(bytes)
}
