//! Asset download.
//!
//! [`PackageFetcher`] downloads a release asset into a hidden temporary file
//! under the data directory, checks its published digest, and hands it to the
//! [`ArchiveExtractor`]. The temporary archive is removed whatever the outcome.
//!
//! The HTTP layer sits behind [`AssetTransport`] so the pipeline can be driven
//! from in-memory responses in tests.

use crate::core::UpdateError;
use crate::upgrade::extractor::ArchiveExtractor;
use crate::upgrade::models::{BinaryAsset, UpdatePackage};
use crate::upgrade::progress::{StageProgress, UpdateStatus};
use crate::upgrade::verification::ChecksumVerifier;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Response head plus streaming body of an asset request.
pub struct AssetResponse {
    pub status: u16,
    /// `Content-Length`, when the server sent one.
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, io::Result<Bytes>>,
}

impl std::fmt::Debug for AssetResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Plain GET of an asset URL.
#[async_trait]
pub trait AssetTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<AssetResponse, UpdateError>;
}

/// [`AssetTransport`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("srat-updater/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| UpdateError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<AssetResponse, UpdateError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpdateError::download(url, e.to_string()))?;

        Ok(AssetResponse {
            status: response.status().as_u16(),
            content_length: response.content_length(),
            body: response.bytes_stream().map(|chunk| chunk.map_err(io::Error::other)).boxed(),
        })
    }
}

/// Downloads an asset and extracts it into an [`UpdatePackage`].
pub struct PackageFetcher {
    transport: Arc<dyn AssetTransport>,
    extractor: ArchiveExtractor,
    allowed_hosts: Vec<String>,
}

impl PackageFetcher {
    pub fn new(transport: Arc<dyn AssetTransport>, extractor: ArchiveExtractor) -> Self {
        Self {
            transport,
            extractor,
            allowed_hosts: Vec::new(),
        }
    }

    /// Only accept asset URLs on these hosts. Empty accepts any host.
    #[must_use]
    pub fn with_allowed_hosts(mut self, hosts: Vec<String>) -> Self {
        self.allowed_hosts = hosts.into_iter().map(|h| h.to_ascii_lowercase()).collect();
        self
    }

    #[must_use]
    pub const fn extractor(&self) -> &ArchiveExtractor {
        &self.extractor
    }

    /// Download and extract `asset` without progress reporting.
    pub async fn fetch(
        &self,
        asset: &BinaryAsset,
        token: &CancellationToken,
    ) -> Result<UpdatePackage, UpdateError> {
        self.fetch_with_progress(asset, token, Arc::new(StageProgress::silent())).await
    }

    /// Download and extract `asset`.
    ///
    /// Emits `DOWNLOADING` proportional to bytes received versus the declared
    /// size, then `DOWNLOAD_COMPLETE`, then the extractor's statuses.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::DownloadFailed`] for untrusted URLs, non-2xx
    ///   responses, transport errors, truncated bodies and digest mismatches
    /// - [`UpdateError::ExtractionFailed`] from the extractor
    /// - [`UpdateError::Cancelled`] when `token` fires
    pub async fn fetch_with_progress(
        &self,
        asset: &BinaryAsset,
        token: &CancellationToken,
        progress: Arc<StageProgress>,
    ) -> Result<UpdatePackage, UpdateError> {
        let url = asset.download_url.as_str();
        self.check_url(url)?;

        let data_dir = self.extractor.data_dir();
        tokio::fs::create_dir_all(data_dir).await.map_err(|e| {
            UpdateError::download(url, format!("cannot create {}: {e}", data_dir.display()))
        })?;
        let archive = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".zip")
            .tempfile_in(data_dir)
            .map_err(|e| UpdateError::download(url, format!("cannot create temporary file: {e}")))?;

        info!(asset = %asset.name, url = %url, size = asset.size, "Downloading update asset");
        let response = tokio::select! {
            biased;
            () = token.cancelled() => return Err(UpdateError::Cancelled),
            response = self.transport.get(url) => response?,
        };

        if !(200..300).contains(&response.status) {
            return Err(UpdateError::DownloadFailed {
                url: url.to_string(),
                status: Some(response.status),
                reason: format!("HTTP {}", response.status),
            });
        }

        let expected_len = response.content_length;
        let total = if asset.size > 0 { asset.size } else { expected_len.unwrap_or(0) };
        let writer = archive
            .as_file()
            .try_clone()
            .map_err(|e| UpdateError::download(url, format!("cannot open temporary file: {e}")))?;
        let mut file = tokio::fs::File::from_std(writer);
        let mut body = response.body;
        let mut downloaded = 0u64;

        progress.emit(UpdateStatus::Downloading, 0);
        loop {
            let chunk = tokio::select! {
                biased;
                () = token.cancelled() => return Err(UpdateError::Cancelled),
                chunk = body.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(|e| UpdateError::download(url, e.to_string()))?;

            file.write_all(&chunk)
                .await
                .map_err(|e| UpdateError::download(url, format!("cannot write archive: {e}")))?;
            downloaded += chunk.len() as u64;
            progress.ratio(UpdateStatus::Downloading, downloaded, total);
        }
        file.flush().await.map_err(|e| UpdateError::download(url, e.to_string()))?;
        file.sync_all().await.map_err(|e| UpdateError::download(url, e.to_string()))?;
        drop(file);

        if let Some(expected) = expected_len
            && expected != downloaded
        {
            return Err(UpdateError::download(
                url,
                format!("truncated download: expected {expected} bytes, got {downloaded}"),
            ));
        }
        debug!(bytes = downloaded, "Download finished");
        progress.complete(UpdateStatus::DownloadComplete);

        match &asset.digest {
            Some(digest) => ChecksumVerifier::verify_digest(archive.path(), digest)
                .await
                .map_err(|e| UpdateError::download(url, format!("{e:#}")))?,
            None => warn!(asset = %asset.name, "No expected digest provided, skipping checksum"),
        }

        self.extractor.extract_with_progress(archive.path(), token, progress).await
    }

    fn check_url(&self, url: &str) -> Result<(), UpdateError> {
        let untrusted = || UpdateError::download(url, "untrusted download URL");

        let parsed = reqwest::Url::parse(url).map_err(|_| untrusted())?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(untrusted());
        }
        let host = parsed.host_str().ok_or_else(untrusted)?.to_ascii_lowercase();
        if !self.allowed_hosts.is_empty() && !self.allowed_hosts.contains(&host) {
            warn!(host = %host, "Refusing download from untrusted host");
            return Err(untrusted());
        }
        Ok(())
    }
}
