//! In-memory collaborators.

use crate::core::UpdateError;
use crate::upgrade::fetcher::{AssetResponse, AssetTransport};
use crate::upgrade::progress::{ProgressSink, UpdateProgress, UpdateStatus};
use crate::upgrade::release::{Release, ReleaseSource, RemoteAsset};
use crate::upgrade::restart::{RestartStrategy, Restarter};
use crate::upgrade::version_probe::VersionProbe;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use semver::Version;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// A published release with one asset per name, hosted on GitHub.
pub fn release(tag: &str, prerelease: bool, asset_names: &[&str]) -> Release {
    Release {
        tag_name: tag.to_string(),
        prerelease,
        draft: false,
        assets: asset_names
            .iter()
            .map(|name| RemoteAsset {
                name: (*name).to_string(),
                browser_download_url: format!(
                    "https://github.com/dianlight/srat/releases/download/{tag}/{name}"
                ),
                size: 0,
                digest: None,
            })
            .collect(),
    }
}

/// Release listing served from memory, counting requests.
#[derive(Debug, Clone)]
pub struct FakeReleaseSource {
    releases: Option<Vec<Release>>,
    calls: Arc<AtomicUsize>,
}

impl FakeReleaseSource {
    pub fn new(releases: Vec<Release>) -> Self {
        Self {
            releases: Some(releases),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A source whose every request fails like an unreachable API.
    pub fn failing() -> Self {
        Self {
            releases: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl ReleaseSource for FakeReleaseSource {
    async fn list_releases(&self) -> Result<Vec<Release>, UpdateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.releases.clone().ok_or_else(|| {
            UpdateError::download("https://api.github.com/repos/dianlight/srat/releases", "offline")
        })
    }
}

#[derive(Debug, Clone)]
struct CannedResponse {
    status: u16,
    body: Vec<u8>,
    content_length: Option<u64>,
}

/// Download transport answering from canned responses.
///
/// Unknown URLs answer 404 with an empty body. Clones share the request
/// counter.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    responses: HashMap<String, CannedResponse>,
    calls: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, url: &str, status: u16, body: Vec<u8>) -> Self {
        let content_length = Some(body.len() as u64);
        self.responses.insert(
            url.to_string(),
            CannedResponse {
                status,
                body,
                content_length,
            },
        );
        self
    }

    /// Override the `Content-Length` announced for `url`.
    pub fn with_content_length(mut self, url: &str, length: u64) -> Self {
        if let Some(response) = self.responses.get_mut(url) {
            response.content_length = Some(length);
        }
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl AssetTransport for FakeTransport {
    async fn get(&self, url: &str) -> Result<AssetResponse, UpdateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let canned = self.responses.get(url).cloned().unwrap_or(CannedResponse {
            status: 404,
            body: Vec::new(),
            content_length: Some(0),
        });

        let chunks: Vec<std::io::Result<Bytes>> =
            canned.body.chunks(1024).map(|c| Ok(Bytes::copy_from_slice(c))).collect();
        Ok(AssetResponse {
            status: canned.status,
            content_length: canned.content_length,
            body: futures::stream::iter(chunks).boxed(),
        })
    }
}

/// Reports a fixed version for every binary.
#[derive(Debug, Clone)]
pub struct FakeVersionProbe {
    version: Option<Version>,
}

impl FakeVersionProbe {
    pub fn new(version: Option<Version>) -> Self {
        Self { version }
    }
}

#[async_trait]
impl VersionProbe for FakeVersionProbe {
    async fn probe(&self, _binary: &Path) -> Option<Version> {
        self.version.clone()
    }
}

/// Records restart requests instead of restarting.
#[derive(Debug, Default)]
pub struct FakeRestarter {
    calls: Mutex<Vec<(RestartStrategy, PathBuf)>>,
}

impl FakeRestarter {
    pub fn calls(&self) -> Vec<(RestartStrategy, PathBuf)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Restarter for FakeRestarter {
    async fn restart(&self, strategy: RestartStrategy, binary: &Path) -> Result<(), UpdateError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((strategy, binary.to_path_buf()));
        }
        Ok(())
    }
}

/// Keeps every published progress value.
#[derive(Debug, Default)]
pub struct RecordingSink {
    values: Mutex<Vec<UpdateProgress>>,
}

impl RecordingSink {
    pub fn values(&self) -> Vec<UpdateProgress> {
        self.values.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Published statuses, consecutive duplicates collapsed.
    pub fn statuses(&self) -> Vec<UpdateStatus> {
        let mut statuses: Vec<UpdateStatus> = self.values().iter().map(|v| v.status).collect();
        statuses.dedup();
        statuses
    }
}

impl ProgressSink for RecordingSink {
    fn publish(&self, progress: UpdateProgress) {
        if let Ok(mut values) = self.values.lock() {
            values.push(progress);
        }
    }
}

/// Cancels `token` once `status` is published with progress above zero,
/// simulating a shutdown that arrives partway through a stage.
#[derive(Debug)]
pub struct CancellingSink {
    status: UpdateStatus,
    token: CancellationToken,
}

impl CancellingSink {
    pub fn new(status: UpdateStatus, token: CancellationToken) -> Self {
        Self { status, token }
    }
}

impl ProgressSink for CancellingSink {
    fn publish(&self, progress: UpdateProgress) {
        if progress.status == self.status && progress.progress > 0 {
            self.token.cancel();
        }
    }
}
