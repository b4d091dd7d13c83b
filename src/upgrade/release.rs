//! Release discovery and candidate selection.
//!
//! [`ReleaseResolver`] turns "which channel am I on" into either the single
//! best [`ReleaseAsset`] to upgrade to, or [`UpdateError::NoUpdateAvailable`].
//!
//! # Selection rules
//!
//! A release is a candidate only if:
//!
//! 1. it is not a draft
//! 2. its prerelease flag is compatible with the channel
//! 3. its tag (optionally prefixed with `v`) is a valid semantic version
//! 4. it carries exactly one asset named `<prefix>_<arch>.zip`
//!
//! The candidate with the greatest version wins (first encountered on ties)
//! and must be strictly newer than the running version.
//!
//! Transport failures are folded into `NoUpdateAvailable` so that a flaky
//! network never surfaces as an application fault.

use crate::config::ReleaseSettings;
use crate::core::UpdateError;
use crate::upgrade::cache::ReleaseCache;
use crate::upgrade::models::{BinaryAsset, ReleaseAsset};
use crate::upgrade::UpdateChannel;
use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One entry of the release listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub assets: Vec<RemoteAsset>,
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
    /// `sha256:<hex>` when the API publishes one.
    #[serde(default)]
    pub digest: Option<String>,
}

impl From<&RemoteAsset> for BinaryAsset {
    fn from(asset: &RemoteAsset) -> Self {
        Self {
            name: asset.name.clone(),
            download_url: asset.browser_download_url.clone(),
            size: asset.size,
            digest: asset.digest.clone().filter(|d| !d.is_empty()),
        }
    }
}

/// Read-only access to the newest-first release listing.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Return the most recent releases, newest first.
    async fn list_releases(&self) -> Result<Vec<Release>, UpdateError>;
}

/// [`ReleaseSource`] backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubReleaseSource {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl GitHubReleaseSource {
    pub fn new(settings: &ReleaseSettings) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("srat-updater/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| UpdateError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            url: settings.releases_url(),
            token: settings.token.clone(),
        })
    }
}

#[async_trait]
impl ReleaseSource for GitHubReleaseSource {
    async fn list_releases(&self) -> Result<Vec<Release>, UpdateError> {
        debug!(url = %self.url, "Listing releases");

        let mut request =
            self.client.get(&self.url).header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response =
            request.send().await.map_err(|e| UpdateError::download(&self.url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::FORBIDDEN
                || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            {
                warn!("Release API rate limit hit");
            }
            return Err(UpdateError::DownloadFailed {
                url: self.url.clone(),
                status: Some(status.as_u16()),
                reason: format!("release API returned HTTP {status}"),
            });
        }

        response
            .json::<Vec<Release>>()
            .await
            .map_err(|e| UpdateError::download(&self.url, format!("invalid release listing: {e}")))
    }
}

/// Picks the best upgrade candidate for the running build.
pub struct ReleaseResolver {
    source: Arc<dyn ReleaseSource>,
    cache: ReleaseCache,
    current_version: String,
    artifact_prefix: String,
    arch: String,
}

impl ReleaseResolver {
    pub fn new(
        source: Arc<dyn ReleaseSource>,
        current_version: impl Into<String>,
        artifact_prefix: impl Into<String>,
    ) -> Self {
        Self {
            source,
            cache: ReleaseCache::disabled(),
            current_version: current_version.into(),
            artifact_prefix: artifact_prefix.into(),
            arch: crate::utils::platform::current_arch().to_string(),
        }
    }

    /// Use `cache` for release listings.
    #[must_use]
    pub fn with_cache(mut self, cache: ReleaseCache) -> Self {
        self.cache = cache;
        self
    }

    /// Match assets for `arch` instead of the running architecture.
    ///
    /// The name is normalised the same way as the running architecture.
    #[must_use]
    pub fn with_arch(mut self, arch: &str) -> Self {
        self.arch = crate::utils::platform::normalize_arch(arch).to_string();
        self
    }

    /// The asset file name this resolver looks for.
    #[must_use]
    pub fn asset_name(&self) -> String {
        format!("{}_{}.zip", self.artifact_prefix, self.arch)
    }

    #[must_use]
    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Drop the cached listing.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate();
    }

    /// Resolve the best upgrade for `channel`.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::NoUpdateAvailable`] when the channel does not poll,
    ///   the listing cannot be fetched, or nothing strictly newer matches
    /// - [`UpdateError::InvalidVersion`] when the running version is not
    ///   strict semver
    pub async fn resolve(&self, channel: UpdateChannel) -> Result<ReleaseAsset, UpdateError> {
        if !channel.polls_releases() {
            return Err(UpdateError::no_update(format!(
                "release checks disabled for the {channel} channel"
            )));
        }

        let current = parse_strict(&self.current_version)?;
        info!(current = %current, channel = %channel, "Checking for updates");

        let releases = match self.cache.get() {
            Some(releases) => {
                debug!(count = releases.len(), "Using cached release listing");
                releases
            }
            None => match self.source.list_releases().await {
                Ok(releases) => {
                    self.cache.store(releases.clone());
                    releases
                }
                Err(e) => {
                    warn!(error = %e, "Error getting releases");
                    return Err(UpdateError::no_update("no releases found"));
                }
            },
        };

        if releases.is_empty() {
            debug!("No releases found");
            return Err(UpdateError::no_update("no releases found"));
        }

        let best = self.select(&releases, channel).ok_or_else(|| {
            UpdateError::no_update(format!(
                "no architecture-matching asset {} in recent releases",
                self.asset_name()
            ))
        })?;

        if best.0 <= current {
            debug!(current = %current, candidate = %best.0, "Running version is up to date");
            return Err(UpdateError::no_update(format!(
                "running version {current} is not older than {}",
                best.1.last_release
            )));
        }

        info!(
            release = %best.1.last_release,
            asset = %best.1.arch_asset.name,
            "Found upgrade release asset"
        );
        Ok(best.1)
    }

    fn select(
        &self,
        releases: &[Release],
        channel: UpdateChannel,
    ) -> Option<(Version, ReleaseAsset)> {
        let expected = self.asset_name();
        let mut best: Option<(Version, ReleaseAsset)> = None;

        for release in releases {
            debug!(tag = %release.tag_name, prerelease = release.prerelease, "Found release");

            if release.draft {
                continue;
            }
            if release.prerelease && !channel.accepts_prerelease() {
                debug!(tag = %release.tag_name, "Skip prerelease");
                continue;
            }

            let version = match parse_tag(&release.tag_name) {
                Ok(version) => version,
                Err(e) => {
                    warn!(tag = %release.tag_name, error = %e, "Skipping invalid release tag");
                    continue;
                }
            };

            let mut matching = release.assets.iter().filter(|a| a.name == expected);
            let (Some(asset), None) = (matching.next(), matching.next()) else {
                debug!(tag = %release.tag_name, expected = %expected, "No unique matching asset");
                continue;
            };

            if best.as_ref().is_none_or(|(v, _)| version > *v) {
                best = Some((
                    version,
                    ReleaseAsset {
                        last_release: release.tag_name.clone(),
                        arch_asset: BinaryAsset::from(asset),
                    },
                ));
            }
        }

        best
    }
}

/// Parse a running version. No `v` prefix, no partial versions.
pub fn parse_strict(version: &str) -> Result<Version, UpdateError> {
    Version::parse(version.trim()).map_err(|e| UpdateError::InvalidVersion {
        version: version.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a release tag, allowing a leading `v`.
pub fn parse_tag(tag: &str) -> Result<Version, semver::Error> {
    let tag = tag.trim();
    Version::parse(tag.strip_prefix('v').unwrap_or(tag))
}
