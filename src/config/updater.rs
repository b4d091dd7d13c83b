//! Updater configuration.
//!
//! The configuration is read-only from the updater's point of view: it is
//! loaded from TOML and never written back.
//!
//! # Location
//!
//! 1. The path passed with `--config`
//! 2. The `SRAT_UPDATER_CONFIG` environment variable
//! 3. `~/.srat/updater.toml`
//!
//! A missing file yields the defaults.
//!
//! # Example
//!
//! ```toml
//! update_channel = "prerelease"
//! auto_update = true
//! data_dir = "$SRAT_DATA/update"
//!
//! [release]
//! owner = "dianlight"
//! repo = "srat"
//! per_page = 5
//!
//! [schedule]
//! check_interval_secs = 1800
//!
//! [restart]
//! service_dir = "/run/service/srat"
//! ```

use crate::core::UpdateError;
use crate::upgrade::UpdateChannel;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "SRAT_UPDATER_CONFIG";

/// Top-level updater configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// Release track to follow.
    pub update_channel: UpdateChannel,

    /// Install automatically after a successful check.
    pub auto_update: bool,

    /// Root for temporary extraction directories, the install lock and the
    /// develop drop-in. Supports `~/` and `$VAR`.
    pub data_dir: String,

    /// Override for the running version; defaults to the crate version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,

    pub release: ReleaseSettings,
    pub fetch: FetchSettings,
    pub schedule: ScheduleSettings,
    pub restart: RestartSettings,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            update_channel: UpdateChannel::default(),
            auto_update: false,
            data_dir: "~/.srat/update".to_string(),
            current_version: None,
            release: ReleaseSettings::default(),
            fetch: FetchSettings::default(),
            schedule: ScheduleSettings::default(),
            restart: RestartSettings::default(),
        }
    }
}

/// Where releases are listed and how assets are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseSettings {
    pub owner: String,
    pub repo: String,
    pub api_base: String,
    /// Asset names look like `<artifact_prefix>_<arch>.zip`.
    pub artifact_prefix: String,
    /// Size of the newest-first page requested from the API.
    pub per_page: u8,
    /// Lifetime of the cached release listing.
    pub cache_ttl_secs: u64,
    /// Optional bearer token for rate-limited or private repositories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            owner: "dianlight".to_string(),
            repo: "srat".to_string(),
            api_base: "https://api.github.com".to_string(),
            artifact_prefix: "srat".to_string(),
            per_page: 5,
            cache_ttl_secs: 300,
            token: None,
        }
    }
}

impl ReleaseSettings {
    /// URL of the release listing endpoint, including the page size.
    #[must_use]
    pub fn releases_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/releases?per_page={}",
            self.api_base.trim_end_matches('/'),
            self.owner,
            self.repo,
            self.per_page
        )
    }

    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Download settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Hosts an asset URL may point at. Empty allows any host.
    pub allowed_hosts: Vec<String>,
    pub connect_timeout_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            allowed_hosts: vec![
                "github.com".to_string(),
                "objects.githubusercontent.com".to_string(),
                "release-assets.githubusercontent.com".to_string(),
            ],
            connect_timeout_secs: 30,
        }
    }
}

/// Background loop timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    /// Minimum interval between full check cycles.
    pub check_interval_secs: u64,
    /// Cancellation and develop drop-in polling period.
    pub poll_interval_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: 30 * 60,
            poll_interval_secs: 10,
        }
    }
}

impl ScheduleSettings {
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Restart hand-off settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartSettings {
    /// Supervised service directory passed to `s6-svc -r`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_dir: Option<PathBuf>,
}

impl UpdaterConfig {
    /// Load from an optional explicit path, falling back to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if
    /// the parsed values fail [`validate`](Self::validate).
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            tracing::debug!(path = %path.display(), "No updater config found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read updater config from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse updater config from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// `$SRAT_UPDATER_CONFIG`, else `~/.srat/updater.toml`.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
            && !path.is_empty()
        {
            return Ok(PathBuf::from(path));
        }
        Ok(crate::utils::platform::get_home_dir()?.join(".srat").join("updater.toml"))
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), UpdateError> {
        let invalid = |message: String| Err(UpdateError::Config { message });

        if self.release.per_page == 0 || self.release.per_page > 100 {
            return invalid(format!(
                "release.per_page must be between 1 and 100, got {}",
                self.release.per_page
            ));
        }
        if self.release.artifact_prefix.is_empty() {
            return invalid("release.artifact_prefix must not be empty".to_string());
        }
        if self.schedule.check_interval_secs == 0 || self.schedule.poll_interval_secs == 0 {
            return invalid("schedule intervals must be at least one second".to_string());
        }
        if self.data_dir.trim().is_empty() {
            return invalid("data_dir must not be empty".to_string());
        }
        Ok(())
    }

    /// `data_dir` with `~/` and environment variables expanded.
    pub fn data_dir_path(&self) -> Result<PathBuf, UpdateError> {
        crate::utils::platform::resolve_path(&self.data_dir).map_err(|e| UpdateError::Config {
            message: format!("{e:#}"),
        })
    }

    /// The version the running daemon reports.
    #[must_use]
    pub fn running_version(&self) -> &str {
        self.current_version.as_deref().unwrap_or(env!("CARGO_PKG_VERSION"))
    }
}
