//! Reads the version a candidate binary reports about itself.

use async_trait::async_trait;
use regex::Regex;
use semver::Version;
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bv?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?)")
        .expect("version pattern is valid")
});

/// Asks a binary for its version.
///
/// `None` means the version could not be determined; callers decide whether
/// that is acceptable for the channel in use.
#[async_trait]
pub trait VersionProbe: Send + Sync {
    async fn probe(&self, binary: &Path) -> Option<Version>;
}

/// Runs `<binary> --version` and takes the first semantic version printed.
#[derive(Debug, Clone)]
pub struct CommandVersionProbe {
    args: Vec<String>,
    timeout: Duration,
}

impl Default for CommandVersionProbe {
    fn default() -> Self {
        Self {
            args: vec!["--version".to_string()],
            timeout: Duration::from_secs(10),
        }
    }
}

impl CommandVersionProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl VersionProbe for CommandVersionProbe {
    async fn probe(&self, binary: &Path) -> Option<Version> {
        debug!(binary = %binary.display(), "Probing candidate version");
        let mut cmd = Command::new(binary);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(binary = %binary.display(), error = %e, "Cannot run candidate binary");
                return None;
            }
            Err(_) => {
                warn!(
                    binary = %binary.display(),
                    "Version probe timed out after {} seconds",
                    self.timeout.as_secs()
                );
                return None;
            }
        };

        if !output.status.success() {
            warn!(binary = %binary.display(), status = %output.status, "Version probe failed");
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_version_output(&stdout)
            .or_else(|| parse_version_output(&String::from_utf8_lossy(&output.stderr)))
    }
}

/// First semantic version found in `text`, e.g. `srat 2025.6.1 (abc123)`.
pub fn parse_version_output(text: &str) -> Option<Version> {
    VERSION_PATTERN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| Version::parse(m.as_str()).ok())
}
