//! Hand-off after a successful swap.
//!
//! Once the new binary is in place the process must start running it. Two
//! strategies exist:
//!
//! - [`RestartStrategy::Supervisor`]: an s6 supervisor owns the process. It is
//!   asked to restart the service (`s6-svc -r <service_dir>`) or, without a
//!   service directory, the daemon shuts down gracefully and the supervisor
//!   respawns it from the new binary.
//! - [`RestartStrategy::ReExec`]: the process replaces itself with the new
//!   binary, keeping its arguments and environment.

use crate::core::UpdateError;
use crate::utils::platform::command_exists;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Environment variable s6-overlay exports to supervised processes.
pub const SUPERVISOR_ENV_MARKER: &str = "S6_VERSION";

/// Process name of the s6 per-service supervisor.
pub const SUPERVISOR_PROCESS: &str = "s6-supervise";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartStrategy {
    Supervisor,
    ReExec,
}

impl RestartStrategy {
    /// Inspect the environment marker and the parent command line.
    pub fn detect() -> Self {
        let marker = std::env::var_os(SUPERVISOR_ENV_MARKER).is_some();
        Self::from_markers(marker, parent_cmdline().as_deref())
    }

    pub fn from_markers(env_marker: bool, parent_cmdline: Option<&str>) -> Self {
        let supervised_parent =
            parent_cmdline.is_some_and(|cmdline| cmdline.contains(SUPERVISOR_PROCESS));
        if env_marker || supervised_parent {
            Self::Supervisor
        } else {
            Self::ReExec
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::ReExec => "re-exec",
        }
    }
}

impl std::fmt::Display for RestartStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(unix)]
fn parent_cmdline() -> Option<String> {
    let ppid = std::os::unix::process::parent_id();
    let raw = std::fs::read(format!("/proc/{ppid}/cmdline")).ok()?;
    let cmdline = String::from_utf8_lossy(&raw).replace('\0', " ");
    Some(cmdline.trim().to_string())
}

#[cfg(not(unix))]
fn parent_cmdline() -> Option<String> {
    None
}

/// Performs the hand-off to the freshly installed `binary`.
#[async_trait]
pub trait Restarter: Send + Sync {
    async fn restart(&self, strategy: RestartStrategy, binary: &Path) -> Result<(), UpdateError>;
}

/// Production restarter.
#[derive(Debug, Clone)]
pub struct ProcessRestarter {
    service_dir: Option<PathBuf>,
    shutdown: CancellationToken,
}

impl ProcessRestarter {
    /// `shutdown` is cancelled when the supervisor should respawn the daemon.
    pub fn new(service_dir: Option<PathBuf>, shutdown: CancellationToken) -> Self {
        Self {
            service_dir,
            shutdown,
        }
    }

    async fn signal_supervisor(&self, binary: &Path) -> Result<(), UpdateError> {
        if let Some(service_dir) = &self.service_dir
            && command_exists("s6-svc")
        {
            info!(service_dir = %service_dir.display(), "Asking s6 to restart the service");
            let status = tokio::process::Command::new("s6-svc")
                .arg("-r")
                .arg(service_dir)
                .stdin(Stdio::null())
                .status()
                .await
                .map_err(|e| UpdateError::install("restart", binary, e))?;
            if status.success() {
                return Ok(());
            }
            warn!(%status, "s6-svc failed, falling back to graceful shutdown");
        }

        info!("Shutting down so the supervisor respawns the new binary");
        self.shutdown.cancel();
        Ok(())
    }

    #[cfg(unix)]
    fn re_exec(binary: &Path) -> Result<(), UpdateError> {
        use std::os::unix::process::CommandExt;

        info!(binary = %binary.display(), "Re-executing new binary");
        // exec only returns on failure
        let err = std::process::Command::new(binary).args(std::env::args_os().skip(1)).exec();
        Err(UpdateError::install("restart", binary, err))
    }

    #[cfg(not(unix))]
    fn re_exec(binary: &Path) -> Result<(), UpdateError> {
        Err(UpdateError::install("restart", binary, "re-exec requires a Unix host"))
    }
}

#[async_trait]
impl Restarter for ProcessRestarter {
    async fn restart(&self, strategy: RestartStrategy, binary: &Path) -> Result<(), UpdateError> {
        match strategy {
            RestartStrategy::Supervisor => self.signal_supervisor(binary).await,
            RestartStrategy::ReExec => Self::re_exec(binary),
        }
    }
}
