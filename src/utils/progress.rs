//! Terminal rendering of update progress.
//!
//! [`TerminalProgress`] is a [`ProgressSink`] drawing one `indicatif` bar per
//! attempt: the bar position is the percentage within the current status and
//! the message names the status. Set `SRAT_NO_PROGRESS` to hide it.

use crate::upgrade::progress::{ProgressSink, UpdateProgress, UpdateStatus};
use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};

/// Environment variable that hides progress bars.
pub const NO_PROGRESS_ENV_VAR: &str = "SRAT_NO_PROGRESS";

fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV_VAR).is_some()
}

/// Progress bar fed by pipeline broadcasts.
#[derive(Debug, Clone)]
pub struct TerminalProgress {
    inner: IndicatifBar,
}

impl TerminalProgress {
    pub fn new() -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new(100);
            bar.set_style(default_style());
            bar
        };
        Self { inner: bar }
    }

    /// A bar that never draws.
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }

    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    pub fn message(&self) -> String {
        self.inner.message().to_string()
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn publish(&self, progress: UpdateProgress) {
        let label = status_label(progress.status);
        let message = match (&progress.last_release, &progress.error_message) {
            (_, Some(error)) => format!("{label}: {error}"),
            (Some(tag), None) => format!("{label} {tag}"),
            (None, None) => label.to_string(),
        };
        self.inner.set_message(message);
        self.inner.set_position(u64::from(progress.progress));

        if matches!(progress.status, UpdateStatus::InstallComplete | UpdateStatus::Failed) {
            self.inner.finish();
        }
    }
}

fn status_label(status: UpdateStatus) -> &'static str {
    match status {
        UpdateStatus::Checking => "Checking for updates",
        UpdateStatus::NoUpgrade => "Up to date",
        UpdateStatus::UpgradeAvailable => "Update available",
        UpdateStatus::Downloading => "Downloading",
        UpdateStatus::DownloadComplete => "Downloaded",
        UpdateStatus::Extracting => "Extracting",
        UpdateStatus::ExtractComplete => "Extracted",
        UpdateStatus::Installing => "Installing",
        UpdateStatus::InstallComplete => "Installed",
        UpdateStatus::Failed => "Failed",
    }
}

fn default_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{msg:30!} [{bar:40.cyan/blue}] {pos:>3}%")
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
        .progress_chars("━╸━")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_updates_bar() {
        let bar = TerminalProgress::hidden();

        let mut value = UpdateProgress::new(UpdateStatus::Downloading, 42);
        value.last_release = Some("2025.6.1".to_string());
        bar.publish(value);

        assert_eq!(bar.position(), 42);
        assert_eq!(bar.message(), "Downloading 2025.6.1");
    }

    #[test]
    fn test_failure_message_includes_error() {
        let bar = TerminalProgress::hidden();
        let mut value = UpdateProgress::new(UpdateStatus::Failed, 100);
        value.error_message = Some("download_failed: HTTP 404".to_string());
        bar.publish(value);

        assert_eq!(bar.message(), "Failed: download_failed: HTTP 404");
    }
}
