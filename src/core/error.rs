//! Error handling for the SRAT updater
//!
//! The error system follows two principles:
//! 1. **Strongly-typed errors** so callers can tell a benign "no update" from a
//!    security-relevant failure such as a rejected signature
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Error Categories
//!
//! - **Benign**: [`UpdateError::NoUpdateAvailable`] is expected in normal operation
//!   (channel disabled, release API unreachable, nothing newer published)
//! - **Caller errors**: [`UpdateError::InvalidPackage`], [`UpdateError::Config`]
//! - **Transport**: [`UpdateError::DownloadFailed`]
//! - **Security-relevant**: [`UpdateError::ExtractionFailed`],
//!   [`UpdateError::SignatureInvalid`]
//! - **Filesystem**: [`UpdateError::InstallFailed`]
//!
//! Use [`user_friendly_error`] to convert any `anyhow::Error` into an
//! [`ErrorContext`] with suggestions before printing it.

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for update operations.
///
/// Every stage of the pipeline surfaces one of these variants without retrying;
/// retry timing belongs to the scheduler's interval.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// No eligible, strictly newer release exists, or checks are disabled.
    ///
    /// This also absorbs transient release-API failures so that network loss
    /// never surfaces as an application fault.
    #[error("No update available: {reason}")]
    NoUpdateAvailable {
        /// Why no update was selected
        reason: String,
    },

    /// The running version could not be parsed as a strict semantic version.
    #[error("Invalid running version '{version}': {reason}")]
    InvalidVersion {
        /// The offending version string
        version: String,
        /// Parser message
        reason: String,
    },

    /// The package or arguments handed to the installer are unusable.
    #[error("Invalid update package: {reason}")]
    InvalidPackage {
        /// What was missing or malformed
        reason: String,
    },

    /// The asset could not be downloaded or failed its content digest.
    #[error("Download failed for {url}: {reason}")]
    DownloadFailed {
        /// URL that was requested
        url: String,
        /// HTTP status code when the server answered
        status: Option<u16>,
        /// Human-readable cause
        reason: String,
    },

    /// The archive was corrupt, attempted path traversal, or lacked the executable.
    #[error("Extraction failed: {reason}")]
    ExtractionFailed {
        /// Human-readable cause
        reason: String,
    },

    /// A detached signature was missing or did not verify on a channel that requires one.
    #[error("Signature invalid for {path}: {reason}")]
    SignatureInvalid {
        /// Binary whose signature was checked
        path: String,
        /// Human-readable cause
        reason: String,
    },

    /// A filesystem operation failed during the atomic swap.
    #[error("Install failed during {operation} on {path}: {reason}")]
    InstallFailed {
        /// Which swap step failed
        operation: String,
        /// Path involved
        path: String,
        /// Human-readable cause
        reason: String,
    },

    /// Another update attempt already holds the guard.
    #[error("Another update attempt is already in progress")]
    Busy,

    /// The owning cancellation token fired before the stage completed.
    #[error("Update cancelled")]
    Cancelled,

    /// The updater configuration could not be loaded.
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable cause
        message: String,
    },
}

impl UpdateError {
    /// Shorthand for [`UpdateError::NoUpdateAvailable`].
    pub fn no_update(reason: impl Into<String>) -> Self {
        Self::NoUpdateAvailable {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`UpdateError::InvalidPackage`].
    pub fn invalid_package(reason: impl Into<String>) -> Self {
        Self::InvalidPackage {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`UpdateError::ExtractionFailed`].
    pub fn extraction(reason: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`UpdateError::DownloadFailed`] without a status code.
    pub fn download(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DownloadFailed {
            url: url.into(),
            status: None,
            reason: reason.into(),
        }
    }

    /// Shorthand for [`UpdateError::SignatureInvalid`].
    pub fn signature(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Self::SignatureInvalid {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`UpdateError::InstallFailed`].
    pub fn install(
        operation: impl Into<String>,
        path: &std::path::Path,
        reason: impl fmt::Display,
    ) -> Self {
        Self::InstallFailed {
            operation: operation.into(),
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether this is the benign "nothing to do" outcome.
    #[must_use]
    pub const fn is_no_update(&self) -> bool {
        matches!(self, Self::NoUpdateAvailable { .. })
    }

    /// Stable short label for logs and FAILED broadcasts.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NoUpdateAvailable { .. } => "no_update_available",
            Self::InvalidVersion { .. } => "invalid_version",
            Self::InvalidPackage { .. } => "invalid_package",
            Self::DownloadFailed { .. } => "download_failed",
            Self::ExtractionFailed { .. } => "extraction_failed",
            Self::SignatureInvalid { .. } => "signature_invalid",
            Self::InstallFailed { .. } => "install_failed",
            Self::Busy => "busy",
            Self::Cancelled => "cancelled",
            Self::Config { .. } => "config",
        }
    }
}

/// Error wrapper carrying a suggestion and extra details for terminal output.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: UpdateError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(error: UpdateError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with suggestions for the CLI.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(update_error) = error.downcast_ref::<UpdateError>() {
        return create_error_context(update_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>()
        && io_error.kind() == std::io::ErrorKind::PermissionDenied
    {
        return ErrorContext::new(UpdateError::InstallFailed {
            operation: "file access".to_string(),
            path: "unknown".to_string(),
            reason: io_error.to_string(),
        })
        .with_suggestion("Run the updater as the user that owns the daemon binary")
        .with_details("The updater must be able to write next to the installed executable");
    }

    ErrorContext::new(UpdateError::Config {
        message: format!("{error:#}"),
    })
}

fn create_error_context(error: UpdateError) -> ErrorContext {
    match &error {
        UpdateError::NoUpdateAvailable { .. } => ErrorContext::new(error)
            .with_details("This is not a failure: the running build is already the best candidate"),
        UpdateError::InvalidVersion { .. } => ErrorContext::new(error)
            .with_suggestion("Set 'current_version' in the updater config to a semantic version such as 2025.6.1"),
        UpdateError::DownloadFailed { status: Some(404), .. } => ErrorContext::new(error)
            .with_suggestion("The release asset was removed; run 'srat-updater check' again"),
        UpdateError::DownloadFailed { .. } => ErrorContext::new(error)
            .with_suggestion("Check network connectivity and 'fetch.allowed_hosts' in the updater config"),
        UpdateError::ExtractionFailed { .. } => ErrorContext::new(error)
            .with_details("The downloaded bundle was rejected and removed; nothing was installed"),
        UpdateError::SignatureInvalid { .. } => ErrorContext::new(error)
            .with_suggestion("Only install officially signed builds, or switch to the 'develop' channel for local builds")
            .with_details("The installed binary was left unchanged"),
        UpdateError::InstallFailed { .. } => ErrorContext::new(error)
            .with_suggestion("Run 'srat-updater rollback' if the daemon no longer starts")
            .with_details("The previous binary is kept next to the target with a '.old' suffix"),
        UpdateError::Busy => ErrorContext::new(error)
            .with_suggestion("Wait for the running update attempt to finish and try again"),
        _ => ErrorContext::new(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UpdateError::no_update("no releases found");
        assert_eq!(err.to_string(), "No update available: no releases found");

        let err = UpdateError::DownloadFailed {
            url: "https://example.com/a.zip".to_string(),
            status: Some(500),
            reason: "HTTP 500".to_string(),
        };
        assert_eq!(err.to_string(), "Download failed for https://example.com/a.zip: HTTP 500");
    }

    #[test]
    fn test_is_no_update_only_for_benign_outcome() {
        assert!(UpdateError::no_update("x").is_no_update());
        assert!(!UpdateError::extraction("invalid file path in zip").is_no_update());
        let err = UpdateError::signature(std::path::Path::new("/bin/srat"), "missing");
        assert!(!err.is_no_update());
    }

    #[test]
    fn test_kind_labels_are_distinct_for_security_errors() {
        assert_eq!(UpdateError::extraction("x").kind(), "extraction_failed");
        assert_eq!(
            UpdateError::signature(std::path::Path::new("a"), "x").kind(),
            "signature_invalid"
        );
        assert_ne!(UpdateError::no_update("x").kind(), UpdateError::extraction("x").kind());
    }

    #[test]
    fn test_user_friendly_error_for_signature() {
        let ctx = user_friendly_error(anyhow::Error::new(UpdateError::signature(
            std::path::Path::new("/usr/bin/srat"),
            "signature file not found",
        )));
        assert!(ctx.suggestion.is_some());
        assert!(ctx.to_string().contains("unchanged"));
    }

    #[test]
    fn test_user_friendly_error_fallback() {
        let ctx = user_friendly_error(anyhow::anyhow!("something odd"));
        assert!(matches!(ctx.error, UpdateError::Config { .. }));
        assert!(ctx.to_string().contains("something odd"));
    }
}
