//! Test utilities for the SRAT updater
//!
//! In-memory stand-ins for every external collaborator of the update
//! pipeline, plus helpers for building archives and signing binaries:
//! - [`FakeReleaseSource`] and [`release`] for the release API
//! - [`FakeTransport`] for asset downloads
//! - [`FakeVersionProbe`] and [`FakeRestarter`] for the installer
//! - [`RecordingSink`] to capture progress broadcasts
//! - [`CancellingSink`] to cancel an attempt partway through a stage
//! - [`ZipEntry`], [`write_zip`] and [`zip_bytes`] for update archives
//! - [`signing::TestSigner`] for minisign signatures
//!
//! # Example
//!
//! ```rust,no_run
//! use srat_updater::test_utils::{FakeReleaseSource, release};
//! use srat_updater::upgrade::ReleaseResolver;
//! use std::sync::Arc;
//!
//! let source = FakeReleaseSource::new(vec![release("2.0.0", false, &["srat_x86_64.zip"])]);
//! let resolver = ReleaseResolver::new(Arc::new(source), "1.0.0", "srat").with_arch("x86_64");
//! ```

pub mod fakes;
pub mod fixtures;
pub mod signing;

pub use fakes::{
    CancellingSink, FakeReleaseSource, FakeRestarter, FakeTransport, FakeVersionProbe,
    RecordingSink, release,
};
pub use fixtures::{ZipEntry, write_zip, zip_bytes};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. `level` wins over `RUST_LOG`; with
/// neither, tests run without a subscriber.
///
/// ```bash
/// RUST_LOG=srat_updater=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
