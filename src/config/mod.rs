//! Configuration for the SRAT updater.
//!
//! The updater consumes a single TOML file, [`UpdaterConfig`], holding the
//! selected channel, the auto-update flag, the data directory and the
//! settings of each pipeline stage. See [`updater`] for the file format and
//! lookup order.

mod updater;

pub use updater::{
    CONFIG_ENV_VAR, FetchSettings, ReleaseSettings, RestartSettings, ScheduleSettings,
    UpdaterConfig,
};
