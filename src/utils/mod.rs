//! Filesystem, platform and terminal helpers
//!
//! # Modules
//!
//! - [`fs`] - Atomic file placement and mode-aware directory creation
//! - [`path_validation`] - Rejecting archive paths that escape their root
//! - [`platform`] - Home directory, path expansion, CPU architecture names
//! - [`progress`] - `indicatif` rendering of update progress
//!
//! # Example
//!
//! ```rust,no_run
//! use srat_updater::utils::{atomic_copy, join_within, resolve_path};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let data_dir = resolve_path("~/.srat/update")?;
//! let dest = join_within(&data_dir, "share/defaults.json")?;
//! atomic_copy(Path::new("/tmp/defaults.json"), &dest)?;
//! # Ok(())
//! # }
//! ```

pub mod fs;
pub mod path_validation;
pub mod platform;
pub mod progress;

pub use fs::{atomic_copy, create_dir_all_with_mode, is_executable, set_mode, staging_path};
pub use path_validation::{clean_relative_path, join_within, validate_no_traversal};
pub use platform::{current_arch, get_home_dir, normalize_arch, resolve_path};
pub use progress::TerminalProgress;
