//! Platform helpers: home directory, path expansion, CPU architecture names
//! and command lookup.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Returns the user's home directory.
///
/// # Errors
///
/// Fails when `$HOME` is unset and no passwd entry can be consulted.
pub fn get_home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine home directory.\n\n\
            Check that the HOME environment variable is set"
        )
    })
}

/// Expand a leading `~/` and `$VAR` / `${VAR}` references in `path`.
///
/// Only `~/` is supported for tilde expansion; `~user` forms are rejected.
///
/// # Examples
///
/// ```rust,no_run
/// use srat_updater::utils::platform::resolve_path;
///
/// # fn example() -> anyhow::Result<()> {
/// let data_dir = resolve_path("~/.srat/update")?;
/// let from_env = resolve_path("$SRAT_DATA/update")?;
/// # Ok(())
/// # }
/// ```
pub fn resolve_path(path: &str) -> Result<PathBuf> {
    let expanded = if let Some(stripped) = path.strip_prefix("~/") {
        get_home_dir()?.join(stripped)
    } else if path == "~" {
        get_home_dir()?
    } else if path.starts_with('~') {
        return Err(anyhow::anyhow!(
            "Invalid path: {path}\n\n\
            Tilde expansion only supports '~/' for the home directory"
        ));
    } else {
        PathBuf::from(path)
    };

    let path_str = expanded.to_string_lossy();
    let expanded_str = shellexpand::env(&path_str)
        .with_context(|| {
            format!(
                "Failed to expand environment variables in path: {path_str}\n\n\
                Use $VAR or ${{VAR}} and make sure the variable is set"
            )
        })?
        .into_owned();

    Ok(PathBuf::from(expanded_str))
}

/// Map a target architecture name onto the name used in release assets.
///
/// `arm64` becomes `aarch64` and `amd64` becomes `x86_64`; everything else
/// passes through unchanged.
///
/// ```rust
/// use srat_updater::utils::platform::normalize_arch;
///
/// assert_eq!(normalize_arch("arm64"), "aarch64");
/// assert_eq!(normalize_arch("amd64"), "x86_64");
/// assert_eq!(normalize_arch("armv7"), "armv7");
/// ```
#[must_use]
pub fn normalize_arch(arch: &str) -> &str {
    match arch {
        "arm64" => "aarch64",
        "amd64" => "x86_64",
        other => other,
    }
}

/// Architecture of the running build, normalised for asset matching.
#[must_use]
pub fn current_arch() -> &'static str {
    normalize_arch(std::env::consts::ARCH)
}

/// Whether `cmd` can be found on `PATH`.
#[must_use]
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}
