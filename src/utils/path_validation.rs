//! Path validation for archive extraction and install targets.
//!
//! Archive entry names are untrusted input. Everything here works lexically
//! (no filesystem access) so that a check can run before anything is created.

use anyhow::{Result, anyhow};
use std::path::{Component, Path, PathBuf};

/// Reject any path that contains a parent-directory (`..`) component.
///
/// # Examples
///
/// ```rust
/// use srat_updater::utils::path_validation::validate_no_traversal;
/// use std::path::Path;
///
/// assert!(validate_no_traversal(Path::new("bin/srat")).is_ok());
/// assert!(validate_no_traversal(Path::new("bin/../../etc/passwd")).is_err());
/// ```
pub fn validate_no_traversal(path: &Path) -> Result<()> {
    for component in path.components() {
        if component == Component::ParentDir {
            return Err(anyhow!(
                "Path contains parent directory reference (..): {}",
                path.display()
            ));
        }
    }
    Ok(())
}

/// Clean a relative archive entry name.
///
/// `.` components are dropped. Absolute paths, drive prefixes and `..`
/// components are rejected. An entry that cleans to nothing is rejected too.
pub fn clean_relative_path(name: &str) -> Result<PathBuf> {
    // Archives written on Windows may use backslashes.
    let normalized = name.replace('\\', "/");
    let path = Path::new(&normalized);

    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => cleaned.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(anyhow!("entry '{name}' contains a parent directory reference"));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(anyhow!("entry '{name}' is an absolute path"));
            }
        }
    }

    if cleaned.as_os_str().is_empty() {
        return Err(anyhow!("entry '{name}' has an empty path"));
    }
    Ok(cleaned)
}

/// Join an untrusted entry name onto `root`, guaranteeing the result stays
/// strictly inside `root`.
pub fn join_within(root: &Path, name: &str) -> Result<PathBuf> {
    let relative = clean_relative_path(name)?;
    let joined = root.join(&relative);
    if !joined.starts_with(root) || joined == root {
        return Err(anyhow!(
            "entry '{name}' resolves outside {}",
            root.display()
        ));
    }
    Ok(joined)
}
