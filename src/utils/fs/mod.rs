//! Filesystem helpers used by extraction and installation.

pub mod atomic;

pub use atomic::{atomic_copy, staging_path};

use std::io;
use std::path::Path;

/// Set Unix permission bits on `path`; a no-op elsewhere.
pub fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Ok(())
    }
}

/// Whether any execute bit is set on `path`. Always true off Unix.
pub fn is_executable(path: &Path) -> io::Result<bool> {
    let metadata = std::fs::metadata(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Ok(metadata.permissions().mode() & 0o111 != 0)
    }
    #[cfg(not(unix))]
    {
        Ok(metadata.is_file())
    }
}

/// Create `dir` and every missing ancestor below `root` with `mode`.
///
/// Modes are applied explicitly after creation so the process umask does not
/// widen or narrow them. Directories that already exist keep their mode,
/// except `dir` itself, which is always forced to `mode`.
pub fn create_dir_all_with_mode(root: &Path, dir: &Path, mode: u32) -> io::Result<()> {
    let relative = dir.strip_prefix(root).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not below {}", dir.display(), root.display()),
        )
    })?;

    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match std::fs::create_dir(&current) {
            Ok(()) => set_mode(&current, mode)?,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && current.is_dir() => {}
            Err(e) => return Err(e),
        }
    }
    if dir != root {
        set_mode(dir, mode)?;
    }
    Ok(())
}
