//! Atomic file placement.
//!
//! Files are written to a hidden sibling first, synced, then renamed over the
//! destination. A reader of the destination path sees either the old file or
//! the complete new one, never a partial write.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Sibling path used as the staging file for `dest`.
#[must_use]
pub fn staging_path(dest: &Path) -> PathBuf {
    let name = dest.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    dest.with_file_name(format!(".{name}.new"))
}

/// Copy `src` to `dest` atomically, preserving `src`'s permissions.
///
/// The staging file is removed if any step fails.
pub fn atomic_copy(src: &Path, dest: &Path) -> io::Result<()> {
    let staging = staging_path(dest);

    let result = (|| {
        fs::copy(src, &staging)?;
        fs::File::open(&staging)?.sync_all()?;
        fs::set_permissions(&staging, fs::metadata(src)?.permissions())?;
        fs::rename(&staging, dest)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}
