use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Suffix of the backup kept next to the installed binary.
pub const BACKUP_SUFFIX: &str = "old";

/// Keeps the previous binary at `<target>.old` while a swap is in progress.
///
/// The backup is taken with a hard link (falling back to a copy) rather than a
/// rename, so the install target keeps pointing at a complete binary until the
/// new one is renamed over it. Restoring renames the backup back over the
/// target, which consumes it.
///
/// All operations are blocking and meant to run inside the swap, which is not
/// a cancellation point.
///
/// # Examples
///
/// ```rust,no_run
/// use srat_updater::upgrade::backup::BackupManager;
/// use std::path::PathBuf;
///
/// # fn example() -> anyhow::Result<()> {
/// let backup = BackupManager::new(PathBuf::from("/usr/local/bin/srat"));
/// backup.create_backup()?;
/// // ... swap the new binary in ...
/// if backup.backup_exists() {
///     backup.restore_backup()?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BackupManager {
    original_path: PathBuf,
    backup_path: PathBuf,
}

impl BackupManager {
    pub fn new(target: PathBuf) -> Self {
        let mut backup_path = target.clone();
        backup_path.set_file_name(format!(
            "{}.{BACKUP_SUFFIX}",
            target.file_name().unwrap_or_default().to_string_lossy()
        ));

        Self {
            original_path: target,
            backup_path,
        }
    }

    /// Snapshot the current target into `<target>.old`.
    ///
    /// Returns `false` when there is nothing installed yet. A stale backup left
    /// by an earlier attempt is replaced.
    pub fn create_backup(&self) -> Result<bool> {
        if !self.original_path.exists() {
            debug!(target = %self.original_path.display(), "Nothing installed, no backup taken");
            return Ok(false);
        }

        if self.backup_path.exists() {
            debug!("Removing old backup at {:?}", self.backup_path);
            fs::remove_file(&self.backup_path).context("Failed to remove old backup")?;
        }

        info!("Creating backup at {:?}", self.backup_path);
        if let Err(e) = fs::hard_link(&self.original_path, &self.backup_path) {
            debug!("Hard link failed ({e}), copying instead");
            fs::copy(&self.original_path, &self.backup_path).context("Failed to create backup")?;
            let permissions = fs::metadata(&self.original_path)
                .context("Failed to read original file metadata")?
                .permissions();
            fs::set_permissions(&self.backup_path, permissions)
                .context("Failed to set backup permissions")?;
        }

        Ok(true)
    }

    /// Move the backup back over the target.
    pub fn restore_backup(&self) -> Result<()> {
        if !self.backup_path.exists() {
            bail!("No backup found at {:?}", self.backup_path);
        }

        warn!("Restoring from backup at {:?}", self.backup_path);

        let mut attempts = 0;
        const MAX_ATTEMPTS: u32 = 3;

        while attempts < MAX_ATTEMPTS {
            match fs::rename(&self.backup_path, &self.original_path) {
                Ok(()) => {
                    info!("Successfully restored from backup");
                    return Ok(());
                }
                Err(e) if attempts < MAX_ATTEMPTS - 1 => {
                    warn!("Restore attempt {} failed: {}. Retrying...", attempts + 1, e);
                    std::thread::sleep(Duration::from_millis(200));
                    attempts += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to restore backup after {MAX_ATTEMPTS} attempts")
                    });
                }
            }
        }

        bail!("Failed to restore backup after {MAX_ATTEMPTS} attempts")
    }

    pub fn cleanup_backup(&self) -> Result<()> {
        if self.backup_path.exists() {
            debug!("Cleaning up backup at {:?}", self.backup_path);
            fs::remove_file(&self.backup_path).context("Failed to remove backup")?;
        }
        Ok(())
    }

    pub fn backup_exists(&self) -> bool {
        self.backup_path.exists()
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    pub fn original_path(&self) -> &Path {
        &self.original_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_backup_path_naming() {
        let backup = BackupManager::new(PathBuf::from("/usr/local/bin/srat"));
        assert_eq!(backup.backup_path(), Path::new("/usr/local/bin/srat.old"));
    }

    #[cfg(unix)]
    #[test]
    fn test_backup_keeps_target_in_place() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().unwrap();
        let target = temp.path().join("srat");
        fs::write(&target, b"v1").unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o755)).unwrap();

        let backup = BackupManager::new(target.clone());
        assert!(backup.create_backup().unwrap());

        assert_eq!(fs::read(&target).unwrap(), b"v1");
        assert_eq!(fs::read(backup.backup_path()).unwrap(), b"v1");
        let mode = fs::metadata(backup.backup_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_backup_survives_rename_over_target() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("srat");
        let replacement = temp.path().join("next");
        fs::write(&target, b"v1").unwrap();
        fs::write(&replacement, b"v2").unwrap();

        let backup = BackupManager::new(target.clone());
        backup.create_backup().unwrap();
        fs::rename(&replacement, &target).unwrap();

        assert_eq!(fs::read(backup.backup_path()).unwrap(), b"v1");
        backup.restore_backup().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"v1");
        assert!(!backup.backup_exists());
    }

    #[test]
    fn test_no_backup_without_target() {
        let temp = tempdir().unwrap();
        let backup = BackupManager::new(temp.path().join("srat"));
        assert!(!backup.create_backup().unwrap());
        assert!(!backup.backup_exists());
        assert!(backup.restore_backup().is_err());
    }

    #[test]
    fn test_stale_backup_replaced() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("srat");
        fs::write(&target, b"v2").unwrap();
        fs::write(temp.path().join("srat.old"), b"v0").unwrap();

        let backup = BackupManager::new(target);
        backup.create_backup().unwrap();
        assert_eq!(fs::read(backup.backup_path()).unwrap(), b"v2");

        backup.cleanup_backup().unwrap();
        assert!(!backup.backup_exists());
    }
}
