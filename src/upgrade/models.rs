use crate::core::UpdateError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// One architecture-specific artifact of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryAsset {
    pub name: String,
    pub download_url: String,
    /// Declared size in bytes, used for download progress.
    pub size: u64,
    /// Optional content digest in `sha256:<hex>` form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// The best available upgrade: never worse than or equal to the running version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    /// Release tag, e.g. `2025.6.1`.
    pub last_release: String,
    pub arch_asset: BinaryAsset,
}

/// An extracted bundle waiting to be installed.
///
/// The package exclusively owns its temporary directory; dropping the package
/// deletes the directory and everything under it. `current_executable_path`,
/// when set, always lies strictly inside that directory.
#[derive(Debug)]
pub struct UpdatePackage {
    temp_dir: TempDir,
    current_executable_path: Option<PathBuf>,
    other_files_paths: Vec<PathBuf>,
}

impl UpdatePackage {
    /// Create a fresh package rooted in a new temporary directory under `data_dir`.
    pub fn create_in(data_dir: &Path) -> Result<Self, UpdateError> {
        std::fs::create_dir_all(data_dir).map_err(|e| {
            UpdateError::extraction(format!(
                "cannot create data directory {}: {e}",
                data_dir.display()
            ))
        })?;
        let temp_dir = tempfile::Builder::new()
            .prefix("srat-update-")
            .tempdir_in(data_dir)
            .map_err(|e| {
                UpdateError::extraction(format!(
                    "cannot create temporary directory in {}: {e}",
                    data_dir.display()
                ))
            })?;
        Ok(Self::new(temp_dir))
    }

    /// Wrap an existing temporary directory.
    #[must_use]
    pub const fn new(temp_dir: TempDir) -> Self {
        Self {
            temp_dir,
            current_executable_path: None,
            other_files_paths: Vec::new(),
        }
    }

    /// Build a package from a local binary (develop drop-in).
    ///
    /// The binary and its sibling `.minisig`, if any, are copied into a new
    /// temporary directory under `data_dir` so the original drop-in file is
    /// never consumed by the installer.
    pub fn from_local_binary(data_dir: &Path, binary: &Path) -> Result<Self, UpdateError> {
        let mut pkg = Self::create_in(data_dir)?;
        let file_name = binary
            .file_name()
            .ok_or_else(|| UpdateError::invalid_package("local binary has no file name"))?;
        let dest = pkg.temp_dir_path().join(file_name);
        std::fs::copy(binary, &dest).map_err(|e| {
            UpdateError::invalid_package(format!("cannot copy {}: {e}", binary.display()))
        })?;

        let signature = crate::upgrade::signature::signature_path(binary);
        if signature.is_file() {
            let sig_dest = crate::upgrade::signature::signature_path(&dest);
            std::fs::copy(&signature, &sig_dest).map_err(|e| {
                UpdateError::invalid_package(format!("cannot copy {}: {e}", signature.display()))
            })?;
        }

        pkg.set_current_executable(dest)?;
        Ok(pkg)
    }

    #[must_use]
    pub fn temp_dir_path(&self) -> &Path {
        self.temp_dir.path()
    }

    #[must_use]
    pub fn current_executable_path(&self) -> Option<&Path> {
        self.current_executable_path.as_deref()
    }

    #[must_use]
    pub fn other_files_paths(&self) -> &[PathBuf] {
        &self.other_files_paths
    }

    /// Record the extracted executable; rejects paths outside the temp root.
    pub fn set_current_executable(&mut self, path: PathBuf) -> Result<(), UpdateError> {
        self.ensure_inside(&path)?;
        self.current_executable_path = Some(path);
        Ok(())
    }

    /// Append an auxiliary file, keeping encounter order.
    pub fn push_other_file(&mut self, path: PathBuf) -> Result<(), UpdateError> {
        self.ensure_inside(&path)?;
        self.other_files_paths.push(path);
        Ok(())
    }

    /// Path of `path` relative to the temp root.
    #[must_use]
    pub fn relative_path<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(self.temp_dir.path()).ok()
    }

    fn ensure_inside(&self, path: &Path) -> Result<(), UpdateError> {
        match self.relative_path(path) {
            Some(rel) if !rel.as_os_str().is_empty() => {
                crate::utils::path_validation::validate_no_traversal(rel)
                    .map_err(|e| UpdateError::invalid_package(e.to_string()))
            }
            _ => Err(UpdateError::invalid_package(format!(
                "{} is outside the package directory {}",
                path.display(),
                self.temp_dir.path().display()
            ))),
        }
    }

    /// Delete the temporary directory now, reporting failures.
    pub fn cleanup(self) -> std::io::Result<()> {
        self.temp_dir.close()
    }
}
