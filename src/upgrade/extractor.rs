//! Safe zip extraction into an isolated package directory.
//!
//! Entry names are untrusted. Every entry is cleaned and joined onto the
//! package root with [`join_within`]; an entry that would land outside the
//! root aborts the whole extraction and the package directory is deleted
//! before the error is returned. Nothing is ever written outside the root.
//!
//! Directories (explicit or implied by a file path) are created with mode
//! `0750`. Files take the permission bits recorded in the archive header,
//! masked to `0o777`, or `0644` when the header has none.

use crate::core::UpdateError;
use crate::upgrade::models::UpdatePackage;
use crate::upgrade::progress::{StageProgress, UpdateStatus};
use crate::utils::fs::{create_dir_all_with_mode, set_mode};
use crate::utils::path_validation::join_within;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Mode applied to every extracted directory.
pub const DIR_MODE: u32 = 0o750;
/// Mode for files whose header carries no Unix permissions.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

const COPY_CHUNK: usize = 64 * 1024;

/// Unpacks update bundles into fresh [`UpdatePackage`]s under a data directory.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    data_dir: PathBuf,
    executable_name: OsString,
}

impl ArchiveExtractor {
    /// `executable_name` is the file name of the running binary; the archive
    /// entry with that base name becomes the package executable.
    pub fn new(data_dir: impl Into<PathBuf>, executable_name: impl Into<OsString>) -> Self {
        Self {
            data_dir: data_dir.into(),
            executable_name: executable_name.into(),
        }
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn executable_name(&self) -> &std::ffi::OsStr {
        &self.executable_name
    }

    /// Extract `archive_path` without progress reporting.
    pub async fn extract(
        &self,
        archive_path: &Path,
        token: &CancellationToken,
    ) -> Result<UpdatePackage, UpdateError> {
        self.extract_with_progress(archive_path, token, Arc::new(StageProgress::silent())).await
    }

    /// Extract `archive_path`, emitting `EXTRACTING` per entry and
    /// `EXTRACT_COMPLETE` at the end.
    pub async fn extract_with_progress(
        &self,
        archive_path: &Path,
        token: &CancellationToken,
        progress: Arc<StageProgress>,
    ) -> Result<UpdatePackage, UpdateError> {
        let pkg = UpdatePackage::create_in(&self.data_dir)?;
        let archive_path = archive_path.to_path_buf();
        let executable_name = self.executable_name.clone();
        let token = token.clone();

        info!(
            archive = %archive_path.display(),
            dest = %pkg.temp_dir_path().display(),
            "Extracting update bundle"
        );
        tokio::task::spawn_blocking(move || {
            extract_blocking(&archive_path, pkg, &executable_name, &token, &progress)
        })
        .await
        .map_err(|e| UpdateError::extraction(format!("extraction task failed: {e}")))?
    }
}

/// Runs on a blocking thread. `pkg` is dropped, deleting its directory, on
/// every error path.
fn extract_blocking(
    archive_path: &Path,
    mut pkg: UpdatePackage,
    executable_name: &std::ffi::OsStr,
    token: &CancellationToken,
    progress: &StageProgress,
) -> Result<UpdatePackage, UpdateError> {
    let file = File::open(archive_path).map_err(|e| {
        UpdateError::extraction(format!("cannot open {}: {e}", archive_path.display()))
    })?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| UpdateError::extraction(format!("corrupt archive: {e}")))?;

    let total = archive.len();
    if total == 0 {
        return Err(UpdateError::extraction("archive is empty"));
    }
    progress.emit(UpdateStatus::Extracting, 0);

    let root = pkg.temp_dir_path().to_path_buf();
    for index in 0..total {
        if token.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        let mut entry = archive
            .by_index(index)
            .map_err(|e| UpdateError::extraction(format!("corrupt archive entry {index}: {e}")))?;
        let name = entry.name().to_string();

        let dest = match (entry.enclosed_name(), join_within(&root, &name)) {
            (Some(_), Ok(dest)) => dest,
            _ => {
                return Err(UpdateError::extraction(format!("invalid file path in zip: {name}")));
            }
        };

        if entry.is_dir() {
            create_dir_all_with_mode(&root, &dest, DIR_MODE).map_err(|e| {
                UpdateError::extraction(format!("cannot create {}: {e}", dest.display()))
            })?;
        } else {
            if let Some(parent) = dest.parent() {
                create_dir_all_with_mode(&root, parent, DIR_MODE).map_err(|e| {
                    UpdateError::extraction(format!("cannot create {}: {e}", parent.display()))
                })?;
            }

            let mut out =
                OpenOptions::new().write(true).create_new(true).open(&dest).map_err(|e| {
                    UpdateError::extraction(format!("cannot create {}: {e}", dest.display()))
                })?;
            copy_cancellable(&mut entry, &mut out, token).map_err(|e| match e {
                CopyError::Cancelled => UpdateError::Cancelled,
                CopyError::Io(e) => UpdateError::extraction(format!("cannot extract {name}: {e}")),
            })?;
            drop(out);

            let mode = entry.unix_mode().map_or(DEFAULT_FILE_MODE, |m| m & 0o777);
            set_mode(&dest, mode).map_err(|e| {
                UpdateError::extraction(format!("cannot set mode on {}: {e}", dest.display()))
            })?;

            let is_executable = dest.file_name() == Some(executable_name)
                && pkg.current_executable_path().is_none();
            debug!(entry = %name, mode = %format!("{mode:o}"), is_executable, "Extracted file");
            if is_executable {
                pkg.set_current_executable(dest)?;
            } else {
                pkg.push_other_file(dest)?;
            }
        }

        progress.ratio(UpdateStatus::Extracting, (index + 1) as u64, total as u64);
    }

    if pkg.current_executable_path().is_none() {
        return Err(UpdateError::extraction(format!(
            "current executable not found in package (expected {})",
            executable_name.to_string_lossy()
        )));
    }

    progress.complete(UpdateStatus::ExtractComplete);
    info!(
        files = pkg.other_files_paths().len() + 1,
        dest = %pkg.temp_dir_path().display(),
        "Extraction complete"
    );
    Ok(pkg)
}

enum CopyError {
    Cancelled,
    Io(std::io::Error),
}

fn copy_cancellable(
    reader: &mut impl Read,
    writer: &mut impl Write,
    token: &CancellationToken,
) -> Result<u64, CopyError> {
    let mut buffer = vec![0u8; COPY_CHUNK];
    let mut copied = 0u64;
    loop {
        if token.is_cancelled() {
            return Err(CopyError::Cancelled);
        }
        let read = reader.read(&mut buffer).map_err(CopyError::Io)?;
        if read == 0 {
            return Ok(copied);
        }
        writer.write_all(&buffer[..read]).map_err(CopyError::Io)?;
        copied += read as u64;
    }
}
