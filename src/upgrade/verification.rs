use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Verifies downloaded archives against the digest published with the asset.
///
/// Digests use the `<algorithm>:<hex>` form. Only `sha256` is supported; any
/// other algorithm is rejected rather than skipped.
///
/// # Examples
///
/// ```rust,no_run
/// use srat_updater::upgrade::verification::ChecksumVerifier;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let digest = ChecksumVerifier::compute_sha256(Path::new("/tmp/srat_x86_64.zip")).await?;
/// ChecksumVerifier::verify_digest(Path::new("/tmp/srat_x86_64.zip"), &digest).await?;
/// # Ok(())
/// # }
/// ```
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Compute the SHA-256 digest of a file as `sha256:<hex>`.
    pub async fn compute_sha256(file_path: &Path) -> Result<String> {
        debug!("Computing SHA256 checksum for: {:?}", file_path);

        let mut file = fs::File::open(file_path)
            .await
            .with_context(|| format!("Failed to open file: {file_path:?}"))?;

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let read = file
                .read(&mut buffer)
                .await
                .with_context(|| format!("Failed to read file: {file_path:?}"))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
    }

    /// Verify a file against an expected `sha256:<hex>` digest.
    ///
    /// # Errors
    ///
    /// - unsupported digest format
    /// - checksum mismatch
    /// - the file cannot be read
    pub async fn verify_digest(file_path: &Path, expected: &str) -> Result<()> {
        let Some(expected_hex) = expected.strip_prefix("sha256:") else {
            bail!("unsupported digest format: {expected}");
        };
        if expected_hex.len() != 64 || hex::decode(expected_hex).is_err() {
            bail!("unsupported digest format: {expected}");
        }

        info!("Verifying checksum for: {:?}", file_path);
        let actual = Self::compute_sha256(file_path).await?;

        // Case-insensitive comparison (checksums may be uppercase or lowercase)
        if !actual.eq_ignore_ascii_case(expected) {
            bail!("checksum mismatch: expected {expected}, got {actual}");
        }

        info!("Checksum verification successful");
        Ok(())
    }
}
