//! Detached minisign signature checks.
//!
//! A binary at `path` is signed by a sibling file `path.minisig`. Whether the
//! signature is mandatory depends on the channel:
//!
//! | channel | no `.minisig` | invalid `.minisig` |
//! |---|---|---|
//! | `release`, `prerelease`, `none` | rejected | rejected |
//! | `develop` | accepted (warn) | rejected |
//!
//! The trusted public key is compiled in from the `SRAT_UPDATE_PUBLIC_KEY`
//! environment variable at build time. A build without one cannot accept
//! any signature.

use crate::core::UpdateError;
use crate::upgrade::UpdateChannel;
use minisign_verify::{PublicKey, Signature};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Public key baked into this build, in minisign text or bare base64 form.
pub const EMBEDDED_PUBLIC_KEY: Option<&str> = option_env!("SRAT_UPDATE_PUBLIC_KEY");

/// Extension of detached signature files.
pub const SIGNATURE_EXTENSION: &str = "minisig";

/// `<binary>.minisig`.
#[must_use]
pub fn signature_path(binary: &Path) -> PathBuf {
    let mut name = binary.as_os_str().to_os_string();
    name.push(".");
    name.push(SIGNATURE_EXTENSION);
    PathBuf::from(name)
}

/// Checks candidate binaries against the trusted key.
#[derive(Clone)]
pub struct SignatureVerifier {
    public_key: Option<Arc<PublicKey>>,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").field("has_key", &self.public_key.is_some()).finish()
    }
}

impl SignatureVerifier {
    /// Verifier using the key compiled into this build.
    ///
    /// A malformed embedded key is logged and treated as absent, so every
    /// signature-requiring channel fails closed.
    #[must_use]
    pub fn embedded() -> Self {
        match EMBEDDED_PUBLIC_KEY {
            Some(key) => Self::with_public_key(key).unwrap_or_else(|e| {
                warn!(error = %e, "Embedded update public key is malformed");
                Self { public_key: None }
            }),
            None => Self { public_key: None },
        }
    }

    /// Verifier trusting `key`, given as a minisign `.pub` file body or its
    /// bare base64 line.
    pub fn with_public_key(key: &str) -> Result<Self, UpdateError> {
        let key = key.trim();
        let parsed = if key.lines().count() > 1 {
            PublicKey::decode(key)
        } else {
            PublicKey::from_base64(key)
        };
        let public_key = parsed.map_err(|e| UpdateError::Config {
            message: format!("invalid minisign public key: {e}"),
        })?;
        Ok(Self { public_key: Some(Arc::new(public_key)) })
    }

    #[must_use]
    pub const fn has_public_key(&self) -> bool {
        self.public_key.is_some()
    }

    /// Verify `binary` for installation on `channel`.
    ///
    /// # Errors
    ///
    /// [`UpdateError::SignatureInvalid`] when the signature is required but
    /// missing, or present but not valid for the trusted key.
    pub async fn verify(&self, binary: &Path, channel: UpdateChannel) -> Result<(), UpdateError> {
        let sig_path = signature_path(binary);

        let signature_text = match tokio::fs::read_to_string(&sig_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if channel.requires_signature() {
                    return Err(UpdateError::signature(
                        binary,
                        format!("signature file {} not found", sig_path.display()),
                    ));
                }
                warn!(binary = %binary.display(), channel = %channel, "Accepting unsigned binary");
                return Ok(());
            }
            Err(e) => {
                return Err(UpdateError::signature(
                    binary,
                    format!("cannot read {}: {e}", sig_path.display()),
                ));
            }
        };

        // A present signature is always checked, whatever the channel.
        let Some(public_key) = self.public_key.clone() else {
            return Err(UpdateError::signature(binary, "no trusted public key in this build"));
        };

        let data = tokio::fs::read(binary)
            .await
            .map_err(|e| UpdateError::signature(binary, format!("cannot read binary: {e}")))?;

        debug!(binary = %binary.display(), bytes = data.len(), "Verifying signature");
        let outcome = tokio::task::spawn_blocking(move || {
            let signature = Signature::decode(&signature_text)
                .map_err(|e| format!("malformed signature file: {e}"))?;
            public_key
                .verify(&data, &signature, true)
                .map_err(|e| format!("verification failed: {e}"))?;
            Ok::<String, String>(signature.trusted_comment().to_string())
        })
        .await
        .map_err(|e| UpdateError::signature(binary, format!("verification task failed: {e}")))?;

        match outcome {
            Ok(trusted_comment) => {
                info!(binary = %binary.display(), %trusted_comment, "Signature verified");
                Ok(())
            }
            Err(reason) => Err(UpdateError::signature(binary, reason)),
        }
    }
}
