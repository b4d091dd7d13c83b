//! Minisign signatures for tests.
//!
//! Produces keys and detached signatures in minisign's legacy `Ed` layout,
//! where the file content itself is signed:
//!
//! ```text
//! untrusted comment: <text>
//! base64("Ed" || key_id || ed25519(content))
//! trusted comment: <text>
//! base64(ed25519(signature || trusted comment))
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static KEY_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct TestSigner {
    key: SigningKey,
    key_id: [u8; 8],
}

impl TestSigner {
    /// A fresh key pair, distinct from every other one generated in this process.
    pub fn generate() -> Self {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
        let mut hasher = Sha256::new();
        hasher.update(KEY_COUNTER.fetch_add(1, Ordering::SeqCst).to_le_bytes());
        hasher.update(nanos.to_le_bytes());
        hasher.update(std::process::id().to_le_bytes());
        let seed: [u8; 32] = hasher.finalize().into();

        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&Sha256::digest(seed)[..8]);
        Self {
            key: SigningKey::from_bytes(&seed),
            key_id,
        }
    }

    /// The bare base64 public key line.
    pub fn public_key_base64(&self) -> String {
        let mut raw = Vec::with_capacity(42);
        raw.extend_from_slice(b"Ed");
        raw.extend_from_slice(&self.key_id);
        raw.extend_from_slice(self.key.verifying_key().as_bytes());
        STANDARD.encode(raw)
    }

    /// The public key as a `.pub` file body.
    pub fn public_key_text(&self) -> String {
        format!(
            "untrusted comment: minisign public key {}\n{}\n",
            hex::encode_upper(self.key_id),
            self.public_key_base64()
        )
    }

    /// Signature file body for `content`.
    pub fn sign(&self, content: &[u8], trusted_comment: &str) -> String {
        let signature = self.key.sign(content).to_bytes();

        let mut sig_line = Vec::with_capacity(74);
        sig_line.extend_from_slice(b"Ed");
        sig_line.extend_from_slice(&self.key_id);
        sig_line.extend_from_slice(&signature);

        let mut global = Vec::with_capacity(64 + trusted_comment.len());
        global.extend_from_slice(&signature);
        global.extend_from_slice(trusted_comment.as_bytes());
        let global_signature = self.key.sign(&global).to_bytes();

        format!(
            "untrusted comment: signature from test key\n{}\ntrusted comment: {}\n{}\n",
            STANDARD.encode(sig_line),
            trusted_comment,
            STANDARD.encode(global_signature)
        )
    }

    /// Write `<path>.minisig` for the current content of `path`.
    pub fn sign_file(&self, path: &Path) {
        let content = std::fs::read(path).expect("read file to sign");
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let body = self.sign(&content, &format!("timestamp:0\tfile:{name}"));
        std::fs::write(crate::upgrade::signature::signature_path(path), body)
            .expect("write signature file");
    }
}
