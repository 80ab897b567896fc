use std::path::Path;

use anyhow::{Context, Result};
use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use thiserror::Error;
use tracing::info;
use zeroize::ZeroizeOnDrop;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
/// Poly1305 authentication tag appended by the AEAD.
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("encryption failed")]
    Encrypt,
    #[error("ciphertext is malformed or has been tampered with")]
    Decrypt,
}

/// 32-byte ChaCha20Poly1305 key, wiped from memory on drop.
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Returns `None` unless `bytes` is exactly [`KEY_LEN`] long.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let key: [u8; KEY_LEN] = bytes.try_into().ok()?;
        Some(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Authenticated encryption for snippet payloads.
///
/// Every call to [`Cipher::encrypt`] draws a fresh random nonce and returns
/// `nonce || ciphertext || tag`, so the output is self-contained and can be
/// stored as a single blob.
pub struct Cipher {
    aead: ChaCha20Poly1305,
}

impl Cipher {
    pub fn new(key: &EncryptionKey) -> Self {
        Self {
            aead: ChaCha20Poly1305::new(Key::from_slice(key.as_bytes())),
        }
    }

    /// Load the key at `path`, or generate and persist a new one if the file
    /// does not exist yet. A key file of the wrong size is an error; it is
    /// never silently replaced.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        let key = if path.exists() {
            let bytes = std::fs::read(path)
                .with_context(|| format!("read key file: {}", path.display()))?;
            let key = EncryptionKey::from_bytes(&bytes).ok_or_else(|| {
                anyhow::anyhow!(
                    "{} is corrupt (expected {KEY_LEN} bytes, got {})",
                    path.display(),
                    bytes.len()
                )
            })?;
            info!(path = %path.display(), "loaded existing encryption key");
            key
        } else {
            let key = EncryptionKey::generate();
            write_key_file(path, &key)?;
            info!(path = %path.display(), "generated new encryption key");
            key
        };
        Ok(Self::new(&key))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        let sealed = self
            .aead
            .encrypt(&nonce, plaintext)
            .map_err(|_| CipherError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Decrypt);
        }
        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
        self.aead
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| CipherError::Decrypt)
    }
}

fn write_key_file(path: &Path, key: &EncryptionKey) -> Result<()> {
    use std::io::Write;

    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts
        .open(path)
        .with_context(|| format!("create key file: {}", path.display()))?;
    file.write_all(key.as_bytes())
        .and_then(|_| file.sync_all())
        .with_context(|| format!("write key file: {}", path.display()))
}
