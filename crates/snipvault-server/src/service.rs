use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::store::{new_id, Cipher, CipherError, SnippetRecord, Store, StoreError};

/// Upper bound on a snippet's lifetime: 7 days.
pub const DEFAULT_MAX_TTL_SECS: i64 = 7 * 24 * 3600;
/// Lifetime used when a caller does not ask for one: 24 hours.
pub const DEFAULT_TTL_SECS: i64 = 24 * 3600;
/// Largest accepted snippet body, in bytes.
pub const MAX_TEXT_BYTES: usize = 1_048_576;

#[derive(Debug, Error)]
pub enum SnippetError {
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("expiration must be between 1 and {max} seconds")]
    InvalidTtl { max: i64 },
    /// Absent and expired are deliberately the same error.
    #[error("snippet not found")]
    NotFound,
    #[error("encryption failed")]
    Encryption,
    #[error("snippet could not be decrypted: {0}")]
    Decryption(String),
    #[error("snippet id collision: {0}")]
    DuplicateId(String),
    #[error(transparent)]
    StorageUnavailable(StoreError),
}

impl SnippetError {
    /// True for failures the caller cannot fix by changing its input.
    pub fn is_internal(&self) -> bool {
        !matches!(
            self,
            Self::InvalidInput(_) | Self::InvalidTtl { .. } | Self::NotFound
        )
    }
}

impl From<StoreError> for SnippetError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateId(id) => Self::DuplicateId(id),
            StoreError::Corrupt(reason) => Self::Decryption(reason),
            e @ StoreError::Unavailable(_) => Self::StorageUnavailable(e),
        }
    }
}

impl From<CipherError> for SnippetError {
    fn from(e: CipherError) -> Self {
        match e {
            CipherError::Encrypt => Self::Encryption,
            CipherError::Decrypt => Self::Decryption(e.to_string()),
        }
    }
}

/// Result of a successful [`SnippetService::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub id: String,
    /// Unix seconds, UTC.
    pub expires_at: i64,
}

/// A decrypted, still-live snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub text: String,
    /// Unix seconds, UTC.
    pub expires_at: i64,
}

/// Create and retrieve encrypted, self-expiring snippets.
///
/// Plaintext only exists inside a single `create` or `get` call; the store
/// sees ciphertext alone. Expiry is enforced on every read, independently of
/// the background sweep: an expired record found by `get` is deleted on the
/// spot and reported as [`SnippetError::NotFound`].
#[derive(Clone)]
pub struct SnippetService {
    cipher: Arc<Cipher>,
    store: Store,
    clock: Arc<dyn Clock>,
    max_ttl_secs: i64,
}

impl SnippetService {
    pub fn new(cipher: Arc<Cipher>, store: Store) -> Self {
        Self {
            cipher,
            store,
            clock: Arc::new(SystemClock),
            max_ttl_secs: DEFAULT_MAX_TTL_SECS,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_ttl(mut self, max_ttl_secs: i64) -> Self {
        self.max_ttl_secs = max_ttl_secs;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn create(&self, text: &str, ttl_secs: i64) -> Result<Created, SnippetError> {
        if text.is_empty() {
            return Err(SnippetError::InvalidInput("text is required"));
        }
        if text.len() > MAX_TEXT_BYTES {
            return Err(SnippetError::InvalidInput("text exceeds 1 MiB limit"));
        }
        if !(1..=self.max_ttl_secs).contains(&ttl_secs) {
            return Err(SnippetError::InvalidTtl {
                max: self.max_ttl_secs,
            });
        }

        let id = new_id();
        let ciphertext = self.cipher.encrypt(text.as_bytes())?;
        let now = self.clock.now();
        let expires_at = now + ttl_secs;

        self.store.insert(
            &id,
            &SnippetRecord {
                ciphertext,
                created_at: now,
                expires_at,
            },
        )?;

        info!(id = %id, expires_at, "created snippet");
        Ok(Created { id, expires_at })
    }

    pub fn get(&self, id: &str) -> Result<Snippet, SnippetError> {
        let Some(record) = self.store.lookup(id)? else {
            debug!(id = %id, "snippet not found");
            return Err(SnippetError::NotFound);
        };

        if record.is_expired(self.clock.now()) {
            self.store.delete(id)?;
            info!(id = %id, "lazy-evicted expired snippet");
            return Err(SnippetError::NotFound);
        }

        let plaintext = self.cipher.decrypt(&record.ciphertext)?;
        let text = String::from_utf8(plaintext)
            .map_err(|_| SnippetError::Decryption("plaintext is not valid UTF-8".into()))?;

        debug!(id = %id, "retrieved snippet");
        Ok(Snippet {
            text,
            expires_at: record.expires_at,
        })
    }
}
