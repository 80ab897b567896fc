use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

/// Stored in redb as bincode-encoded bytes, keyed by snippet id.
/// `ciphertext` is `nonce || ChaCha20Poly1305 ciphertext || tag`; the
/// timestamps stay in the clear so the sweep can evict without decrypting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct SnippetRecord {
    pub ciphertext: Vec<u8>,
    /// Unix timestamp (seconds, UTC) when the record was inserted.
    pub created_at: i64,
    /// Unix timestamp (seconds, UTC) from which the record is expired.
    pub expires_at: i64,
}

impl SnippetRecord {
    /// A record is expired once `now` reaches `expires_at`.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}
