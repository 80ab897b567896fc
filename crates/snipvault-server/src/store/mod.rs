pub mod crypto;
pub mod db;
pub mod ids;
pub mod model;

pub use crypto::{Cipher, CipherError, EncryptionKey};
pub use db::{Store, StoreError};
pub use ids::new_id;
pub use model::SnippetRecord;
