use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};

/// Random bytes per identifier. 96 bits keeps collisions negligible without
/// consulting the store.
pub const ID_BYTES: usize = 12;

/// Generate a new snippet identifier: [`ID_BYTES`] from the OS CSPRNG,
/// base64url-encoded without padding (16 characters).
pub fn new_id() -> String {
    let mut bytes = [0u8; ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
