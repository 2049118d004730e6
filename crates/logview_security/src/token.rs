//! Stream tokens
//!
//! A token is the SHA256 of the source path, so every open of the same path
//! lands on the same registry slot.

use sha2::{Digest, Sha256};

/// Compute SHA256 hash of data
pub fn sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Token naming the stream session for `source`.
pub fn stream_token(source: &str) -> String {
    sha256(source.as_bytes())
}
