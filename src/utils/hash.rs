// src/utils/hash.rs

//! Content hashing.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of `text`.
pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
