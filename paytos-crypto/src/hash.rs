//! Hash functions used by the derivation.
//!
//! - SHA-256 turns the ECDH shared point into the shared secret `s`.
//! - SHA3-256 turns a stealth public key into an Aptos address.

use sha2::{Digest, Sha256};
use sha3::Sha3_256;

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA3-256 of `data`.
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    Sha3_256::digest(data).into()
}

/// SHA3-256 over the concatenation of `parts`, without copying them together.
pub fn sha3_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
