//! # Paytos Cryptography
//!
//! secp256k1 primitives for Paytos stealth addresses.
//!
//! This crate provides:
//!
//! - **Curve**: scalar generation, point (de)compression, hash-to-scalar
//! - **Hash**: SHA-256 over shared secrets, SHA3-256 for addresses
//! - **Address**: Aptos address of a stealth public key
//! - **View Tags**: one-byte scanning hint from the shared secret
//! - **Derivation**: ECDH shared secret, tweak, stealth public/private keys
//! - **Custody**: AES-256-GCM sealing of scan keys at rest
//!
//! ## Derivation
//!
//! ```text
//! S = r·B_scan = a_scan·R
//! s = SHA-256(x(S))          view_tag = s[0]
//! t = s mod n
//! P = B_spend + t·G          p = b_spend + t
//! address = SHA3-256(0x01 ‖ compressed(P) ‖ 0x02)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use paytos_crypto::{shared_secret, stealth_public_key, SecretScalar};
//! use paytos_crypto::address::stealth_address;
//!
//! let scan = SecretScalar::random();
//! let spend = SecretScalar::random();
//! let ephemeral = SecretScalar::random();
//!
//! // Sender: r·B_scan
//! let sender_ss = shared_secret(&ephemeral, &scan.public_point()).unwrap();
//! let p = stealth_public_key(&spend.public_point(), &sender_ss).unwrap();
//!
//! // Recipient: a_scan·R
//! let recipient_ss = shared_secret(&scan, &ephemeral.public_point()).unwrap();
//! let q = stealth_public_key(&spend.public_point(), &recipient_ss).unwrap();
//!
//! assert_eq!(stealth_address(&p), stealth_address(&q));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod address;
pub mod curve;
pub mod custody;
pub mod derive;
pub mod hash;
pub mod view_tag;

// Re-export main functions at crate root
pub use address::{addresses_match, stealth_address};
pub use curve::{
    compress, decompress, hash_to_scalar, parse_public_key, parse_public_key_hex, SecretScalar,
};
pub use custody::{AesGcmCustody, KdfParams};
pub use derive::{shared_secret, stealth_private_key, stealth_public_key, tweak, SharedSecret};
pub use hash::{sha256, sha3_256};
pub use view_tag::{compute_view_tag, verify_view_tag};
