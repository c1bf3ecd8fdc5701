//! Aptos address of a stealth public key.
//!
//! ```text
//! address = SHA3-256(0x01 ‖ compressed(P) ‖ 0x02)
//! ```

use subtle::ConstantTimeEq;

use paytos_core::constants::{ADDRESS_KEY_TAG, ADDRESS_SCHEME_TAG};
use paytos_core::types::{AptosAddress, CompressedPoint};

use crate::hash::sha3_256_multi;

/// Derives the on-chain address controlled by a stealth public key.
pub fn stealth_address(stealth_public_key: &CompressedPoint) -> AptosAddress {
    let digest = sha3_256_multi(&[
        &[ADDRESS_KEY_TAG],
        stealth_public_key.as_bytes(),
        &[ADDRESS_SCHEME_TAG],
    ]);
    AptosAddress::from_array(digest)
}

/// Constant-time address comparison.
pub fn addresses_match(a: &AptosAddress, b: &AptosAddress) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
