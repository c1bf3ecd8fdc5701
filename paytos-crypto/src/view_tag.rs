//! View tags.
//!
//! The view tag is the first byte of the shared secret `s`. A recipient who
//! finishes ECDH can compare it before paying for the tweak multiplication,
//! the point addition and the address hash. A mismatch proves the event is
//! not theirs; a match is only a hint (1 in 256 for strangers) and must be
//! confirmed by full derivation.

use subtle::ConstantTimeEq;

use crate::derive::SharedSecret;

/// Computes the view tag of a shared secret.
pub fn compute_view_tag(shared_secret: &SharedSecret) -> u8 {
    shared_secret.as_bytes()[0]
}

/// Constant-time check of a published tag against a shared secret.
pub fn verify_view_tag(shared_secret: &SharedSecret, expected_tag: u8) -> bool {
    compute_view_tag(shared_secret).ct_eq(&expected_tag).into()
}
