//! Shared secret, tweak, and stealth key derivation.
//!
//! ## Derivation Flow
//!
//! ```text
//! sender:    S = r·B_scan          recipient: S = a_scan·R
//!       ↓
//! s = SHA-256(x(S))
//!       ↓
//! t = s mod n                      (zero ⇒ regenerate r)
//!       ↓
//! P = B_spend + t·G                (identity ⇒ regenerate r)
//! p = b_spend + t                  (recipient only)
//! ```

use k256::{ProjectivePoint, Scalar};
use zeroize::{Zeroize, ZeroizeOnDrop};

use paytos_core::constants::SHARED_SECRET_SIZE;
use paytos_core::error::Result;
use paytos_core::types::CompressedPoint;

use crate::curve::{compress, hash_to_scalar, SecretScalar};
use crate::hash::sha256;

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED SECRET
// ═══════════════════════════════════════════════════════════════════════════════

/// The hashed ECDH secret `s`. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_SIZE]);

impl SharedSecret {
    /// Wraps raw secret bytes.
    pub fn from_array(bytes: [u8; SHARED_SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedSecret([REDACTED])")
    }
}

/// Computes `s = SHA-256(x(k·Q))`.
///
/// The same value comes out of `r·B_scan` on the sender side and
/// `a_scan·R` on the recipient side.
pub fn shared_secret(secret: &SecretScalar, public: &ProjectivePoint) -> Result<SharedSecret> {
    let shared_point = compress(&(*public * secret.as_scalar()))?;
    Ok(SharedSecret(sha256(shared_point.x_coordinate())))
}

// ═══════════════════════════════════════════════════════════════════════════════
// STEALTH KEYS
// ═══════════════════════════════════════════════════════════════════════════════

/// Computes the tweak `t = s mod n`. Fails with `InvalidScalar` if `t = 0`.
pub fn tweak(shared_secret: &SharedSecret) -> Result<Scalar> {
    hash_to_scalar(shared_secret.as_bytes())
}

/// Computes the stealth public key `P = B_spend + t·G`.
///
/// Fails with `InvalidScalar` for a zero tweak and `InvalidPoint` if `P` is
/// the identity.
pub fn stealth_public_key(
    spend_public: &ProjectivePoint,
    shared_secret: &SharedSecret,
) -> Result<CompressedPoint> {
    let t = tweak(shared_secret)?;
    compress(&(*spend_public + ProjectivePoint::GENERATOR * t))
}

/// Computes the stealth private key `p = b_spend + t mod n`, so `p·G = P`.
pub fn stealth_private_key(
    spend_secret: &SecretScalar,
    shared_secret: &SharedSecret,
) -> Result<SecretScalar> {
    let t = tweak(shared_secret)?;
    SecretScalar::from_scalar(*spend_secret.as_scalar() + t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::stealth_address;
    use crate::view_tag::compute_view_tag;
    use proptest::prelude::*;

    fn fixture() -> (SecretScalar, SecretScalar, SecretScalar) {
        (
            SecretScalar::from_u64(3).unwrap(),
            SecretScalar::from_u64(5).unwrap(),
            SecretScalar::from_u64(7).unwrap(),
        )
    }

    #[test]
    fn test_known_vector() {
        let (scan, spend, r) = fixture();

        let ss = shared_secret(&r, &scan.public_point()).unwrap();
        assert_eq!(
            hex::encode(ss.as_bytes()),
            "cebfe05522b886256698f6c54848aacc3aa4ac681325402d6efab78105f6a833"
        );
        assert_eq!(compute_view_tag(&ss), 206);

        let p = stealth_public_key(&spend.public_point(), &ss).unwrap();
        assert_eq!(
            hex::encode(p.as_bytes()),
            "035e74a40c3ee99abe41c26a8fbadb5e9def176f924a2d230e6ac11131dac67f2e"
        );
        assert_eq!(
            stealth_address(&p).to_hex(),
            "0xabd5bb70886dd0640f97dac4ccd145b36c955c752116752815371bb1448a8e8c"
        );

        let sk = stealth_private_key(&spend, &ss).unwrap();
        assert_eq!(
            sk.to_bytes().to_hex(),
            "0xcebfe05522b886256698f6c54848aacc3aa4ac681325402d6efab78105f6a838"
        );
    }

    #[test]
    fn test_ecdh_is_symmetric() {
        let (scan, _, r) = fixture();
        let sender = shared_secret(&r, &scan.public_point()).unwrap();
        let recipient = shared_secret(&scan, &r.public_point()).unwrap();
        assert_eq!(sender.as_bytes(), recipient.as_bytes());
    }

    #[test]
    fn test_stealth_private_key_controls_stealth_public_key() {
        let (scan, spend, r) = fixture();
        let ss = shared_secret(&scan, &r.public_point()).unwrap();
        let p = stealth_public_key(&spend.public_point(), &ss).unwrap();
        let sk = stealth_private_key(&spend, &ss).unwrap();
        assert_eq!(sk.public_key().unwrap(), p);
    }

    #[test]
    fn test_zero_tweak_rejected() {
        let ss = SharedSecret::from_array([0u8; 32]);
        assert!(tweak(&ss).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_sender_and_recipient_agree(
            scan_bytes in any::<[u8; 32]>(),
            spend_bytes in any::<[u8; 32]>(),
            eph_bytes in any::<[u8; 32]>(),
        ) {
            let (Ok(scan), Ok(spend), Ok(r)) = (
                SecretScalar::from_bytes(&scan_bytes),
                SecretScalar::from_bytes(&spend_bytes),
                SecretScalar::from_bytes(&eph_bytes),
            ) else {
                return Ok(());
            };

            let sender_ss = shared_secret(&r, &scan.public_point()).unwrap();
            let recipient_ss = shared_secret(&scan, &r.public_point()).unwrap();
            prop_assert_eq!(sender_ss.as_bytes(), recipient_ss.as_bytes());

            let sender_p = stealth_public_key(&spend.public_point(), &sender_ss).unwrap();
            let recipient_p = stealth_public_key(&spend.public_point(), &recipient_ss).unwrap();
            prop_assert_eq!(stealth_address(&sender_p), stealth_address(&recipient_p));

            let sk = stealth_private_key(&spend, &recipient_ss).unwrap();
            prop_assert_eq!(sk.public_key().unwrap(), sender_p);
        }
    }
}
