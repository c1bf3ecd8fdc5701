//! Stealth payment creation (sender side).

use k256::ProjectivePoint;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use paytos_core::constants::MAX_DERIVATION_ATTEMPTS;
use paytos_core::error::{PaytosError, Result};
use paytos_core::types::{AptosAddress, CompressedPoint, MetaAddress, SecretKeyBytes};
use paytos_crypto::{
    compute_view_tag, decompress, shared_secret, stealth_address, stealth_public_key, SecretScalar,
};

/// Everything a sender needs to pay a meta-address.
///
/// `ephemeral_secret` stays with the sender; the rest is public.
#[derive(Debug)]
pub struct StealthPayment {
    /// Ephemeral secret `r`; wiped on drop
    pub ephemeral_secret: SecretKeyBytes,
    /// Ephemeral public key `R = r·G`; publish with the transfer
    pub ephemeral_public_key: CompressedPoint,
    /// One-time stealth public key `P`
    pub stealth_public_key: CompressedPoint,
    /// One-time address to send funds to
    pub stealth_address: AptosAddress,
    /// View tag (first byte of the shared secret)
    pub view_tag: u8,
}

impl StealthPayment {
    /// Returns the part of the payment that goes on chain.
    pub fn announcement(&self) -> PaymentAnnouncement {
        PaymentAnnouncement {
            ephemeral_public_key: self.ephemeral_public_key,
            stealth_address: self.stealth_address,
            view_tag: self.view_tag,
        }
    }
}

/// Public output of a derivation, handed to whoever broadcasts the transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAnnouncement {
    /// Ephemeral public key `R`
    pub ephemeral_public_key: CompressedPoint,
    /// One-time address
    pub stealth_address: AptosAddress,
    /// View tag
    pub view_tag: u8,
}

/// Derives one-time addresses from meta-addresses.
///
/// Pure and synchronous; safe to share across threads.
#[derive(Clone, Copy, Debug)]
pub struct AddressDeriver {
    max_attempts: usize,
}

impl Default for AddressDeriver {
    fn default() -> Self {
        Self {
            max_attempts: MAX_DERIVATION_ATTEMPTS,
        }
    }
}

impl AddressDeriver {
    /// Creates a deriver with the default retry bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many ephemeral keys to try before giving up.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Derives a payment with a fresh ephemeral key from the OS RNG.
    pub fn derive(&self, meta: &MetaAddress) -> Result<StealthPayment> {
        self.derive_with_rng(meta, &mut OsRng)
    }

    /// Derives a payment drawing ephemeral keys from `rng`.
    ///
    /// A zero tweak or an identity stealth point discards the ephemeral key
    /// and draws another, up to the retry bound.
    pub fn derive_with_rng<R: RngCore + CryptoRng>(
        &self,
        meta: &MetaAddress,
        rng: &mut R,
    ) -> Result<StealthPayment> {
        let (scan, spend) = decode_meta(meta)?;

        for attempt in 1..=self.max_attempts {
            let ephemeral = SecretScalar::random_with(rng);
            match derive_from_points(&scan, &spend, &ephemeral) {
                Ok(payment) => return Ok(payment),
                Err(e @ (PaytosError::InvalidScalar(_) | PaytosError::InvalidPoint(_))) => {
                    debug!(attempt, error = %e, "Degenerate derivation, drawing a new ephemeral key");
                }
                Err(e) => return Err(e),
            }
        }

        Err(PaytosError::DerivationExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Derives a payment from a caller-chosen ephemeral secret.
    ///
    /// No retry: a degenerate result is returned as `InvalidScalar` or
    /// `InvalidPoint`.
    pub fn derive_with_ephemeral(
        &self,
        meta: &MetaAddress,
        ephemeral: &SecretScalar,
    ) -> Result<StealthPayment> {
        let (scan, spend) = decode_meta(meta)?;
        derive_from_points(&scan, &spend, ephemeral)
    }
}

/// Derives a payment to `meta` with default settings.
pub fn create_stealth_payment(meta: &MetaAddress) -> Result<StealthPayment> {
    AddressDeriver::new().derive(meta)
}

fn decode_meta(meta: &MetaAddress) -> Result<(ProjectivePoint, ProjectivePoint)> {
    let scan = decompress(&meta.scan)
        .map_err(|e| PaytosError::InvalidMetaAddress(format!("scan key: {}", e)))?;
    let spend = decompress(&meta.spend)
        .map_err(|e| PaytosError::InvalidMetaAddress(format!("spend key: {}", e)))?;
    Ok((scan, spend))
}

fn derive_from_points(
    scan: &ProjectivePoint,
    spend: &ProjectivePoint,
    ephemeral: &SecretScalar,
) -> Result<StealthPayment> {
    let ss = shared_secret(ephemeral, scan)?;
    let stealth_public_key = stealth_public_key(spend, &ss)?;

    Ok(StealthPayment {
        ephemeral_secret: ephemeral.to_bytes(),
        ephemeral_public_key: ephemeral.public_key()?,
        stealth_address: stealth_address(&stealth_public_key),
        stealth_public_key,
        view_tag: compute_view_tag(&ss),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::elliptic_curve::ops::Reduce;
    use k256::{FieldBytes, Scalar, U256};
    use paytos_crypto::compress;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn fixture_meta() -> MetaAddress {
        MetaAddress::new(
            SecretScalar::from_u64(3).unwrap().public_key().unwrap(),
            SecretScalar::from_u64(5).unwrap().public_key().unwrap(),
        )
    }

    #[test]
    fn test_fixed_ephemeral_known_address() {
        let r = SecretScalar::from_u64(7).unwrap();
        let payment = AddressDeriver::new()
            .derive_with_ephemeral(&fixture_meta(), &r)
            .unwrap();

        assert_eq!(
            payment.ephemeral_public_key.to_hex(),
            "0x025cbdf0646e5db4eaa398f365f2ea7a0e3d419b7e0330e39ce92bddedcac4f9bc"
        );
        assert_eq!(
            payment.stealth_address.to_hex(),
            "0xabd5bb70886dd0640f97dac4ccd145b36c955c752116752815371bb1448a8e8c"
        );
        assert_eq!(payment.view_tag, 206);
    }

    #[test]
    fn test_fresh_addresses_are_unlinkable() {
        let meta = fixture_meta();
        let a = create_stealth_payment(&meta).unwrap();
        let b = create_stealth_payment(&meta).unwrap();
        assert_ne!(a.stealth_address, b.stealth_address);
        assert_ne!(a.ephemeral_public_key, b.ephemeral_public_key);
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let meta = fixture_meta();
        let deriver = AddressDeriver::new();
        let a = deriver
            .derive_with_rng(&meta, &mut ChaCha20Rng::seed_from_u64(42))
            .unwrap();
        let b = deriver
            .derive_with_rng(&meta, &mut ChaCha20Rng::seed_from_u64(42))
            .unwrap();
        assert_eq!(a.announcement(), b.announcement());
    }

    /// Meta-address whose stealth point for `r = 7` is the identity:
    /// `B_spend = -t·G`, so `P = B_spend + t·G = O`.
    fn identity_meta_for_seven() -> MetaAddress {
        let scan = SecretScalar::from_u64(3).unwrap();
        let r = SecretScalar::from_u64(7).unwrap();
        let ss = shared_secret(&r, &scan.public_point()).unwrap();
        let t = <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(*ss.as_bytes()));
        let spend = compress(&-(ProjectivePoint::GENERATOR * t)).unwrap();
        MetaAddress::new(scan.public_key().unwrap(), spend)
    }

    /// Yields scalar 7 on the first draw, then seeded ChaCha output.
    struct SevenFirst {
        served: usize,
        rest: ChaCha20Rng,
    }

    impl SevenFirst {
        fn new() -> Self {
            Self {
                served: 0,
                rest: ChaCha20Rng::seed_from_u64(7),
            }
        }
    }

    impl RngCore for SevenFirst {
        fn next_u32(&mut self) -> u32 {
            self.rest.next_u32()
        }

        fn next_u64(&mut self) -> u64 {
            self.rest.next_u64()
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            self.served += 1;
            if self.served == 1 {
                dest.fill(0);
                if let Some(last) = dest.last_mut() {
                    *last = 7;
                }
            } else {
                self.rest.fill_bytes(dest);
            }
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    impl CryptoRng for SevenFirst {}

    #[test]
    fn test_identity_stealth_point_rejected_without_retry() {
        let meta = identity_meta_for_seven();
        let r = SecretScalar::from_u64(7).unwrap();
        assert!(matches!(
            AddressDeriver::new().derive_with_ephemeral(&meta, &r),
            Err(PaytosError::InvalidPoint(_))
        ));
    }

    #[test]
    fn test_degenerate_first_draw_is_redrawn() {
        let meta = identity_meta_for_seven();
        let seven_g = SecretScalar::from_u64(7).unwrap().public_key().unwrap();

        // A single attempt lands on r = 7 and gives up
        let result = AddressDeriver::new()
            .max_attempts(1)
            .derive_with_rng(&meta, &mut SevenFirst::new());
        assert!(matches!(
            result,
            Err(PaytosError::DerivationExhausted { attempts: 1 })
        ));

        let mut rng = SevenFirst::new();
        let payment = AddressDeriver::new().derive_with_rng(&meta, &mut rng).unwrap();
        assert!(rng.served >= 2);
        assert_ne!(payment.ephemeral_public_key, seven_g);

        // The redrawn key still pays the meta-address
        let recovered = crate::recover_stealth_address(
            &SecretScalar::from_u64(3).unwrap(),
            &meta.spend,
            &payment.ephemeral_public_key,
        )
        .unwrap();
        assert_eq!(recovered.address, payment.stealth_address);
    }

    #[test]
    fn test_retry_bound_reported() {
        let result = AddressDeriver::new().max_attempts(0).derive(&fixture_meta());
        assert!(matches!(
            result,
            Err(PaytosError::DerivationExhausted { attempts: 0 })
        ));
    }

    #[test]
    fn test_off_curve_meta_address_rejected() {
        let mut bytes = [0u8; 33];
        bytes[0] = 0x02;
        bytes[32] = 5;
        let bad = CompressedPoint::from_bytes(&bytes).unwrap();
        let meta = MetaAddress::new(bad, fixture_meta().spend);
        assert!(matches!(
            create_stealth_payment(&meta),
            Err(PaytosError::InvalidMetaAddress(_))
        ));
    }
}
