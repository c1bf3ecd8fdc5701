//! Payment discovery (recipient side).
//!
//! Inverts [`AddressDeriver`](crate::AddressDeriver) for one meta-address and
//! one published ephemeral key.

use serde::{Deserialize, Serialize};

use paytos_core::error::{PaytosError, Result};
use paytos_core::traits::KeyCustody;
use paytos_core::types::{AptosAddress, CompressedPoint, MetaAddressRecord};
use paytos_crypto::{
    addresses_match, compute_view_tag, decompress, shared_secret, stealth_address,
    stealth_public_key, verify_view_tag, SecretScalar,
};

/// A stealth address recovered from an ephemeral key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StealthMatch {
    /// The one-time address
    pub address: AptosAddress,
    /// Its public key `P`
    pub stealth_public_key: CompressedPoint,
    /// Its view tag
    pub view_tag: u8,
}

/// Result of testing one event against one meta-address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Published view tag differs; full derivation skipped
    ViewTagMismatch,
    /// Full derivation ran and produced a different address
    NoMatch,
    /// The event pays this meta-address
    Matched(StealthMatch),
}

impl MatchOutcome {
    /// Returns true if the event pays this meta-address.
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched(_))
    }
}

/// Recomputes the stealth address a sender derived with ephemeral key `R`.
///
/// ```text
/// S' = a_scan·R,  s = SHA-256(x(S')),  P = B_spend + (s mod n)·G
/// ```
pub fn recover_stealth_address(
    scan_secret: &SecretScalar,
    spend_public: &CompressedPoint,
    ephemeral_public: &CompressedPoint,
) -> Result<StealthMatch> {
    let ephemeral = decompress(ephemeral_public)?;
    let spend = decompress(spend_public)?;
    let ss = shared_secret(scan_secret, &ephemeral)?;
    let stealth_public_key = stealth_public_key(&spend, &ss)?;
    Ok(StealthMatch {
        address: stealth_address(&stealth_public_key),
        stealth_public_key,
        view_tag: compute_view_tag(&ss),
    })
}

/// Tests whether an event with ephemeral key `R` and recipient `receiver`
/// pays the meta-address `(a_scan, B_spend)`.
///
/// With a published view tag, a mismatch right after ECDH returns
/// [`MatchOutcome::ViewTagMismatch`] without the tweak multiplication,
/// point addition or address hash. A tag match is never trusted alone.
///
/// Errors (`InvalidPoint`, `InvalidScalar`) only rule out this meta-address.
pub fn try_match(
    scan_secret: &SecretScalar,
    spend_public: &CompressedPoint,
    ephemeral_public: &CompressedPoint,
    receiver: &AptosAddress,
    published_view_tag: Option<u8>,
) -> Result<MatchOutcome> {
    let ephemeral = decompress(ephemeral_public)?;
    let ss = shared_secret(scan_secret, &ephemeral)?;

    if let Some(tag) = published_view_tag {
        if !verify_view_tag(&ss, tag) {
            return Ok(MatchOutcome::ViewTagMismatch);
        }
    }

    let spend = decompress(spend_public)?;
    let stealth_public_key = stealth_public_key(&spend, &ss)?;
    let address = stealth_address(&stealth_public_key);

    if !addresses_match(&address, receiver) {
        return Ok(MatchOutcome::NoMatch);
    }

    Ok(MatchOutcome::Matched(StealthMatch {
        address,
        stealth_public_key,
        view_tag: compute_view_tag(&ss),
    }))
}

/// Unseals a meta-address's scan key.
///
/// The key is checked against the stored scan public key, so a custody
/// backend that returns the wrong plaintext is caught as a `DecryptionError`.
pub async fn open_scan_key(
    record: &MetaAddressRecord,
    custody: &dyn KeyCustody,
) -> Result<SecretScalar> {
    let plaintext = custody.decrypt(&record.scan_private_key_sealed).await?;
    let scan = SecretScalar::from_bytes(&plaintext)
        .map_err(|e| PaytosError::DecryptionError(format!("sealed scan key: {}", e)))?;

    if scan.public_key()? != record.scan_public_key {
        return Err(PaytosError::DecryptionError(
            "sealed scan key does not belong to this meta-address".into(),
        ));
    }
    Ok(scan)
}

/// Runs one recovery attempt: unseals the scan key, tests the event and
/// drops the key before returning.
pub async fn match_with_custody(
    record: &MetaAddressRecord,
    custody: &dyn KeyCustody,
    ephemeral_public: &CompressedPoint,
    receiver: &AptosAddress,
    published_view_tag: Option<u8>,
) -> Result<MatchOutcome> {
    let scan = open_scan_key(record, custody).await?;
    try_match(
        &scan,
        &record.spend_public_key,
        ephemeral_public,
        receiver,
        published_view_tag,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::AddressDeriver;
    use paytos_core::types::MetaAddress;
    use paytos_crypto::AesGcmCustody;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    struct Recipient {
        scan: SecretScalar,
        meta: MetaAddress,
    }

    fn recipient(rng: &mut ChaCha20Rng) -> Recipient {
        let scan = SecretScalar::random_with(rng);
        let spend = SecretScalar::random_with(rng);
        let meta = MetaAddress::new(scan.public_key().unwrap(), spend.public_key().unwrap());
        Recipient { scan, meta }
    }

    #[test]
    fn test_owner_matches_with_and_without_tag() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let alice = recipient(&mut rng);
        let payment = AddressDeriver::new().derive_with_rng(&alice.meta, &mut rng).unwrap();

        for tag in [Some(payment.view_tag), None] {
            let outcome = try_match(
                &alice.scan,
                &alice.meta.spend,
                &payment.ephemeral_public_key,
                &payment.stealth_address,
                tag,
            )
            .unwrap();
            assert_eq!(
                outcome,
                MatchOutcome::Matched(StealthMatch {
                    address: payment.stealth_address,
                    stealth_public_key: payment.stealth_public_key,
                    view_tag: payment.view_tag,
                })
            );
        }
    }

    #[test]
    fn test_owner_recomputes_stored_tag() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let alice = recipient(&mut rng);
        for _ in 0..8 {
            let payment = AddressDeriver::new().derive_with_rng(&alice.meta, &mut rng).unwrap();
            let recovered =
                recover_stealth_address(&alice.scan, &alice.meta.spend, &payment.ephemeral_public_key)
                    .unwrap();
            assert_eq!(recovered.view_tag, payment.view_tag);
            assert_eq!(recovered.address, payment.stealth_address);
        }
    }

    #[test]
    fn test_no_false_positives_across_recipients() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let recipients: Vec<_> = (0..6).map(|_| recipient(&mut rng)).collect();
        let deriver = AddressDeriver::new();

        for (i, target) in recipients.iter().enumerate() {
            for _ in 0..5 {
                let payment = deriver.derive_with_rng(&target.meta, &mut rng).unwrap();
                for (j, other) in recipients.iter().enumerate() {
                    let outcome = try_match(
                        &other.scan,
                        &other.meta.spend,
                        &payment.ephemeral_public_key,
                        &payment.stealth_address,
                        None,
                    )
                    .unwrap();
                    assert_eq!(outcome.is_match(), i == j);
                }
            }
        }
    }

    #[test]
    fn test_tag_collision_still_runs_full_check() {
        // Search for a stranger whose tag collides with the owner's.
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let alice = recipient(&mut rng);
        let payment = AddressDeriver::new().derive_with_rng(&alice.meta, &mut rng).unwrap();

        let mut collided = false;
        for _ in 0..4096 {
            let stranger = recipient(&mut rng);
            let outcome = try_match(
                &stranger.scan,
                &stranger.meta.spend,
                &payment.ephemeral_public_key,
                &payment.stealth_address,
                Some(payment.view_tag),
            )
            .unwrap();
            assert!(!outcome.is_match());
            if outcome == MatchOutcome::NoMatch {
                collided = true;
                break;
            }
        }
        assert!(collided, "no view tag collision in 4096 strangers");
    }

    #[test]
    fn test_wrong_tag_short_circuits() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let alice = recipient(&mut rng);
        let payment = AddressDeriver::new().derive_with_rng(&alice.meta, &mut rng).unwrap();
        let outcome = try_match(
            &alice.scan,
            &alice.meta.spend,
            &payment.ephemeral_public_key,
            &payment.stealth_address,
            Some(payment.view_tag.wrapping_add(1)),
        )
        .unwrap();
        assert_eq!(outcome, MatchOutcome::ViewTagMismatch);
    }

    #[test]
    fn test_malformed_ephemeral_key_is_an_error() {
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        let alice = recipient(&mut rng);
        let mut bytes = [0u8; 33];
        bytes[0] = 0x02;
        bytes[32] = 5;
        let bad = CompressedPoint::from_bytes(&bytes).unwrap();
        let result = try_match(
            &alice.scan,
            &alice.meta.spend,
            &bad,
            &AptosAddress::from_array([0; 32]),
            None,
        );
        assert!(matches!(result, Err(PaytosError::InvalidPoint(_))));
    }

    #[tokio::test]
    async fn test_open_scan_key_checks_public_key() {
        let custody = AesGcmCustody::from_key(&[9u8; 32]);
        let scan = SecretScalar::from_u64(3).unwrap();
        let spend = SecretScalar::from_u64(5).unwrap();
        let meta = MetaAddress::new(scan.public_key().unwrap(), spend.public_key().unwrap());

        let sealed = custody.encrypt(scan.to_bytes().as_bytes()).await.unwrap();
        let record = MetaAddressRecord::new("alice", meta, sealed);
        let opened = open_scan_key(&record, &custody).await.unwrap();
        assert_eq!(opened.public_point(), scan.public_point());

        // Sealed spend key under a scan-key record
        let wrong = custody.encrypt(spend.to_bytes().as_bytes()).await.unwrap();
        let record = MetaAddressRecord::new("alice", meta, wrong);
        assert!(matches!(
            open_scan_key(&record, &custody).await,
            Err(PaytosError::DecryptionError(_))
        ));
    }

    #[tokio::test]
    async fn test_match_with_custody() {
        let custody = AesGcmCustody::from_key(&[9u8; 32]);
        let scan = SecretScalar::from_u64(3).unwrap();
        let spend = SecretScalar::from_u64(5).unwrap();
        let meta = MetaAddress::new(scan.public_key().unwrap(), spend.public_key().unwrap());
        let sealed = custody.encrypt(scan.to_bytes().as_bytes()).await.unwrap();
        let record = MetaAddressRecord::new("alice", meta, sealed);

        let ephemeral = SecretScalar::from_u64(7).unwrap().public_key().unwrap();
        let receiver = recover_stealth_address(&scan, &meta.spend, &ephemeral).unwrap().address;

        let outcome = match_with_custody(&record, &custody, &ephemeral, &receiver, Some(206))
            .await
            .unwrap();
        assert!(outcome.is_match());

        let other = AptosAddress::from_array([7; 32]);
        let outcome = match_with_custody(&record, &custody, &ephemeral, &other, None)
            .await
            .unwrap();
        assert_eq!(outcome, MatchOutcome::NoMatch);

        let foreign = AesGcmCustody::from_key(&[1u8; 32]);
        assert!(matches!(
            match_with_custody(&record, &foreign, &ephemeral, &receiver, None).await,
            Err(PaytosError::DecryptionError(_))
        ));
    }
}
