//! secp256k1 scalar and point operations.
//!
//! Everything curve-specific lives here so the rest of the workspace deals in
//! [`CompressedPoint`], [`SecretScalar`] and plain `k256` group arithmetic.

use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::{AffinePoint, EncodedPoint, FieldBytes, NonZeroScalar, ProjectivePoint, Scalar, U256};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use paytos_core::constants::{SCALAR_SIZE, WRAPPED_PUBLIC_KEY_SIZE};
use paytos_core::error::{PaytosError, Result};
use paytos_core::types::{CompressedPoint, SecretKeyBytes};

// ═══════════════════════════════════════════════════════════════════════════════
// SECRET SCALAR
// ═══════════════════════════════════════════════════════════════════════════════

/// A non-zero secret scalar in `[1, n)`.
///
/// Wiped on drop. `Debug` never prints the value.
#[derive(Clone)]
pub struct SecretScalar(NonZeroScalar);

impl SecretScalar {
    /// Draws a uniformly random non-zero scalar from the OS RNG.
    pub fn random() -> Self {
        Self::random_with(&mut OsRng)
    }

    /// Draws a uniformly random non-zero scalar from `rng`.
    pub fn random_with<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(NonZeroScalar::random(rng))
    }

    /// Parses a big-endian scalar. Fails with `InvalidScalar` if the value is
    /// zero or not below the curve order.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SCALAR_SIZE {
            return Err(PaytosError::InvalidScalar(format!(
                "expected {} bytes, got {}",
                SCALAR_SIZE,
                bytes.len()
            )));
        }
        let mut repr = FieldBytes::clone_from_slice(bytes);
        let scalar = Option::<NonZeroScalar>::from(NonZeroScalar::from_repr(repr));
        repr.zeroize();
        scalar
            .map(Self)
            .ok_or_else(|| PaytosError::InvalidScalar("zero or not below curve order".into()))
    }

    /// Parses a small integer scalar. Handy for fixtures.
    pub fn from_u64(value: u64) -> Result<Self> {
        Option::<NonZeroScalar>::from(NonZeroScalar::new(Scalar::from(value)))
            .map(Self)
            .ok_or_else(|| PaytosError::InvalidScalar("zero".into()))
    }

    /// Wraps an already reduced scalar, rejecting zero.
    pub fn from_scalar(scalar: Scalar) -> Result<Self> {
        Option::<NonZeroScalar>::from(NonZeroScalar::new(scalar))
            .map(Self)
            .ok_or_else(|| PaytosError::InvalidScalar("zero".into()))
    }

    /// Returns `self·G`.
    pub fn public_point(&self) -> ProjectivePoint {
        ProjectivePoint::GENERATOR * *self.0
    }

    /// Returns `self·G` compressed.
    pub fn public_key(&self) -> Result<CompressedPoint> {
        compress(&self.public_point())
    }

    /// Returns the underlying scalar.
    pub fn as_scalar(&self) -> &Scalar {
        &self.0
    }

    /// Big-endian export, wiped on drop.
    pub fn to_bytes(&self) -> SecretKeyBytes {
        let scalar: Scalar = *self.0;
        let mut repr = scalar.to_bytes();
        let mut arr = [0u8; SCALAR_SIZE];
        arr.copy_from_slice(&repr);
        repr.zeroize();
        let out = SecretKeyBytes::from_array(arr);
        arr.zeroize();
        out
    }
}

impl Drop for SecretScalar {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for SecretScalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretScalar([REDACTED])")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POINT ENCODING
// ═══════════════════════════════════════════════════════════════════════════════

/// Decodes a compressed point, failing with `InvalidPoint` if the
/// x-coordinate has no square root on the curve.
pub fn decompress(point: &CompressedPoint) -> Result<ProjectivePoint> {
    let encoded = EncodedPoint::from_bytes(point.as_bytes())
        .map_err(|e| PaytosError::InvalidPoint(format!("{}: {}", point, e)))?;
    Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .map(ProjectivePoint::from)
        .ok_or_else(|| PaytosError::InvalidPoint(format!("{} is not on secp256k1", point)))
}

/// Encodes a point in compressed form. The identity has no such encoding
/// and fails with `InvalidPoint`.
pub fn compress(point: &ProjectivePoint) -> Result<CompressedPoint> {
    if *point == ProjectivePoint::IDENTITY {
        return Err(PaytosError::InvalidPoint("point at infinity".into()));
    }
    let encoded = AffinePoint::from(*point).to_encoded_point(true);
    CompressedPoint::from_bytes(encoded.as_bytes())
}

/// Parses a public key in any encoding [`CompressedPoint::parse`] accepts and
/// checks it is on secp256k1.
///
/// Uncompressed forms are validated with both coordinates, so a valid `x`
/// with a bogus `y` fails with `InvalidPoint` instead of collapsing to the
/// parity of `y`.
pub fn parse_public_key(bytes: &[u8]) -> Result<CompressedPoint> {
    // Checks length, prefix and the AnyPublicKey header
    let normalized = CompressedPoint::parse(bytes)?;
    let sec1 = if bytes.len() == WRAPPED_PUBLIC_KEY_SIZE {
        &bytes[2..]
    } else {
        bytes
    };

    let encoded = EncodedPoint::from_bytes(sec1)
        .map_err(|e| PaytosError::InvalidPoint(format!("{}: {}", normalized, e)))?;
    let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or_else(|| PaytosError::InvalidPoint(format!("{} is not on secp256k1", normalized)))?;
    compress(&ProjectivePoint::from(affine))
}

/// Hex form of [`parse_public_key`], with or without `0x`.
pub fn parse_public_key_hex(s: &str) -> Result<CompressedPoint> {
    let s = s.trim();
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))?;
    parse_public_key(&bytes)
}

// ═══════════════════════════════════════════════════════════════════════════════
// HASH TO SCALAR
// ═══════════════════════════════════════════════════════════════════════════════

/// Interprets a 32-byte digest as a big-endian integer and reduces it mod `n`.
///
/// Fails with `InvalidScalar` if the result is zero; callers regenerate
/// their ephemeral key.
pub fn hash_to_scalar(digest: &[u8; 32]) -> Result<Scalar> {
    let scalar = <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(*digest));
    if scalar == Scalar::ZERO {
        return Err(PaytosError::InvalidScalar("tweak reduced to zero".into()));
    }
    Ok(scalar)
}
