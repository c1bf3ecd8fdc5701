//! Key types for Paytos.
//!
//! - [`CompressedPoint`]: 33-byte SEC1 compressed secp256k1 public key
//! - [`SecretKeyBytes`]: 32-byte secret scalar encoding, zeroized on drop
//! - [`SealedKey`]: opaque ciphertext produced by a key custody backend
//!
//! Curve membership is not checked here; `paytos-crypto` rejects points that
//! do not decompress.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{
    ANY_PUBLIC_KEY_SECP256K1_VARIANT, COMPRESSED_POINT_SIZE, SCALAR_SIZE,
    UNCOMPRESSED_POINT_SIZE, WRAPPED_PUBLIC_KEY_SIZE,
};
use crate::error::{PaytosError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// PUBLIC KEY
// ═══════════════════════════════════════════════════════════════════════════════

/// SEC1 compressed secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompressedPoint {
    bytes: [u8; COMPRESSED_POINT_SIZE],
}

impl CompressedPoint {
    /// Creates a compressed point from exactly 33 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != COMPRESSED_POINT_SIZE {
            return Err(PaytosError::InvalidPoint(format!(
                "expected {} bytes, got {}",
                COMPRESSED_POINT_SIZE,
                bytes.len()
            )));
        }
        if bytes[0] != 0x02 && bytes[0] != 0x03 {
            return Err(PaytosError::InvalidPoint(format!(
                "bad compressed prefix 0x{:02x}",
                bytes[0]
            )));
        }
        let mut arr = [0u8; COMPRESSED_POINT_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Parses any public key encoding found on chain or in wallets.
    ///
    /// Accepts:
    /// - 33-byte SEC1 compressed
    /// - 65-byte SEC1 uncompressed (`0x04 ‖ x ‖ y`)
    /// - 67-byte Aptos `AnyPublicKey` (`0x01 ‖ 0x41 ‖ uncompressed`)
    ///
    /// Only the encoding is checked here. Uncompressed forms keep just the
    /// parity of `y`; `paytos_crypto::parse_public_key` validates the point.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            COMPRESSED_POINT_SIZE => Self::from_bytes(bytes),
            UNCOMPRESSED_POINT_SIZE => Self::compress_uncompressed(bytes),
            WRAPPED_PUBLIC_KEY_SIZE => {
                if bytes[0] != ANY_PUBLIC_KEY_SECP256K1_VARIANT
                    || bytes[1] as usize != UNCOMPRESSED_POINT_SIZE
                {
                    return Err(PaytosError::InvalidPoint(
                        "unsupported AnyPublicKey variant".into(),
                    ));
                }
                Self::compress_uncompressed(&bytes[2..])
            }
            n => Err(PaytosError::InvalidPoint(format!(
                "unsupported public key length {}",
                n
            ))),
        }
    }

    /// Parses a hex public key in any accepted encoding, with or without `0x`.
    pub fn parse_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        Self::parse(&bytes)
    }

    fn compress_uncompressed(bytes: &[u8]) -> Result<Self> {
        if bytes[0] != 0x04 {
            return Err(PaytosError::InvalidPoint(format!(
                "bad uncompressed prefix 0x{:02x}",
                bytes[0]
            )));
        }
        let y_is_odd = bytes[UNCOMPRESSED_POINT_SIZE - 1] & 1 == 1;
        let mut arr = [0u8; COMPRESSED_POINT_SIZE];
        arr[0] = if y_is_odd { 0x03 } else { 0x02 };
        arr[1..].copy_from_slice(&bytes[1..=SCALAR_SIZE]);
        Ok(Self { bytes: arr })
    }

    /// Returns the raw compressed bytes.
    pub fn as_bytes(&self) -> &[u8; COMPRESSED_POINT_SIZE] {
        &self.bytes
    }

    /// Returns the x-coordinate (compressed encoding without its prefix).
    pub fn x_coordinate(&self) -> &[u8] {
        &self.bytes[1..]
    }

    /// Returns the hex-encoded compressed point with `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.bytes))
    }
}

impl std::fmt::Debug for CompressedPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CompressedPoint({}...{})",
            hex::encode(&self.bytes[..4]),
            hex::encode(&self.bytes[COMPRESSED_POINT_SIZE - 4..])
        )
    }
}

impl std::fmt::Display for CompressedPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::str::FromStr for CompressedPoint {
    type Err = PaytosError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_hex(s)
    }
}

impl Serialize for CompressedPoint {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CompressedPoint {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SECRET KEY
// ═══════════════════════════════════════════════════════════════════════════════

/// Big-endian encoding of a secret scalar.
///
/// Zeroized on drop. Never expose this in logs or error messages.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKeyBytes {
    bytes: [u8; SCALAR_SIZE],
}

impl SecretKeyBytes {
    /// Creates secret key bytes from exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SCALAR_SIZE {
            return Err(PaytosError::InvalidScalar(format!(
                "expected {} bytes, got {}",
                SCALAR_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; SCALAR_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Creates secret key bytes from a fixed-size array.
    pub fn from_array(bytes: [u8; SCALAR_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; SCALAR_SIZE] {
        &self.bytes
    }

    /// Hex-encodes the secret. Only for explicit export to the key owner.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.bytes))
    }

    /// Parses a hex secret, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        let mut bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))?;
        let result = Self::from_bytes(&bytes);
        bytes.zeroize();
        result
    }
}

impl std::fmt::Debug for SecretKeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKeyBytes([REDACTED])")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SEALED KEY
// ═══════════════════════════════════════════════════════════════════════════════

/// Opaque ciphertext of a secret key, as produced by a `KeyCustody`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKey(#[serde(with = "hex")] Vec<u8>);

impl SealedKey {
    /// Wraps raw ciphertext bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the raw ciphertext bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the ciphertext length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the ciphertext is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SealedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SealedKey({} bytes)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    // 7·G on secp256k1
    const SEVEN_G_X: &str = "5cbdf0646e5db4eaa398f365f2ea7a0e3d419b7e0330e39ce92bddedcac4f9bc";
    const SEVEN_G_Y: &str = "6aebca40ba255960a3178d6d861a54dba813d0b813fde7b5a5082628087264da";

    fn seven_g_uncompressed() -> Vec<u8> {
        let mut bytes = vec![0x04];
        bytes.extend(hex::decode(SEVEN_G_X).unwrap());
        bytes.extend(hex::decode(SEVEN_G_Y).unwrap());
        bytes
    }

    #[test]
    fn test_compress_uncompressed_even_y() {
        let point = CompressedPoint::parse(&seven_g_uncompressed()).unwrap();
        // y ends in 0xda, even
        assert_eq!(point.as_bytes()[0], 0x02);
        assert_eq!(hex::encode(point.x_coordinate()), SEVEN_G_X);
    }

    #[test]
    fn test_parse_any_public_key_wrapping() {
        let mut wrapped = vec![0x01, 0x41];
        wrapped.extend(seven_g_uncompressed());
        let a = CompressedPoint::parse(&wrapped).unwrap();
        let b = CompressedPoint::parse(&seven_g_uncompressed()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hex_roundtrip() {
        let point = CompressedPoint::parse(&seven_g_uncompressed()).unwrap();
        let parsed: CompressedPoint = point.to_hex().parse().unwrap();
        assert_eq!(point, parsed);

        let json = serde_json::to_string(&point).unwrap();
        let restored: CompressedPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(point, restored);
    }

    #[test_case(&[0x02; 32] ; "too short")]
    #[test_case(&[0x05; 33] ; "bad compressed prefix")]
    #[test_case(&[0x02; 65] ; "bad uncompressed prefix")]
    #[test_case(&[0x00; 67] ; "unknown wrapped variant")]
    #[test_case(&[] ; "empty")]
    fn test_parse_rejects(bytes: &[u8]) {
        assert!(matches!(
            CompressedPoint::parse(bytes),
            Err(PaytosError::InvalidPoint(_))
        ));
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = SecretKeyBytes::from_array([0x42; 32]);
        let debug = format!("{:?}", secret);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("42"));
    }

    #[test]
    fn test_secret_from_hex() {
        let secret = SecretKeyBytes::from_hex(&format!("0x{}", "07".repeat(32))).unwrap();
        assert_eq!(secret.as_bytes(), &[7u8; 32]);
        assert!(SecretKeyBytes::from_hex("0x07").is_err());
    }

    #[test]
    fn test_sealed_key_serde_is_hex() {
        let sealed = SealedKey::new(vec![0xde, 0xad]);
        assert_eq!(serde_json::to_string(&sealed).unwrap(), "\"dead\"");
        assert_eq!(format!("{:?}", sealed), "SealedKey(2 bytes)");
    }
}
