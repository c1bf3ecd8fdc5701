//! Address types for Paytos.
//!
//! - [`AptosAddress`]: a 32-byte Aptos account address (stealth or ordinary)
//! - [`MetaAddress`]: the (scan, spend) public key pair a recipient publishes

use serde::{Deserialize, Serialize};

use super::CompressedPoint;
use crate::constants::{ADDRESS_SIZE, COMPRESSED_POINT_SIZE, META_ADDRESS_PREFIX};
use crate::error::{PaytosError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// APTOS ADDRESS
// ═══════════════════════════════════════════════════════════════════════════════

/// A 32-byte Aptos account address.
///
/// Displayed in long form (`0x` + 64 lowercase hex digits). Parsing accepts
/// the short forms the chain prints for special addresses (`0x1`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AptosAddress {
    bytes: [u8; ADDRESS_SIZE],
}

impl AptosAddress {
    /// Creates an address from exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ADDRESS_SIZE {
            return Err(PaytosError::InvalidAddress(format!(
                "expected {} bytes, got {}",
                ADDRESS_SIZE,
                bytes.len()
            )));
        }

        let mut arr = [0u8; ADDRESS_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Creates from a fixed-size array.
    pub fn from_array(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self { bytes }
    }

    /// Parses a hex address, with or without `0x`, left-padding short forms.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.is_empty() || digits.len() > ADDRESS_SIZE * 2 {
            return Err(PaytosError::InvalidAddress(format!(
                "bad address length: {:?}",
                s
            )));
        }
        let padded = format!("{:0>width$}", digits.to_ascii_lowercase(), width = ADDRESS_SIZE * 2);
        let bytes = hex::decode(&padded)
            .map_err(|e| PaytosError::InvalidAddress(format!("{}: {}", s, e)))?;
        Self::from_bytes(&bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.bytes
    }

    /// Returns the long-form hex address with `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.bytes))
    }
}

impl std::fmt::Debug for AptosAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AptosAddress({})", self.to_hex())
    }
}

impl std::fmt::Display for AptosAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::str::FromStr for AptosAddress {
    type Err = PaytosError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for AptosAddress {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AptosAddress {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// META-ADDRESS
// ═══════════════════════════════════════════════════════════════════════════════

/// The public half of a recipient's stealth identity.
///
/// Senders need only this to derive a fresh stealth address per payment.
/// The text form is `st:aptos:0x<scan 33 bytes><spend 33 bytes>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaAddress {
    /// Scan public key `B_scan`; used for ECDH
    pub scan: CompressedPoint,
    /// Spend public key `B_spend`; tweaked into each stealth key
    pub spend: CompressedPoint,
}

impl MetaAddress {
    /// Creates a meta-address from its two public keys.
    pub fn new(scan: CompressedPoint, spend: CompressedPoint) -> Self {
        Self { scan, spend }
    }

    /// Encodes to the shareable text form.
    pub fn encode(&self) -> String {
        format!(
            "{}0x{}{}",
            META_ADDRESS_PREFIX,
            hex::encode(self.scan.as_bytes()),
            hex::encode(self.spend.as_bytes())
        )
    }

    /// Parses the shareable text form.
    pub fn parse(s: &str) -> Result<Self> {
        let body = s
            .trim()
            .strip_prefix(META_ADDRESS_PREFIX)
            .ok_or_else(|| {
                PaytosError::InvalidMetaAddress(format!("missing {} prefix", META_ADDRESS_PREFIX))
            })?;
        let body = body.strip_prefix("0x").unwrap_or(body);
        let bytes = hex::decode(body)
            .map_err(|e| PaytosError::InvalidMetaAddress(format!("bad hex: {}", e)))?;
        if bytes.len() != 2 * COMPRESSED_POINT_SIZE {
            return Err(PaytosError::InvalidMetaAddress(format!(
                "expected {} bytes, got {}",
                2 * COMPRESSED_POINT_SIZE,
                bytes.len()
            )));
        }

        let scan = CompressedPoint::from_bytes(&bytes[..COMPRESSED_POINT_SIZE])
            .map_err(|e| PaytosError::InvalidMetaAddress(format!("scan key: {}", e)))?;
        let spend = CompressedPoint::from_bytes(&bytes[COMPRESSED_POINT_SIZE..])
            .map_err(|e| PaytosError::InvalidMetaAddress(format!("spend key: {}", e)))?;
        Ok(Self { scan, spend })
    }
}

impl std::fmt::Display for MetaAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl std::str::FromStr for MetaAddress {
    type Err = PaytosError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
