//! Persisted records: meta-addresses, stealth addresses, ephemeral keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AptosAddress, CompressedPoint, EventId, MetaAddress, SealedKey};

/// A registered meta-address with its sealed scan key.
///
/// Immutable once created; only deletion is allowed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaAddressRecord {
    /// Opaque id
    pub meta_id: Uuid,
    /// Owning account (opaque foreign reference)
    pub owner_id: String,
    /// Scan public key `B_scan`
    pub scan_public_key: CompressedPoint,
    /// Spend public key `B_spend`
    pub spend_public_key: CompressedPoint,
    /// Scan private key sealed by a `KeyCustody`
    pub scan_private_key_sealed: SealedKey,
    /// Registration time; also defines scan order
    pub created_at: DateTime<Utc>,
}

impl MetaAddressRecord {
    /// Creates a record with a fresh id and the current time.
    pub fn new(
        owner_id: impl Into<String>,
        meta: MetaAddress,
        scan_private_key_sealed: SealedKey,
    ) -> Self {
        Self {
            meta_id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            scan_public_key: meta.scan,
            spend_public_key: meta.spend,
            scan_private_key_sealed,
            created_at: Utc::now(),
        }
    }

    /// Returns the public meta-address.
    pub fn meta_address(&self) -> MetaAddress {
        MetaAddress::new(self.scan_public_key, self.spend_public_key)
    }
}

/// A one-time address known to belong to a meta-address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StealthAddressRecord {
    /// Opaque id
    pub stealth_id: Uuid,
    /// Derived on-chain address; unique
    pub address: AptosAddress,
    /// View tag, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_tag: Option<u8>,
    /// Owning meta-address
    pub meta_id: Uuid,
    /// First sighting
    pub created_at: DateTime<Utc>,
}

impl StealthAddressRecord {
    /// Creates a record with a fresh id and the current time.
    pub fn new(address: AptosAddress, view_tag: Option<u8>, meta_id: Uuid) -> Self {
        Self {
            stealth_id: Uuid::new_v4(),
            address,
            view_tag,
            meta_id,
            created_at: Utc::now(),
        }
    }
}

/// One published ephemeral key, tied to the event that carried it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralKeyRecord {
    /// Opaque id
    pub eph_id: Uuid,
    /// Ephemeral public key `R`
    pub ephemeral_public_key: CompressedPoint,
    /// Carrying event
    pub event: EventId,
    /// Transaction hash, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Stealth address it resolved to (weak reference)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stealth_id: Option<Uuid>,
    /// When the scanner saw it
    pub seen_at: DateTime<Utc>,
}

impl EphemeralKeyRecord {
    /// Creates a record with a fresh id and the current time.
    pub fn new(
        ephemeral_public_key: CompressedPoint,
        event: EventId,
        tx_hash: Option<String>,
        stealth_id: Option<Uuid>,
    ) -> Self {
        Self {
            eph_id: Uuid::new_v4(),
            ephemeral_public_key,
            event,
            tx_hash,
            stealth_id,
            seen_at: Utc::now(),
        }
    }

    /// Block height of the carrying event.
    pub fn block_height(&self) -> u64 {
        self.event.block_height
    }
}
