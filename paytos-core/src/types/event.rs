//! On-chain transfer events and stream positions.

use serde::{Deserialize, Serialize};

use super::{AptosAddress, AssetType};
use crate::error::{PaytosError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT IDENTITY
// ═══════════════════════════════════════════════════════════════════════════════

/// Chain-native identity of one emitted event.
///
/// Orders by `(transaction_version, event_index)`, which is the order events
/// are emitted in. Two transactions in the same block can both emit event 0,
/// so `(block_height, event_index)` alone is not unique.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId {
    /// Ledger version of the emitting transaction
    pub transaction_version: u64,
    /// Index of the event within its transaction
    pub event_index: u64,
    /// Block the transaction landed in
    pub block_height: u64,
}

impl EventId {
    /// Creates an event identity.
    pub fn new(block_height: u64, transaction_version: u64, event_index: u64) -> Self {
        Self {
            transaction_version,
            event_index,
            block_height,
        }
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "block {} txn {} event {}",
            self.block_height, self.transaction_version, self.event_index
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CURSOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Position of the last event of the last fully handled batch.
///
/// Fetching "since" a cursor is exclusive: the event at the cursor itself has
/// already been handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventCursor {
    /// Ledger version of the last handled event
    pub transaction_version: u64,
    /// Event index of the last handled event
    pub event_index: u64,
}

impl EventCursor {
    /// Creates a cursor.
    pub fn new(transaction_version: u64, event_index: u64) -> Self {
        Self {
            transaction_version,
            event_index,
        }
    }

    /// Returns true if `event` comes strictly after this cursor.
    pub fn is_before(&self, event: &EventId) -> bool {
        (event.transaction_version, event.event_index) > (self.transaction_version, self.event_index)
    }
}

impl From<&EventId> for EventCursor {
    fn from(id: &EventId) -> Self {
        Self::new(id.transaction_version, id.event_index)
    }
}

impl std::fmt::Display for EventCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.transaction_version, self.event_index)
    }
}

impl std::str::FromStr for EventCursor {
    type Err = PaytosError;

    /// Parses `version:index`.
    fn from_str(s: &str) -> Result<Self> {
        let (version, index) = s
            .split_once(':')
            .ok_or_else(|| PaytosError::ValidationError(format!("cursor must be version:index, got {:?}", s)))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u64>()
                .map_err(|e| PaytosError::ValidationError(format!("cursor {:?}: {}", s, e)))
        };
        Ok(Self::new(parse(version)?, parse(index)?))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFER EVENT
// ═══════════════════════════════════════════════════════════════════════════════

/// A stealth transfer as emitted by the payment module.
///
/// The ephemeral key is kept as raw bytes: a malformed key must not prevent
/// the rest of the batch from being handled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    /// Chain-native identity
    pub id: EventId,
    /// Transaction hash, when the source exposes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Paying account
    pub sender: AptosAddress,
    /// Stealth address that received the funds
    pub receiver: AptosAddress,
    /// Ephemeral public key `R` as published
    #[serde(with = "hex")]
    pub ephemeral_public_key: Vec<u8>,
    /// Amount in the asset's base units
    pub value: u128,
    /// View tag, when the payment module publishes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_tag: Option<u8>,
    /// Kind of asset moved
    pub asset_type: AssetType,
    /// Token metadata/coin type, absent for the native coin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,
}
