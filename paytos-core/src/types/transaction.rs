//! Ownership transactions and balances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AptosAddress, EventId, TransferEvent};
use crate::error::{PaytosError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// Direction of a recorded movement relative to the owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Funds arrived at the stealth address
    In,
    /// Funds left the stealth address
    Out,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::In => f.write_str("IN"),
            Direction::Out => f.write_str("OUT"),
        }
    }
}

/// Kind of asset a transaction moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    /// Legacy `coin::Coin<T>`
    Coin,
    /// `fungible_asset` object
    Ft,
    /// Token object
    Nft,
}

impl AssetType {
    /// Returns the lowercase name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Coin => "coin",
            AssetType::Ft => "ft",
            AssetType::Nft => "nft",
        }
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AssetType {
    type Err = PaytosError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coin" => Ok(AssetType::Coin),
            "ft" => Ok(AssetType::Ft),
            "nft" => Ok(AssetType::Nft),
            other => Err(PaytosError::ValidationError(format!("unknown asset type {:?}", other))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTION
// ═══════════════════════════════════════════════════════════════════════════════

/// A recorded movement of funds at a stealth address.
///
/// Created exactly once per observed event that resolves to a known owner.
/// Never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Opaque id
    pub tx_id: Uuid,
    /// Owner of the matched meta-address
    pub owner_id: String,
    /// Matched meta-address
    pub meta_id: Uuid,
    /// Stealth address record, when resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stealth_id: Option<Uuid>,
    /// Paying account
    pub sender_address: AptosAddress,
    /// Stealth address involved
    pub stealth_address: AptosAddress,
    /// Idempotency key
    pub event: EventId,
    /// Movement direction relative to the owner
    pub direction: Direction,
    /// Amount in base units
    pub amount: u128,
    /// Kind of asset moved
    pub asset_type: AssetType,
    /// Token metadata/coin type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,
    /// When the transaction was recorded
    pub recorded_at: DateTime<Utc>,
}

impl Transaction {
    /// Builds the inbound transaction for a matched transfer event.
    pub fn incoming(
        event: &TransferEvent,
        owner_id: impl Into<String>,
        meta_id: Uuid,
        stealth_id: Option<Uuid>,
    ) -> Self {
        Self {
            tx_id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            meta_id,
            stealth_id,
            sender_address: event.sender,
            stealth_address: event.receiver,
            event: event.id,
            direction: Direction::In,
            amount: event.value,
            asset_type: event.asset_type,
            token_address: event.token_address.clone(),
            recorded_at: Utc::now(),
        }
    }

    /// Direction as seen by `viewer`: `OUT` when the viewer sent it.
    pub fn direction_for(&self, viewer: &AptosAddress) -> Direction {
        if &self.sender_address == viewer {
            Direction::Out
        } else {
            Direction::In
        }
    }

    /// Signed contribution of this transaction to its group's balance.
    pub fn signed_amount(&self) -> i128 {
        let amount = i128::try_from(self.amount).unwrap_or(i128::MAX);
        match self.direction {
            Direction::In => amount,
            Direction::Out => -amount,
        }
    }
}

/// Net holding of one asset at one stealth address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRow {
    /// Kind of asset
    pub asset_type: AssetType,
    /// Token metadata/coin type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,
    /// `Σ(IN) − Σ(OUT)`; never zero
    pub balance: i128,
}
