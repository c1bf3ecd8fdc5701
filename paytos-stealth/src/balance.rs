//! Balances and history from recorded transactions.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use paytos_core::error::{PaytosError, Result};
use paytos_core::traits::{StealthAddressStore, TransactionStore};
use paytos_core::types::{
    AptosAddress, AssetType, BalanceRow, Direction, EventId, Transaction,
};

/// Groups transactions by `(asset_type, token_address)` and returns the
/// nonzero `Σ(IN) − Σ(OUT)` of each group, in group order.
pub fn aggregate_balances<'a, I>(transactions: I) -> Vec<BalanceRow>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut groups: BTreeMap<(AssetType, Option<String>), i128> = BTreeMap::new();
    for tx in transactions {
        let entry = groups
            .entry((tx.asset_type, tx.token_address.clone()))
            .or_insert(0);
        *entry = entry.saturating_add(tx.signed_amount());
    }

    groups
        .into_iter()
        .filter(|(_, balance)| *balance != 0)
        .map(|((asset_type, token_address), balance)| BalanceRow {
            asset_type,
            token_address,
            balance,
        })
        .collect()
}

/// A transaction as seen from one address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionView {
    /// Transaction id
    pub tx_id: Uuid,
    /// Paying account
    pub sender_address: AptosAddress,
    /// Stealth address involved
    pub stealth_address: AptosAddress,
    /// `OUT` when the viewer is the sender
    pub direction: Direction,
    /// Amount in base units
    pub amount: u128,
    /// Kind of asset
    pub asset_type: AssetType,
    /// Token metadata/coin type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,
    /// Event identity
    pub event: EventId,
}

impl TransactionView {
    /// Views `tx` from `viewer`.
    pub fn new(tx: &Transaction, viewer: &AptosAddress) -> Self {
        Self {
            tx_id: tx.tx_id,
            sender_address: tx.sender_address,
            stealth_address: tx.stealth_address,
            direction: tx.direction_for(viewer),
            amount: tx.amount,
            asset_type: tx.asset_type,
            token_address: tx.token_address.clone(),
            event: tx.event,
        }
    }
}

/// Read-side queries over recorded transactions.
pub struct BalanceAggregator<S: ?Sized> {
    store: Arc<S>,
}

impl<S> BalanceAggregator<S>
where
    S: TransactionStore + StealthAddressStore + ?Sized,
{
    /// Creates an aggregator over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Net balances of a stealth address, by record id.
    pub async fn balances_for_stealth(&self, stealth_id: Uuid) -> Result<Vec<BalanceRow>> {
        let record = self
            .store
            .get_stealth_address(stealth_id)
            .await?
            .ok_or_else(|| PaytosError::NotFound(format!("stealth address {}", stealth_id)))?;
        let txs = self.store.transactions_for_address(&record.address).await?;
        Ok(aggregate_balances(&txs))
    }

    /// Net balances of a stealth address, by on-chain address.
    pub async fn balances_for_address(&self, address: &AptosAddress) -> Result<Vec<BalanceRow>> {
        let record = self
            .store
            .stealth_address_by_address(address)
            .await?
            .ok_or_else(|| PaytosError::NotFound(format!("stealth address {}", address)))?;
        self.balances_for_stealth(record.stealth_id).await
    }

    /// An owner's transactions, newest first.
    pub async fn history(&self, owner_id: &str) -> Result<Vec<Transaction>> {
        self.store.transactions_for_owner(owner_id).await
    }

    /// Transactions at a stealth address as seen from that address.
    pub async fn views_for_address(&self, address: &AptosAddress) -> Result<Vec<TransactionView>> {
        let txs = self.store.transactions_for_address(address).await?;
        Ok(txs.iter().map(|tx| TransactionView::new(tx, address)).collect())
    }
}
