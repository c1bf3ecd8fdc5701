//! In-memory store implementation.
//!
//! Fast, concurrent storage for development, testing, and as the working set
//! behind [`FileStore`](crate::FileStore).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use paytos_core::error::{PaytosError, Result};
use paytos_core::traits::{CursorStore, MetaAddressStore, StealthAddressStore, TransactionStore};
use paytos_core::types::{
    AptosAddress, EphemeralKeyRecord, EventCursor, EventId, MetaAddressRecord,
    StealthAddressRecord, Transaction,
};

/// Counters describing store contents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Registered meta-addresses
    pub meta_addresses: u64,
    /// Known stealth addresses
    pub stealth_addresses: u64,
    /// Recorded ephemeral keys
    pub ephemeral_keys: u64,
    /// Recorded transactions
    pub transactions: u64,
    /// Inserts refused because the event was already recorded
    pub duplicate_events: u64,
}

/// Full store contents in a serializable form.
///
/// Meta-addresses are listed in registration order so that importing a
/// snapshot preserves scan order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Meta-addresses, oldest registration first
    pub meta_addresses: Vec<MetaAddressRecord>,
    /// Stealth addresses
    pub stealth_addresses: Vec<StealthAddressRecord>,
    /// Ephemeral key sightings
    pub ephemeral_keys: Vec<EphemeralKeyRecord>,
    /// Ownership transactions
    pub transactions: Vec<Transaction>,
    /// Scan cursors by stream
    pub cursors: BTreeMap<String, EventCursor>,
}

/// In-memory store.
///
/// Uses concurrent hash maps for lock-free reads and per-key locking on
/// writes. Event identity and stealth address are unique keys, checked and
/// claimed in a single entry operation.
pub struct MemoryStore {
    /// Meta-addresses by id, tagged with their registration sequence
    meta_addresses: DashMap<Uuid, (u64, MetaAddressRecord)>,
    /// Next registration sequence number
    next_seq: AtomicU64,
    /// Stealth addresses by id
    stealth_addresses: DashMap<Uuid, StealthAddressRecord>,
    /// Index: on-chain address -> stealth id
    address_index: DashMap<AptosAddress, Uuid>,
    /// Ephemeral keys by carrying event
    ephemeral_keys: DashMap<EventId, EphemeralKeyRecord>,
    /// Transactions by event identity
    transactions: DashMap<EventId, Transaction>,
    /// Cursors by stream name
    cursors: DashMap<String, EventCursor>,
    /// Cached statistics
    stats: RwLock<StoreStats>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            meta_addresses: DashMap::new(),
            next_seq: AtomicU64::new(0),
            stealth_addresses: DashMap::new(),
            address_index: DashMap::new(),
            ephemeral_keys: DashMap::new(),
            transactions: DashMap::new(),
            cursors: DashMap::new(),
            stats: RwLock::new(StoreStats::default()),
        }
    }

    /// Returns current statistics.
    pub fn stats(&self) -> StoreStats {
        self.stats.read().clone()
    }

    /// Returns the number of recorded transactions.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.meta_addresses.is_empty()
            && self.stealth_addresses.is_empty()
            && self.ephemeral_keys.is_empty()
            && self.transactions.is_empty()
            && self.cursors.is_empty()
    }

    /// Removes everything.
    pub fn clear(&self) {
        self.meta_addresses.clear();
        self.stealth_addresses.clear();
        self.address_index.clear();
        self.ephemeral_keys.clear();
        self.transactions.clear();
        self.cursors.clear();
        self.next_seq.store(0, Ordering::SeqCst);
        *self.stats.write() = StoreStats::default();
    }

    /// Copies the store contents out.
    pub fn snapshot(&self) -> Snapshot {
        let mut metas: Vec<(u64, MetaAddressRecord)> = self
            .meta_addresses
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        metas.sort_by_key(|(seq, _)| *seq);

        let mut transactions: Vec<Transaction> =
            self.transactions.iter().map(|e| e.value().clone()).collect();
        transactions.sort_by_key(|tx| tx.event);

        let mut ephemeral_keys: Vec<EphemeralKeyRecord> =
            self.ephemeral_keys.iter().map(|e| e.value().clone()).collect();
        ephemeral_keys.sort_by_key(|k| k.event);

        let mut stealth_addresses: Vec<StealthAddressRecord> =
            self.stealth_addresses.iter().map(|e| e.value().clone()).collect();
        stealth_addresses.sort_by_key(|s| s.created_at);

        Snapshot {
            meta_addresses: metas.into_iter().map(|(_, record)| record).collect(),
            stealth_addresses,
            ephemeral_keys,
            transactions,
            cursors: self
                .cursors
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
        }
    }

    /// Replaces the store contents with a snapshot.
    ///
    /// Fails without touching the store if the snapshot repeats an event
    /// identity or a stealth address.
    pub fn import(&self, snapshot: Snapshot) -> Result<()> {
        let mut events = std::collections::HashSet::new();
        for tx in &snapshot.transactions {
            if !events.insert(tx.event) {
                return Err(PaytosError::DuplicateEvent(tx.event));
            }
        }
        let mut addresses = std::collections::HashSet::new();
        for record in &snapshot.stealth_addresses {
            if !addresses.insert(record.address) {
                return Err(PaytosError::StoreError(format!(
                    "snapshot repeats stealth address {}",
                    record.address
                )));
            }
        }

        self.clear();

        for record in snapshot.meta_addresses {
            let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
            self.meta_addresses.insert(record.meta_id, (seq, record));
        }
        for record in snapshot.stealth_addresses {
            self.address_index.insert(record.address, record.stealth_id);
            self.stealth_addresses.insert(record.stealth_id, record);
        }
        for record in snapshot.ephemeral_keys {
            self.ephemeral_keys.insert(record.event, record);
        }
        for tx in snapshot.transactions {
            self.transactions.insert(tx.event, tx);
        }
        for (stream, cursor) in snapshot.cursors {
            self.cursors.insert(stream, cursor);
        }

        *self.stats.write() = StoreStats {
            meta_addresses: self.meta_addresses.len() as u64,
            stealth_addresses: self.stealth_addresses.len() as u64,
            ephemeral_keys: self.ephemeral_keys.len() as u64,
            transactions: self.transactions.len() as u64,
            duplicate_events: 0,
        };

        debug!(
            meta_addresses = self.meta_addresses.len(),
            transactions = self.transactions.len(),
            "Imported snapshot"
        );
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetaAddressStore for MemoryStore {
    #[instrument(skip(self, record), fields(meta_id = %record.meta_id, owner = %record.owner_id))]
    async fn insert_meta_address(&self, record: MetaAddressRecord) -> Result<()> {
        match self.meta_addresses.entry(record.meta_id) {
            Entry::Occupied(_) => Err(PaytosError::StoreError(format!(
                "meta-address {} already registered",
                record.meta_id
            ))),
            Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
                slot.insert((seq, record));
                self.stats.write().meta_addresses += 1;
                debug!(seq, "Registered meta-address");
                Ok(())
            }
        }
    }

    async fn list_meta_addresses(&self) -> Result<Vec<MetaAddressRecord>> {
        let mut records: Vec<(u64, MetaAddressRecord)> = self
            .meta_addresses
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|(seq, _)| *seq);
        Ok(records.into_iter().map(|(_, record)| record).collect())
    }

    #[instrument(skip(self))]
    async fn meta_addresses_for_owner(&self, owner_id: &str) -> Result<Vec<MetaAddressRecord>> {
        let mut records: Vec<(u64, MetaAddressRecord)> = self
            .meta_addresses
            .iter()
            .filter(|entry| entry.value().1.owner_id == owner_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(records.into_iter().map(|(_, record)| record).collect())
    }

    async fn get_meta_address(&self, meta_id: Uuid) -> Result<Option<MetaAddressRecord>> {
        Ok(self.meta_addresses.get(&meta_id).map(|entry| entry.value().1.clone()))
    }

    #[instrument(skip(self))]
    async fn delete_meta_address(&self, owner_id: &str, meta_id: Uuid) -> Result<()> {
        let removed = self
            .meta_addresses
            .remove_if(&meta_id, |_, (_, record)| record.owner_id == owner_id);

        match removed {
            Some(_) => {
                let mut stats = self.stats.write();
                stats.meta_addresses = stats.meta_addresses.saturating_sub(1);
                debug!("Deleted meta-address");
                Ok(())
            }
            None => Err(PaytosError::NotFound(format!(
                "meta-address {} for owner {}",
                meta_id, owner_id
            ))),
        }
    }
}

#[async_trait]
impl StealthAddressStore for MemoryStore {
    #[instrument(skip(self, record), fields(address = %record.address))]
    async fn upsert_stealth_address(&self, record: StealthAddressRecord) -> Result<StealthAddressRecord> {
        match self.address_index.entry(record.address) {
            Entry::Occupied(existing) => {
                let stealth_id = *existing.get();
                self.stealth_addresses
                    .get(&stealth_id)
                    .map(|entry| entry.value().clone())
                    .ok_or_else(|| {
                        PaytosError::StoreError(format!("stealth index points at missing record {}", stealth_id))
                    })
            }
            Entry::Vacant(slot) => {
                self.stealth_addresses.insert(record.stealth_id, record.clone());
                slot.insert(record.stealth_id);
                self.stats.write().stealth_addresses += 1;
                debug!(stealth_id = %record.stealth_id, "Stored stealth address");
                Ok(record)
            }
        }
    }

    async fn stealth_address_by_address(&self, address: &AptosAddress) -> Result<Option<StealthAddressRecord>> {
        let stealth_id = match self.address_index.get(address) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.stealth_addresses.get(&stealth_id).map(|e| e.value().clone()))
    }

    async fn get_stealth_address(&self, stealth_id: Uuid) -> Result<Option<StealthAddressRecord>> {
        Ok(self.stealth_addresses.get(&stealth_id).map(|e| e.value().clone()))
    }

    #[instrument(skip(self, record), fields(event = %record.event))]
    async fn record_ephemeral_key(&self, record: EphemeralKeyRecord) -> Result<bool> {
        match self.ephemeral_keys.entry(record.event) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record);
                self.stats.write().ephemeral_keys += 1;
                Ok(true)
            }
        }
    }

    async fn ephemeral_keys_for(&self, stealth_id: Uuid) -> Result<Vec<EphemeralKeyRecord>> {
        let mut records: Vec<EphemeralKeyRecord> = self
            .ephemeral_keys
            .iter()
            .filter(|entry| entry.value().stealth_id == Some(stealth_id))
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|r| r.event);
        Ok(records)
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    /// Claims the event identity and stores the transaction in one step, so
    /// concurrent inserts of the same event cannot both succeed.
    #[instrument(skip(self, tx), fields(event = %tx.event, owner = %tx.owner_id))]
    async fn insert_transaction(&self, tx: Transaction) -> Result<()> {
        match self.transactions.entry(tx.event) {
            Entry::Occupied(_) => {
                self.stats.write().duplicate_events += 1;
                debug!("Event already recorded");
                Err(PaytosError::DuplicateEvent(tx.event))
            }
            Entry::Vacant(slot) => {
                slot.insert(tx);
                self.stats.write().transactions += 1;
                debug!("Recorded transaction");
                Ok(())
            }
        }
    }

    async fn has_event(&self, event: &EventId) -> Result<bool> {
        Ok(self.transactions.contains_key(event))
    }

    #[instrument(skip(self))]
    async fn transactions_for_address(&self, address: &AptosAddress) -> Result<Vec<Transaction>> {
        let mut txs: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|entry| &entry.value().stealth_address == address)
            .map(|entry| entry.value().clone())
            .collect();
        txs.sort_by_key(|tx| tx.event);

        debug!(count = txs.len(), "Retrieved by address");
        Ok(txs)
    }

    #[instrument(skip(self))]
    async fn transactions_for_owner(&self, owner_id: &str) -> Result<Vec<Transaction>> {
        let mut txs: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|entry| entry.value().owner_id == owner_id)
            .map(|entry| entry.value().clone())
            .collect();
        txs.sort_by(|a, b| b.event.cmp(&a.event));

        debug!(count = txs.len(), "Retrieved by owner");
        Ok(txs)
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn load_cursor(&self, stream: &str) -> Result<Option<EventCursor>> {
        Ok(self.cursors.get(stream).map(|entry| *entry.value()))
    }

    async fn save_cursor(&self, stream: &str, cursor: EventCursor) -> Result<()> {
        self.cursors.insert(stream.to_string(), cursor);
        Ok(())
    }
}
