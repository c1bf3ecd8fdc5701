//! Collaborator traits for Paytos.
//!
//! The scanning engine talks to the chain, to key custody and to persistence
//! only through these interfaces, so each can be swapped or mocked.

use async_trait::async_trait;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::Result;
use crate::types::{
    AptosAddress, EphemeralKeyRecord, EventCursor, EventId, MetaAddressRecord, SealedKey,
    StealthAddressRecord, Transaction, TransferEvent,
};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT SOURCE
// ═══════════════════════════════════════════════════════════════════════════════

/// A resumable, ordered stream of transfer events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetches every event of `event_type` strictly after `since`, in emission
    /// order. `None` fetches from the beginning of the stream.
    ///
    /// Fails with `EventSourceUnavailable` when the source cannot answer.
    async fn fetch_events(
        &self,
        event_type: &str,
        since: Option<&EventCursor>,
    ) -> Result<Vec<TransferEvent>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEY CUSTODY
// ═══════════════════════════════════════════════════════════════════════════════

/// Protects secret keys at rest.
#[async_trait]
pub trait KeyCustody: Send + Sync {
    /// Seals `plaintext`.
    async fn encrypt(&self, plaintext: &[u8]) -> Result<SealedKey>;

    /// Opens a sealed key. Fails with `DecryptionError` on tampered or
    /// foreign ciphertext. The plaintext is wiped when dropped.
    async fn decrypt(&self, sealed: &SealedKey) -> Result<Zeroizing<Vec<u8>>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// PERSISTENCE
// ═══════════════════════════════════════════════════════════════════════════════

/// Storage of registered meta-addresses.
#[async_trait]
pub trait MetaAddressStore: Send + Sync {
    /// Registers a meta-address.
    async fn insert_meta_address(&self, record: MetaAddressRecord) -> Result<()>;

    /// Returns every meta-address in registration order.
    async fn list_meta_addresses(&self) -> Result<Vec<MetaAddressRecord>>;

    /// Returns an owner's meta-addresses, newest first.
    async fn meta_addresses_for_owner(&self, owner_id: &str) -> Result<Vec<MetaAddressRecord>>;

    /// Looks up a meta-address by id.
    async fn get_meta_address(&self, meta_id: Uuid) -> Result<Option<MetaAddressRecord>>;

    /// Deletes a meta-address owned by `owner_id`. Fails with `NotFound`
    /// if no such meta-address belongs to that owner.
    async fn delete_meta_address(&self, owner_id: &str, meta_id: Uuid) -> Result<()>;
}

/// Storage of stealth addresses and the ephemeral keys that revealed them.
#[async_trait]
pub trait StealthAddressStore: Send + Sync {
    /// Inserts the record unless its address is already known; returns the
    /// stored record either way.
    async fn upsert_stealth_address(&self, record: StealthAddressRecord) -> Result<StealthAddressRecord>;

    /// Looks up a stealth address by its on-chain form.
    async fn stealth_address_by_address(&self, address: &AptosAddress) -> Result<Option<StealthAddressRecord>>;

    /// Looks up a stealth address by id.
    async fn get_stealth_address(&self, stealth_id: Uuid) -> Result<Option<StealthAddressRecord>>;

    /// Records an ephemeral key sighting. Returns false if one was already
    /// recorded for the same event.
    async fn record_ephemeral_key(&self, record: EphemeralKeyRecord) -> Result<bool>;

    /// Returns the ephemeral keys that resolved to a stealth address.
    async fn ephemeral_keys_for(&self, stealth_id: Uuid) -> Result<Vec<EphemeralKeyRecord>>;
}

/// Storage of ownership transactions, unique per event identity.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Inserts a transaction. Fails with `DuplicateEvent` if one already
    /// exists for `tx.event`; nothing is written in that case.
    async fn insert_transaction(&self, tx: Transaction) -> Result<()>;

    /// Returns true if a transaction exists for the event identity.
    async fn has_event(&self, event: &EventId) -> Result<bool>;

    /// Returns the transactions that involve a stealth address.
    async fn transactions_for_address(&self, address: &AptosAddress) -> Result<Vec<Transaction>>;

    /// Returns an owner's transactions, newest event first.
    async fn transactions_for_owner(&self, owner_id: &str) -> Result<Vec<Transaction>>;
}

/// Storage of the scanner's resume position, per event stream.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Loads the cursor saved for `stream`.
    async fn load_cursor(&self, stream: &str) -> Result<Option<EventCursor>>;

    /// Saves the cursor for `stream`.
    async fn save_cursor(&self, stream: &str, cursor: EventCursor) -> Result<()>;
}

/// Everything the scanner persists.
pub trait LedgerStore: MetaAddressStore + StealthAddressStore + TransactionStore + CursorStore {}

impl<T> LedgerStore for T where T: MetaAddressStore + StealthAddressStore + TransactionStore + CursorStore {}
