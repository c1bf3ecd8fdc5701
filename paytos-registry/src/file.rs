//! File-backed store with persistence.
//!
//! Keeps a [`MemoryStore`] as the working set and writes a snapshot to disk.
//! Suitable for single-node deployments where durability is needed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use paytos_core::constants::STORE_FORMAT_VERSION;
use paytos_core::error::{PaytosError, Result};
use paytos_core::traits::{CursorStore, MetaAddressStore, StealthAddressStore, TransactionStore};
use paytos_core::types::{
    AptosAddress, EphemeralKeyRecord, EventCursor, EventId, MetaAddressRecord,
    StealthAddressRecord, Transaction,
};

use crate::memory::{MemoryStore, Snapshot, StoreStats};

/// File format magic bytes
const MAGIC: &[u8; 4] = b"PAYT";
/// Header: magic, version, body length
const HEADER_SIZE: usize = 4 + 1 + 8;

/// File-backed store.
///
/// Meta-address changes are written immediately. Scanner writes
/// (stealth addresses, ephemeral keys, transactions) mark the store dirty and
/// are written together with the cursor that covers them, so the file never
/// holds a cursor ahead of its transactions.
///
/// # File Format
///
/// ```text
/// magic (4 bytes): "PAYT"
/// version (1 byte): 1
/// length (8 bytes, LE): body size
/// body (variable): JSON snapshot
/// ```
pub struct FileStore {
    /// Path to the storage file
    path: PathBuf,
    /// In-memory working set
    memory: MemoryStore,
    /// Whether there are unsaved changes
    dirty: AtomicBool,
    /// Serializes writers of the file
    save_lock: Mutex<()>,
}

impl FileStore {
    /// Opens the store at `path`.
    ///
    /// If the file exists it is loaded; otherwise the store starts empty and
    /// the file is created on first save.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            memory: MemoryStore::new(),
            dirty: AtomicBool::new(false),
            save_lock: Mutex::new(()),
        };

        if fs::try_exists(&store.path).await? {
            store.load().await?;
        }

        Ok(store)
    }

    #[instrument(skip(self), fields(path = ?self.path))]
    async fn load(&self) -> Result<()> {
        let contents = fs::read(&self.path).await?;
        let snapshot = decode(&contents)?;

        info!(
            meta_addresses = snapshot.meta_addresses.len(),
            transactions = snapshot.transactions.len(),
            "Loading store from file"
        );
        self.memory.import(snapshot)?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Writes the store to disk.
    ///
    /// Writes to a temporary file, syncs it, then renames it over the target.
    #[instrument(skip(self), fields(path = ?self.path))]
    pub async fn save(&self) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        // Cleared before the snapshot so writes racing this save stay dirty.
        self.dirty.store(false, Ordering::SeqCst);

        let contents = match encode(&self.memory.snapshot()) {
            Ok(contents) => contents,
            Err(e) => {
                self.dirty.store(true, Ordering::SeqCst);
                return Err(e);
            }
        };

        if let Err(e) = self.write_atomically(&contents).await {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }

        debug!(bytes = contents.len(), "Store saved");
        Ok(())
    }

    async fn write_atomically(&self, contents: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    /// Returns true if there are unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Saves if dirty.
    pub async fn flush(&self) -> Result<()> {
        if self.is_dirty() {
            self.save().await?;
        }
        Ok(())
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the in-memory working set.
    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Returns statistics.
    pub fn stats(&self) -> StoreStats {
        self.memory.stats()
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }
}

fn encode(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(snapshot)?;

    let mut contents = Vec::with_capacity(HEADER_SIZE + body.len());
    contents.extend_from_slice(MAGIC);
    contents.push(STORE_FORMAT_VERSION);
    contents.extend_from_slice(&(body.len() as u64).to_le_bytes());
    contents.extend_from_slice(&body);
    Ok(contents)
}

fn decode(contents: &[u8]) -> Result<Snapshot> {
    if contents.len() < HEADER_SIZE {
        return Err(PaytosError::StoreError("file too short".into()));
    }

    if &contents[0..4] != MAGIC {
        return Err(PaytosError::StoreError("invalid magic bytes".into()));
    }

    let version = contents[4];
    if version != STORE_FORMAT_VERSION {
        return Err(PaytosError::VersionMismatch {
            expected: STORE_FORMAT_VERSION,
            actual: version,
        });
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&contents[5..HEADER_SIZE]);
    let body = &contents[HEADER_SIZE..];
    if u64::from_le_bytes(len_bytes) != body.len() as u64 {
        return Err(PaytosError::StoreError(format!(
            "truncated body: header says {} bytes, found {}",
            u64::from_le_bytes(len_bytes),
            body.len()
        )));
    }

    Ok(serde_json::from_slice(body)?)
}

#[async_trait]
impl MetaAddressStore for FileStore {
    async fn insert_meta_address(&self, record: MetaAddressRecord) -> Result<()> {
        self.memory.insert_meta_address(record).await?;
        self.mark_dirty();
        self.save().await
    }

    async fn list_meta_addresses(&self) -> Result<Vec<MetaAddressRecord>> {
        self.memory.list_meta_addresses().await
    }

    async fn meta_addresses_for_owner(&self, owner_id: &str) -> Result<Vec<MetaAddressRecord>> {
        self.memory.meta_addresses_for_owner(owner_id).await
    }

    async fn get_meta_address(&self, meta_id: Uuid) -> Result<Option<MetaAddressRecord>> {
        self.memory.get_meta_address(meta_id).await
    }

    async fn delete_meta_address(&self, owner_id: &str, meta_id: Uuid) -> Result<()> {
        self.memory.delete_meta_address(owner_id, meta_id).await?;
        self.mark_dirty();
        self.save().await
    }
}

#[async_trait]
impl StealthAddressStore for FileStore {
    async fn upsert_stealth_address(&self, record: StealthAddressRecord) -> Result<StealthAddressRecord> {
        let stored = self.memory.upsert_stealth_address(record).await?;
        self.mark_dirty();
        Ok(stored)
    }

    async fn stealth_address_by_address(&self, address: &AptosAddress) -> Result<Option<StealthAddressRecord>> {
        self.memory.stealth_address_by_address(address).await
    }

    async fn get_stealth_address(&self, stealth_id: Uuid) -> Result<Option<StealthAddressRecord>> {
        self.memory.get_stealth_address(stealth_id).await
    }

    async fn record_ephemeral_key(&self, record: EphemeralKeyRecord) -> Result<bool> {
        let inserted = self.memory.record_ephemeral_key(record).await?;
        if inserted {
            self.mark_dirty();
        }
        Ok(inserted)
    }

    async fn ephemeral_keys_for(&self, stealth_id: Uuid) -> Result<Vec<EphemeralKeyRecord>> {
        self.memory.ephemeral_keys_for(stealth_id).await
    }
}

#[async_trait]
impl TransactionStore for FileStore {
    async fn insert_transaction(&self, tx: Transaction) -> Result<()> {
        self.memory.insert_transaction(tx).await?;
        self.mark_dirty();
        Ok(())
    }

    async fn has_event(&self, event: &EventId) -> Result<bool> {
        self.memory.has_event(event).await
    }

    async fn transactions_for_address(&self, address: &AptosAddress) -> Result<Vec<Transaction>> {
        self.memory.transactions_for_address(address).await
    }

    async fn transactions_for_owner(&self, owner_id: &str) -> Result<Vec<Transaction>> {
        self.memory.transactions_for_owner(owner_id).await
    }
}

#[async_trait]
impl CursorStore for FileStore {
    async fn load_cursor(&self, stream: &str) -> Result<Option<EventCursor>> {
        self.memory.load_cursor(stream).await
    }

    /// Persists the cursor together with every pending scanner write.
    async fn save_cursor(&self, stream: &str, cursor: EventCursor) -> Result<()> {
        self.memory.save_cursor(stream, cursor).await?;
        self.mark_dirty();
        self.save().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use paytos_core::types::{AssetType, CompressedPoint, Direction, MetaAddress, SealedKey};
    use tempfile::tempdir;

    fn meta_record(owner: &str) -> MetaAddressRecord {
        let mut scan = [1u8; 33];
        scan[0] = 0x02;
        let mut spend = [2u8; 33];
        spend[0] = 0x03;
        MetaAddressRecord::new(
            owner,
            MetaAddress::new(
                CompressedPoint::from_bytes(&scan).unwrap(),
                CompressedPoint::from_bytes(&spend).unwrap(),
            ),
            SealedKey::new(vec![0x55; 60]),
        )
    }

    fn make_tx(version: u64) -> Transaction {
        Transaction {
            tx_id: Uuid::new_v4(),
            owner_id: "alice".into(),
            meta_id: Uuid::nil(),
            stealth_id: None,
            sender_address: AptosAddress::from_array([1; 32]),
            stealth_address: AptosAddress::from_array([2; 32]),
            event: EventId::new(3, version, 0),
            direction: Direction::In,
            amount: 42,
            asset_type: AssetType::Coin,
            token_address: None,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.payt");

        let record = meta_record("alice");
        {
            let store = FileStore::open(&path).await.unwrap();
            store.insert_meta_address(record.clone()).await.unwrap();
            store.insert_transaction(make_tx(10)).await.unwrap();
            store.save_cursor("sent", EventCursor::new(10, 0)).await.unwrap();
            assert!(!store.is_dirty());
        }

        let reopened = FileStore::open(&path).await.unwrap();
        assert_eq!(reopened.list_meta_addresses().await.unwrap(), vec![record]);
        assert!(reopened.has_event(&EventId::new(3, 10, 0)).await.unwrap());
        assert_eq!(
            reopened.load_cursor("sent").await.unwrap(),
            Some(EventCursor::new(10, 0))
        );

        // Uniqueness survives a restart
        assert!(matches!(
            reopened.insert_transaction(make_tx(10)).await,
            Err(PaytosError::DuplicateEvent(_))
        ));
    }

    #[tokio::test]
    async fn test_scanner_writes_wait_for_cursor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.payt");

        let store = FileStore::open(&path).await.unwrap();
        store.insert_transaction(make_tx(1)).await.unwrap();
        assert!(store.is_dirty());
        assert!(!path.exists());

        store.flush().await.unwrap();
        assert!(!store.is_dirty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_delete_is_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.payt");
        let record = meta_record("alice");

        let store = FileStore::open(&path).await.unwrap();
        store.insert_meta_address(record.clone()).await.unwrap();
        store.delete_meta_address("alice", record.meta_id).await.unwrap();

        let reopened = FileStore::open(&path).await.unwrap();
        assert!(reopened.list_meta_addresses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.payt");
        std::fs::write(&path, b"XXXX\x01garbage-garbage").unwrap();
        assert!(matches!(
            FileStore::open(&path).await,
            Err(PaytosError::StoreError(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_future_version() {
        let mut contents = encode(&Snapshot::default()).unwrap();
        contents[4] = STORE_FORMAT_VERSION + 1;

        let dir = tempdir().unwrap();
        let path = dir.path().join("store.payt");
        std::fs::write(&path, &contents).unwrap();
        assert!(matches!(
            FileStore::open(&path).await,
            Err(PaytosError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_body_detected() {
        let mut contents = encode(&Snapshot::default()).unwrap();
        contents.pop();
        assert!(matches!(decode(&contents), Err(PaytosError::StoreError(_))));
    }
}
