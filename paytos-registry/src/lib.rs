//! # Paytos Registry
//!
//! Storage backends for everything the scanner and the balance views persist:
//! meta-addresses with sealed scan keys, stealth addresses, ephemeral key
//! sightings, ownership transactions and the scan cursor.
//!
//! - **Memory**: Concurrent in-memory storage for development and testing
//! - **File**: A memory store persisted as a JSON snapshot for single-node use
//!
//! Both enforce the two uniqueness rules the scanner depends on: one
//! transaction per event identity and one record per stealth address.
//!
//! ## Example
//!
//! ```rust,ignore
//! use paytos_registry::MemoryStore;
//! use paytos_core::traits::TransactionStore;
//!
//! let store = MemoryStore::new();
//! store.insert_transaction(tx.clone()).await?;
//!
//! // The same event again is refused
//! assert!(store.insert_transaction(tx).await.is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod file;
mod memory;

pub use file::FileStore;
pub use memory::{MemoryStore, Snapshot, StoreStats};
