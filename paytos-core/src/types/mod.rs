//! Domain types for Paytos.
//!
//! - [`CompressedPoint`]: SEC1 compressed secp256k1 public key
//! - [`AptosAddress`]: 32-byte on-chain account address
//! - [`MetaAddress`]: Published (scan, spend) public key pair
//! - [`TransferEvent`]: A stealth transfer observed on chain
//! - [`Transaction`]: A recorded ownership movement

mod keys;
mod address;
mod event;
mod records;
mod transaction;

pub use keys::*;
pub use address::*;
pub use event::*;
pub use records::*;
pub use transaction::*;
