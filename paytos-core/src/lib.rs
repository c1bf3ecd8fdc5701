//! # Paytos Core
//!
//! Core types, errors, and traits for Paytos stealth payments on Aptos.
//!
//! This crate provides the foundational building blocks used by all other Paytos crates:
//!
//! - **Types**: Curve point encodings, Aptos addresses, meta-addresses, transfer
//!   events, ownership transactions and balance rows
//! - **Errors**: A single [`PaytosError`] taxonomy shared by every layer
//! - **Constants**: Address hashing tags, encoding sizes and scanner defaults
//! - **Traits**: The collaborator seams (event source, key custody, persistence)
//!
//! ## Example
//!
//! ```rust
//! use paytos_core::{AptosAddress, EventCursor, EventId};
//!
//! let addr = AptosAddress::parse("0x1").unwrap();
//! assert_eq!(addr.to_hex().len(), 66);
//!
//! let cursor = EventCursor::new(10, 0);
//! assert!(cursor.is_before(&EventId::new(7, 10, 1)));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::{PaytosError, Result};
pub use traits::*;
pub use types::*;
