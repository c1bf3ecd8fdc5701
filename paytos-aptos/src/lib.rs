//! Aptos event source for Paytos.
//!
//! Reads stealth transfer events from the Aptos indexer GraphQL API and hands
//! them to the scanner in emission order.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod config;
mod indexer;

pub use config::{AptosConfig, MAINNET_INDEXER_URL};
pub use indexer::{asset_from_event_type, AptosEventSource};
