//! # Paytos Stealth Addresses
//!
//! High-level API for creating and recognising stealth payments.
//!
//! This crate provides:
//!
//! - **Wallet**: recipient scan/spend keys, meta-address registration
//! - **Payment**: sender-side [`AddressDeriver`]
//! - **Discovery**: recipient-side trial derivation against one event
//! - **Balance**: net holdings and history from recorded transactions
//!
//! ## Quick Start
//!
//! ```rust
//! use paytos_stealth::{AddressDeriver, MatchOutcome, StealthWallet};
//!
//! // Recipient: generate keys and publish the meta-address
//! let wallet = StealthWallet::generate().unwrap();
//! let meta = *wallet.meta_address();
//!
//! // Sender: derive a one-time address
//! let payment = AddressDeriver::new().derive(&meta).unwrap();
//!
//! // Recipient: recognise it from the published ephemeral key
//! let outcome = wallet
//!     .try_discover(
//!         &payment.ephemeral_public_key,
//!         &payment.stealth_address,
//!         Some(payment.view_tag),
//!     )
//!     .unwrap();
//! assert!(outcome.is_match());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod balance;
pub mod discovery;
pub mod payment;
pub mod wallet;

pub use balance::{aggregate_balances, BalanceAggregator, TransactionView};
pub use discovery::{
    match_with_custody, open_scan_key, recover_stealth_address, try_match, MatchOutcome, StealthMatch,
};
pub use payment::{create_stealth_payment, AddressDeriver, PaymentAnnouncement, StealthPayment};
pub use wallet::StealthWallet;
