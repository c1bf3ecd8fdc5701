//! Protocol constants for Paytos.
//!
//! Point sizes follow SEC1 for secp256k1. Address tags follow the Aptos
//! single-key authentication scheme used by the deployed payment module.

// ═══════════════════════════════════════════════════════════════════════════════
// SECP256K1 ENCODINGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Size of a SEC1 compressed point (`0x02|0x03 ‖ x`).
pub const COMPRESSED_POINT_SIZE: usize = 33;

/// Size of a SEC1 uncompressed point (`0x04 ‖ x ‖ y`).
pub const UNCOMPRESSED_POINT_SIZE: usize = 65;

/// Size of an Aptos `AnyPublicKey` wrapped secp256k1 key (`0x01 ‖ 0x41 ‖ uncompressed`).
pub const WRAPPED_PUBLIC_KEY_SIZE: usize = 2 + UNCOMPRESSED_POINT_SIZE;

/// `AnyPublicKey` variant index for secp256k1 ECDSA keys.
pub const ANY_PUBLIC_KEY_SECP256K1_VARIANT: u8 = 0x01;

/// Size of a secp256k1 scalar in bytes.
pub const SCALAR_SIZE: usize = 32;

/// Size of the hashed ECDH shared secret.
pub const SHARED_SECRET_SIZE: usize = 32;

// ═══════════════════════════════════════════════════════════════════════════════
// ADDRESS DERIVATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Size of an Aptos account address in bytes.
pub const ADDRESS_SIZE: usize = 32;

/// Tag prepended to the compressed stealth key before hashing.
pub const ADDRESS_KEY_TAG: u8 = 0x01;

/// Authentication scheme byte appended before hashing (single-key).
pub const ADDRESS_SCHEME_TAG: u8 = 0x02;

/// Size of a view tag in bytes.
pub const VIEW_TAG_SIZE: usize = 1;

/// Number of possible view tag values (2^8 = 256).
pub const VIEW_TAG_SPACE: usize = 256;

/// Upper bound on ephemeral key regeneration when a tweak or stealth point
/// degenerates. Reaching it with a working RNG is not expected.
pub const MAX_DERIVATION_ATTEMPTS: usize = 16;

/// Text prefix of an encoded meta-address.
pub const META_ADDRESS_PREFIX: &str = "st:aptos:";

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT SCANNING
// ═══════════════════════════════════════════════════════════════════════════════

/// Transfer event emitted by the deployed stealth payment module.
pub const DEFAULT_EVENT_TYPE: &str = "0xb6b406e564795b8f58ba42dd79c81a3c17e906f37638c4f83bda7d846c675ec7::payment::SentEvent<0x1::fungible_asset::Metadata>";

/// Default interval between scanner ticks.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Default bound on a single event-source fetch.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;

/// Default number of events requested per indexer page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Default cap on indexer pages read in one fetch. A longer backlog is
/// delivered over several ticks.
pub const DEFAULT_MAX_PAGES: usize = 10;

// ═══════════════════════════════════════════════════════════════════════════════
// PERSISTENCE
// ═══════════════════════════════════════════════════════════════════════════════

/// Current snapshot format version.
/// Increment when making breaking changes to serialization formats.
pub const STORE_FORMAT_VERSION: u8 = 1;
