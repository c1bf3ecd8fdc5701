//! Error types for Paytos.
//!
//! One `thiserror` enum covers every layer. The scanner relies on the
//! classification helpers to decide whether a failure aborts a tick or only
//! rules out a single meta-address.

use thiserror::Error;

use crate::types::EventId;

/// Result type alias using `PaytosError`.
pub type Result<T> = std::result::Result<T, PaytosError>;

/// Main error type for all Paytos operations.
#[derive(Debug, Error)]
pub enum PaytosError {
    // ═══════════════════════════════════════════════════════════════════════════
    // CURVE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Bytes do not encode a valid non-identity secp256k1 point.
    #[error("Invalid curve point: {0}")]
    InvalidPoint(String),

    /// A scalar is zero or not below the curve order.
    #[error("Invalid scalar: {0}")]
    InvalidScalar(String),

    /// Every ephemeral key drawn produced a degenerate tweak or stealth point.
    #[error("Stealth derivation gave up after {attempts} attempts")]
    DerivationExhausted {
        /// Number of ephemeral keys tried
        attempts: usize,
    },

    // ═══════════════════════════════════════════════════════════════════════════
    // KEY CUSTODY ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Ciphertext was tampered with, truncated, or sealed under another key.
    #[error("Decryption failed: {0}")]
    DecryptionError(String),

    /// Sealing key material failed.
    #[error("Encryption failed: {0}")]
    EncryptionError(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // ADDRESS ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Invalid meta-address format or content.
    #[error("Invalid meta-address: {0}")]
    InvalidMetaAddress(String),

    /// Invalid on-chain address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // EVENT SOURCE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// The event source could not be reached or answered with an error.
    #[error("Event source unavailable: {0}")]
    EventSourceUnavailable(String),

    /// An event could not be decoded.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // STORAGE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// A transaction for this event identity is already recorded.
    #[error("Duplicate event: {0}")]
    DuplicateEvent(EventId),

    /// Requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store is unreadable or corrupted.
    #[error("Store error: {0}")]
    StoreError(String),

    /// Snapshot format version mismatch.
    #[error("Format version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Version this build writes
        expected: u8,
        /// Version found on disk
        actual: u8,
    },

    /// File I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    // ═══════════════════════════════════════════════════════════════════════════
    // SERIALIZATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid hex encoding.
    #[error("Invalid hex encoding: {0}")]
    HexError(#[from] hex::FromHexError),

    // ═══════════════════════════════════════════════════════════════════════════
    // NETWORK ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Connection timeout.
    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // VALIDATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Input validation failed.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Internal invariant violation (should never happen).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl PaytosError {
    /// Returns true if this error is recoverable (can retry on a later tick).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PaytosError::EventSourceUnavailable(_)
                | PaytosError::HttpError(_)
                | PaytosError::ConnectionTimeout(_)
        )
    }

    /// Returns true if this is a cryptographic error.
    pub fn is_crypto_error(&self) -> bool {
        matches!(
            self,
            PaytosError::InvalidPoint(_)
                | PaytosError::InvalidScalar(_)
                | PaytosError::DerivationExhausted { .. }
                | PaytosError::DecryptionError(_)
                | PaytosError::EncryptionError(_)
        )
    }

    /// Returns true if the failure only rules out one meta-address for one
    /// event and must not fail the surrounding batch.
    pub fn is_per_key_failure(&self) -> bool {
        matches!(
            self,
            PaytosError::DecryptionError(_)
                | PaytosError::InvalidPoint(_)
                | PaytosError::InvalidScalar(_)
        )
    }

    /// Returns true if this is a validation error.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            PaytosError::ValidationError(_)
                | PaytosError::InvalidMetaAddress(_)
                | PaytosError::InvalidAddress(_)
                | PaytosError::InvalidEvent(_)
                | PaytosError::VersionMismatch { .. }
        )
    }
}
