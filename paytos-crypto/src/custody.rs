//! Scan key encryption at rest.
//!
//! A 256-bit key is stretched once from a passphrase and salt with Argon2id.
//! Each seal draws a fresh 96-bit nonce; the sealed form is
//! `nonce (12) ‖ AES-256-GCM ciphertext ‖ tag (16)`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use zeroize::{Zeroize, Zeroizing};

use paytos_core::error::{PaytosError, Result};
use paytos_core::traits::KeyCustody;
use paytos_core::types::SealedKey;

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
const KEY_SIZE: usize = 32;
const MIN_SALT_SIZE: usize = 8;

/// Argon2id cost parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory in KiB
    pub m_cost: u32,
    /// Iterations
    pub t_cost: u32,
    /// Parallel lanes
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 65536, // 64 MiB
            t_cost: 3,
            p_cost: 4,
        }
    }
}

/// AES-256-GCM [`KeyCustody`] backend.
pub struct AesGcmCustody {
    cipher: Aes256Gcm,
}

impl AesGcmCustody {
    /// Builds a custody from a raw 256-bit key.
    pub fn from_key(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Stretches `passphrase` with Argon2id using default costs.
    pub fn from_passphrase(passphrase: &str, salt: &[u8]) -> Result<Self> {
        Self::from_passphrase_with(passphrase, salt, KdfParams::default())
    }

    /// Stretches `passphrase` with Argon2id using the given costs.
    pub fn from_passphrase_with(passphrase: &str, salt: &[u8], params: KdfParams) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(PaytosError::ConfigError("custody passphrase is empty".into()));
        }
        if salt.len() < MIN_SALT_SIZE {
            return Err(PaytosError::ConfigError(format!(
                "custody salt must be at least {} bytes",
                MIN_SALT_SIZE
            )));
        }

        let argon2 = Argon2::new(
            Algorithm::Argon2id,
            Version::V0x13,
            Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_SIZE))
                .map_err(|e| PaytosError::ConfigError(format!("argon2 params: {}", e)))?,
        );

        let mut key = [0u8; KEY_SIZE];
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| PaytosError::ConfigError(format!("key derivation failed: {}", e)))?;

        let custody = Self::from_key(&key);
        key.zeroize();
        Ok(custody)
    }

    fn seal(&self, plaintext: &[u8]) -> Result<SealedKey> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| PaytosError::EncryptionError(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(SealedKey::new(sealed))
    }

    fn open(&self, sealed: &SealedKey) -> Result<Zeroizing<Vec<u8>>> {
        let bytes = sealed.as_bytes();
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(PaytosError::DecryptionError(format!(
                "sealed key too short: {} bytes",
                bytes.len()
            )));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| PaytosError::DecryptionError("wrong key or corrupted data".into()))
    }
}

impl std::fmt::Debug for AesGcmCustody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AesGcmCustody([REDACTED])")
    }
}

#[async_trait]
impl KeyCustody for AesGcmCustody {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<SealedKey> {
        self.seal(plaintext)
    }

    async fn decrypt(&self, sealed: &SealedKey) -> Result<Zeroizing<Vec<u8>>> {
        self.open(sealed)
    }
}
