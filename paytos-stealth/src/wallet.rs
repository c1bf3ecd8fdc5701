//! Recipient wallet.
//!
//! The wallet holds the two secrets behind a meta-address:
//! - the scan key, which recognises payments and is sealed for the scanner
//! - the spend key, which controls the funds and is never stored

use paytos_core::error::Result;
use paytos_core::traits::{KeyCustody, MetaAddressStore};
use paytos_core::types::{AptosAddress, CompressedPoint, MetaAddress, MetaAddressRecord, SecretKeyBytes};
use paytos_crypto::{decompress, shared_secret, stealth_private_key, SecretScalar};

use crate::discovery::{recover_stealth_address, try_match, MatchOutcome, StealthMatch};

/// Scan and spend secrets of one meta-address.
pub struct StealthWallet {
    scan: SecretScalar,
    spend: SecretScalar,
    meta_address: MetaAddress,
}

impl StealthWallet {
    /// Generates a wallet with random keys.
    pub fn generate() -> Result<Self> {
        Self::from_scalars(SecretScalar::random(), SecretScalar::random())
    }

    /// Restores a wallet from exported secrets.
    pub fn from_secrets(scan: &SecretKeyBytes, spend: &SecretKeyBytes) -> Result<Self> {
        Self::from_scalars(
            SecretScalar::from_bytes(scan.as_bytes())?,
            SecretScalar::from_bytes(spend.as_bytes())?,
        )
    }

    /// Builds a wallet from scalars.
    pub fn from_scalars(scan: SecretScalar, spend: SecretScalar) -> Result<Self> {
        let meta_address = MetaAddress::new(scan.public_key()?, spend.public_key()?);
        Ok(Self {
            scan,
            spend,
            meta_address,
        })
    }

    /// Returns the meta-address for publishing.
    pub fn meta_address(&self) -> &MetaAddress {
        &self.meta_address
    }

    /// Exports the scan secret.
    pub fn scan_secret(&self) -> SecretKeyBytes {
        self.scan.to_bytes()
    }

    /// Exports the spend secret.
    pub fn spend_secret(&self) -> SecretKeyBytes {
        self.spend.to_bytes()
    }

    /// Seals the scan key and builds the record a scanner needs.
    pub async fn seal(&self, owner_id: &str, custody: &dyn KeyCustody) -> Result<MetaAddressRecord> {
        let scan_bytes = self.scan.to_bytes();
        let sealed = custody.encrypt(scan_bytes.as_bytes()).await?;
        Ok(MetaAddressRecord::new(owner_id, self.meta_address, sealed))
    }

    /// Seals the scan key and registers the meta-address in `store`.
    pub async fn register<S>(
        &self,
        owner_id: &str,
        custody: &dyn KeyCustody,
        store: &S,
    ) -> Result<MetaAddressRecord>
    where
        S: MetaAddressStore + ?Sized,
    {
        let record = self.seal(owner_id, custody).await?;
        store.insert_meta_address(record.clone()).await?;
        Ok(record)
    }

    /// Tests whether an event pays this wallet.
    pub fn try_discover(
        &self,
        ephemeral_public: &CompressedPoint,
        receiver: &AptosAddress,
        published_view_tag: Option<u8>,
    ) -> Result<MatchOutcome> {
        try_match(
            &self.scan,
            &self.meta_address.spend,
            ephemeral_public,
            receiver,
            published_view_tag,
        )
    }

    /// Recomputes the stealth address for an ephemeral key.
    pub fn recover(&self, ephemeral_public: &CompressedPoint) -> Result<StealthMatch> {
        recover_stealth_address(&self.scan, &self.meta_address.spend, ephemeral_public)
    }

    /// Computes the private key that controls the stealth address for an
    /// ephemeral key.
    pub fn stealth_private_key(&self, ephemeral_public: &CompressedPoint) -> Result<SecretKeyBytes> {
        let ephemeral = decompress(ephemeral_public)?;
        let ss = shared_secret(&self.scan, &ephemeral)?;
        Ok(stealth_private_key(&self.spend, &ss)?.to_bytes())
    }
}

impl std::fmt::Debug for StealthWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StealthWallet")
            .field("meta_address", &self.meta_address)
            .finish_non_exhaustive()
    }
}
