//! # Paytos Scanner
//!
//! Watches the transfer-event stream and records payments that belong to
//! registered meta-addresses.
//!
//! ## Features
//!
//! - **Resumable**: the cursor is explicit state, persisted after each fully
//!   handled batch
//! - **Idempotent**: at most one transaction per event identity
//! - **View tag filtering**: a published tag rules out most meta-addresses
//!   right after the ECDH step
//! - **Concurrent matching**: optional parallel trial derivation across
//!   meta-addresses
//!
//! ## Example
//!
//! ```rust,ignore
//! use paytos_scanner::{EventScanner, ScannerConfig};
//!
//! let scanner = EventScanner::new(source, custody, store, ScannerConfig::new());
//!
//! // One tick from the saved cursor
//! let report = scanner.scan_once().await?;
//! println!("recorded {} payments", report.recorded.len());
//!
//! // Or poll forever until shutdown
//! scanner.run(shutdown_rx).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use paytos_core::constants::{DEFAULT_EVENT_TYPE, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_SECS};
use paytos_core::error::{PaytosError, Result};
use paytos_core::traits::{EventSource, KeyCustody, LedgerStore};
use paytos_core::types::{
    AptosAddress, CompressedPoint, EphemeralKeyRecord, EventCursor, MetaAddressRecord, StealthAddressRecord,
    Transaction, TransferEvent,
};
use paytos_crypto::parse_public_key;
use paytos_stealth::{match_with_custody, open_scan_key, try_match, MatchOutcome, StealthMatch};

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Scanner configuration.
#[derive(Clone, Debug)]
pub struct ScannerConfig {
    /// Time between tick starts
    pub interval: Duration,
    /// Bound on one event-source fetch
    pub fetch_timeout: Duration,
    /// Fully qualified transfer event type
    pub event_type: String,
    /// Run trial derivation for all meta-addresses of an event concurrently
    pub parallel_matching: bool,
    /// Use published view tags to skip full derivation
    pub use_view_tags: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            event_type: DEFAULT_EVENT_TYPE.to_string(),
            parallel_matching: false,
            use_view_tags: true,
        }
    }
}

impl ScannerConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tick interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the fetch timeout.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Sets the event type to scan.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    /// Enables concurrent matching across meta-addresses.
    pub fn parallel_matching(mut self) -> Self {
        self.parallel_matching = true;
        self
    }

    /// Ignores published view tags; every meta-address gets full derivation.
    pub fn without_view_tags(mut self) -> Self {
        self.use_view_tags = false;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATE & STATISTICS
// ═══════════════════════════════════════════════════════════════════════════════

/// Where the scanner is in its loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScannerState {
    /// Waiting for the next tick
    Idle,
    /// Fetching events
    Polling,
    /// Matching a fetched batch
    Matching,
    /// Shut down
    Stopped,
}

/// Counters for one tick, or accumulated across ticks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Events returned by the source
    pub events_seen: u64,
    /// Events already recorded
    pub duplicates_skipped: u64,
    /// Events whose ephemeral key is not a curve point
    pub malformed_events: u64,
    /// Meta-addresses ruled out by the view tag alone
    pub view_tag_rejections: u64,
    /// Meta-addresses that went through full derivation
    pub full_derivations: u64,
    /// Transactions recorded
    pub matches: u64,
    /// Meta-addresses skipped because of a key or point failure
    pub per_key_failures: u64,
    /// Wall time in milliseconds
    pub duration_ms: u64,
}

impl ScanStats {
    /// Adds another set of counters to this one.
    pub fn merge(&mut self, other: &ScanStats) {
        self.events_seen += other.events_seen;
        self.duplicates_skipped += other.duplicates_skipped;
        self.malformed_events += other.malformed_events;
        self.view_tag_rejections += other.view_tag_rejections;
        self.full_derivations += other.full_derivations;
        self.matches += other.matches;
        self.per_key_failures += other.per_key_failures;
        self.duration_ms += other.duration_ms;
    }

    /// Share of trial derivations the view tag short-circuited (0-100).
    pub fn filter_efficiency(&self) -> f64 {
        let trials = self.view_tag_rejections + self.full_derivations;
        if trials == 0 {
            return 0.0;
        }
        (self.view_tag_rejections as f64 / trials as f64) * 100.0
    }

    fn record(&mut self, outcome: &MatchOutcome) {
        match outcome {
            MatchOutcome::ViewTagMismatch => self.view_tag_rejections += 1,
            MatchOutcome::NoMatch | MatchOutcome::Matched(_) => self.full_derivations += 1,
        }
    }
}

/// Result of one tick.
#[derive(Clone, Debug)]
pub struct TickReport {
    /// Cursor to resume from: the last event of the batch, or the input
    /// cursor when the batch was empty
    pub next_cursor: Option<EventCursor>,
    /// Transactions recorded in this tick
    pub recorded: Vec<Transaction>,
    /// Counters for this tick
    pub stats: ScanStats,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCANNER
// ═══════════════════════════════════════════════════════════════════════════════

/// Event scanner.
///
/// One instance drives one event stream. Ticks never overlap: [`run`](Self::run)
/// awaits each tick before the next timer firing.
pub struct EventScanner<S: ?Sized> {
    source: Arc<dyn EventSource>,
    custody: Arc<dyn KeyCustody>,
    store: Arc<S>,
    config: ScannerConfig,
    state: RwLock<ScannerState>,
    totals: RwLock<ScanStats>,
}

impl<S> EventScanner<S>
where
    S: LedgerStore + ?Sized,
{
    /// Creates a scanner.
    pub fn new(
        source: Arc<dyn EventSource>,
        custody: Arc<dyn KeyCustody>,
        store: Arc<S>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            source,
            custody,
            store,
            config,
            state: RwLock::new(ScannerState::Idle),
            totals: RwLock::new(ScanStats::default()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Returns the current state.
    pub fn state(&self) -> ScannerState {
        *self.state.read()
    }

    /// Returns counters accumulated over every tick so far.
    pub fn stats(&self) -> ScanStats {
        self.totals.read().clone()
    }

    fn set_state(&self, state: ScannerState) {
        *self.state.write() = state;
    }

    /// Fetches and handles every event after `cursor`.
    ///
    /// Nothing is persisted about the cursor here; the caller owns it. On
    /// error the batch is abandoned and `cursor` remains the resume point.
    #[instrument(skip(self), fields(event_type = %self.config.event_type))]
    pub async fn poll(&self, cursor: Option<EventCursor>) -> Result<TickReport> {
        let start = Instant::now();
        self.set_state(ScannerState::Polling);

        let fetched = tokio::time::timeout(
            self.config.fetch_timeout,
            self.source.fetch_events(&self.config.event_type, cursor.as_ref()),
        )
        .await;

        let mut events = match fetched {
            Ok(Ok(events)) => events,
            Ok(Err(e)) => {
                self.set_state(ScannerState::Idle);
                return Err(e);
            }
            Err(_) => {
                self.set_state(ScannerState::Idle);
                return Err(PaytosError::EventSourceUnavailable(format!(
                    "fetch timed out after {:?}",
                    self.config.fetch_timeout
                )));
            }
        };

        if let Some(cursor) = cursor {
            events.retain(|event| cursor.is_before(&event.id));
        }
        events.sort_by_key(|event| event.id);

        self.set_state(ScannerState::Matching);
        let result = self.handle_batch(&events).await;
        self.set_state(ScannerState::Idle);

        let (recorded, mut stats) = result?;
        stats.duration_ms = start.elapsed().as_millis() as u64;

        let next_cursor = events.last().map(|event| EventCursor::from(&event.id)).or(cursor);

        self.totals.write().merge(&stats);
        if stats.events_seen > 0 {
            info!(
                events = stats.events_seen,
                recorded = recorded.len(),
                duplicates = stats.duplicates_skipped,
                view_tag_rejections = stats.view_tag_rejections,
                per_key_failures = stats.per_key_failures,
                duration_ms = stats.duration_ms,
                "Batch handled"
            );
        } else {
            debug!("No new events");
        }

        Ok(TickReport {
            next_cursor,
            recorded,
            stats,
        })
    }

    /// Polls once from `cursor` and persists the new cursor for the stream.
    pub async fn tick(&self, cursor: Option<EventCursor>) -> Result<TickReport> {
        let report = self.poll(cursor).await?;
        if let Some(next) = report.next_cursor {
            if Some(next) != cursor {
                self.store.save_cursor(&self.config.event_type, next).await?;
            }
        }
        Ok(report)
    }

    /// Runs one tick from the saved cursor.
    pub async fn scan_once(&self) -> Result<TickReport> {
        let cursor = self.store.load_cursor(&self.config.event_type).await?;
        self.tick(cursor).await
    }

    /// Ticks at the configured interval until `shutdown` turns true or its
    /// sender is dropped.
    ///
    /// Tick failures are logged and retried from the same cursor on the next
    /// tick. Missed ticks are delayed, never burst.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut cursor = self.store.load_cursor(&self.config.event_type).await?;
        info!(
            event_type = %self.config.event_type,
            cursor = ?cursor,
            interval_secs = self.config.interval.as_secs_f64(),
            "Scanner started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }

            match self.tick(cursor).await {
                Ok(report) => cursor = report.next_cursor,
                Err(e) if e.is_recoverable() => {
                    warn!(error = %e, cursor = ?cursor, "Event source unavailable, retrying next tick");
                }
                Err(e) => {
                    error!(error = %e, cursor = ?cursor, "Tick failed, retrying next tick");
                }
            }
        }

        self.set_state(ScannerState::Stopped);
        info!(cursor = ?cursor, "Scanner stopped");
        Ok(())
    }

    async fn handle_batch(&self, events: &[TransferEvent]) -> Result<(Vec<Transaction>, ScanStats)> {
        let mut stats = ScanStats::default();
        let mut recorded = Vec::new();
        if events.is_empty() {
            return Ok((recorded, stats));
        }

        let records = self.store.list_meta_addresses().await?;
        debug!(meta_addresses = records.len(), events = events.len(), "Matching batch");

        for event in events {
            stats.events_seen += 1;

            if self.store.has_event(&event.id).await? {
                stats.duplicates_skipped += 1;
                debug!(event = %event.id, "Already recorded, skipping");
                continue;
            }

            let ephemeral = match parse_ephemeral_key(event) {
                Ok(point) => point,
                Err(e) => {
                    stats.malformed_events += 1;
                    warn!(event = %event.id, error = %e, "Malformed ephemeral key, event left unrecorded");
                    continue;
                }
            };

            let found = if self.config.parallel_matching {
                self.match_parallel(&records, event, &ephemeral, &mut stats).await?
            } else {
                self.match_sequential(&records, event, &ephemeral, &mut stats).await?
            };

            // Every scan key opened for this event is gone by now
            if let Some((record, matched)) = found {
                if let Some(tx) = self.record_match(record, event, &ephemeral, &matched).await? {
                    stats.matches += 1;
                    recorded.push(tx);
                } else {
                    stats.duplicates_skipped += 1;
                }
            }
        }

        Ok((recorded, stats))
    }

    fn published_tag(&self, event: &TransferEvent) -> Option<u8> {
        if self.config.use_view_tags {
            event.view_tag
        } else {
            None
        }
    }

    /// Counts one trial. Per-key failures rule out only this meta-address
    /// for this event; anything else fails the batch.
    fn tally(
        stats: &mut ScanStats,
        event: &TransferEvent,
        record: &MetaAddressRecord,
        trial: Result<MatchOutcome>,
    ) -> Result<Option<StealthMatch>> {
        match trial {
            Ok(outcome) => {
                stats.record(&outcome);
                match outcome {
                    MatchOutcome::Matched(found) => Ok(Some(found)),
                    _ => Ok(None),
                }
            }
            Err(e) if e.is_per_key_failure() => {
                stats.per_key_failures += 1;
                warn!(event = %event.id, meta_id = %record.meta_id, error = %e, "Trial failed, skipping meta-address");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Tries meta-addresses in registration order; the first match wins.
    async fn match_sequential<'r>(
        &self,
        records: &'r [MetaAddressRecord],
        event: &TransferEvent,
        ephemeral: &CompressedPoint,
        stats: &mut ScanStats,
    ) -> Result<Option<(&'r MetaAddressRecord, StealthMatch)>> {
        let tag = self.published_tag(event);

        for record in records {
            let trial = match_with_custody(record, self.custody.as_ref(), ephemeral, &event.receiver, tag).await;
            if let Some(found) = Self::tally(stats, event, record, trial)? {
                return Ok(Some((record, found)));
            }
        }
        Ok(None)
    }

    /// Tries every meta-address concurrently, then picks the first match in
    /// registration order. Each trial unseals its own scan key and drops it
    /// when the trial ends.
    async fn match_parallel<'r>(
        &self,
        records: &'r [MetaAddressRecord],
        event: &TransferEvent,
        ephemeral: &CompressedPoint,
        stats: &mut ScanStats,
    ) -> Result<Option<(&'r MetaAddressRecord, StealthMatch)>> {
        let tag = self.published_tag(event);
        let receiver = event.receiver;
        let ephemeral = *ephemeral;
        let custody = &self.custody;

        let trials = records
            .iter()
            .map(|record| blocking_trial(record, custody.as_ref(), ephemeral, receiver, tag));
        let results = join_all(trials).await;

        let mut winner = None;
        for (record, trial) in records.iter().zip(results) {
            if let Some(found) = Self::tally(stats, event, record, trial)? {
                if winner.is_none() {
                    winner = Some((record, found));
                } else {
                    warn!(
                        event = %event.id,
                        meta_id = %record.meta_id,
                        "Event matches more than one meta-address; keeping the earliest registration"
                    );
                }
            }
        }
        Ok(winner)
    }

    /// Records ownership of a matched event. Returns `None` if the event was
    /// recorded concurrently.
    #[instrument(skip_all, fields(event = %event.id, meta_id = %record.meta_id))]
    async fn record_match(
        &self,
        record: &MetaAddressRecord,
        event: &TransferEvent,
        ephemeral: &CompressedPoint,
        matched: &StealthMatch,
    ) -> Result<Option<Transaction>> {
        let stealth = self
            .store
            .upsert_stealth_address(StealthAddressRecord::new(
                matched.address,
                Some(matched.view_tag),
                record.meta_id,
            ))
            .await?;

        self.store
            .record_ephemeral_key(EphemeralKeyRecord::new(
                *ephemeral,
                event.id,
                event.tx_hash.clone(),
                Some(stealth.stealth_id),
            ))
            .await?;

        let tx = Transaction::incoming(event, record.owner_id.clone(), record.meta_id, Some(stealth.stealth_id));
        match self.store.insert_transaction(tx.clone()).await {
            Ok(()) => {
                info!(
                    owner = %record.owner_id,
                    address = %matched.address,
                    amount = %tx.amount,
                    asset = %tx.asset_type,
                    "Payment recorded"
                );
                Ok(Some(tx))
            }
            Err(PaytosError::DuplicateEvent(_)) => {
                debug!("Event recorded concurrently");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Unseals one scan key and runs the derivation on the blocking pool. The
/// key moves into the blocking task and is dropped when it finishes.
async fn blocking_trial(
    record: &MetaAddressRecord,
    custody: &dyn KeyCustody,
    ephemeral: CompressedPoint,
    receiver: AptosAddress,
    tag: Option<u8>,
) -> Result<MatchOutcome> {
    let scan = open_scan_key(record, custody).await?;
    let spend = record.spend_public_key;
    tokio::task::spawn_blocking(move || try_match(&scan, &spend, &ephemeral, &receiver, tag))
        .await
        .map_err(|e| PaytosError::InternalError(format!("matching task failed: {}", e)))?
}

/// Parses and validates the published ephemeral key in any accepted encoding.
fn parse_ephemeral_key(event: &TransferEvent) -> Result<CompressedPoint> {
    parse_public_key(&event.ephemeral_public_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use paytos_core::traits::{CursorStore, StealthAddressStore, TransactionStore};
    use paytos_core::types::{AssetType, Direction, EventId, SealedKey};
    use paytos_crypto::{AesGcmCustody, SecretScalar};
    use paytos_registry::MemoryStore;
    use paytos_stealth::{recover_stealth_address, StealthWallet};

    const STREAM: &str = "0x1::payment::SentEvent";
    const KNOWN_ADDRESS: &str = "0xabd5bb70886dd0640f97dac4ccd145b36c955c752116752815371bb1448a8e8c";

    /// Serves a fixed list of events, optionally failing or stalling.
    struct MockSource {
        events: parking_lot::Mutex<Vec<TransferEvent>>,
        fail: std::sync::atomic::AtomicBool,
        delay: Option<Duration>,
    }

    impl MockSource {
        fn new(events: Vec<TransferEvent>) -> Self {
            Self {
                events: parking_lot::Mutex::new(events),
                fail: std::sync::atomic::AtomicBool::new(false),
                delay: None,
            }
        }

        fn set_failing(&self, fail: bool) {
            self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
        }

        fn push(&self, event: TransferEvent) {
            self.events.lock().push(event);
        }
    }

    #[async_trait]
    impl EventSource for MockSource {
        async fn fetch_events(
            &self,
            _event_type: &str,
            since: Option<&EventCursor>,
        ) -> Result<Vec<TransferEvent>> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(PaytosError::EventSourceUnavailable("indexer down".into()));
            }
            let events = self.events.lock().clone();
            Ok(events
                .into_iter()
                .filter(|e| since.map_or(true, |c| c.is_before(&e.id)))
                .collect())
        }
    }

    fn custody() -> Arc<AesGcmCustody> {
        Arc::new(AesGcmCustody::from_key(&[0x42; 32]))
    }

    fn known_wallet() -> StealthWallet {
        StealthWallet::from_scalars(
            SecretScalar::from_u64(3).unwrap(),
            SecretScalar::from_u64(5).unwrap(),
        )
        .unwrap()
    }

    fn seven_g() -> CompressedPoint {
        SecretScalar::from_u64(7).unwrap().public_key().unwrap()
    }

    fn transfer(version: u64, receiver: AptosAddress, ephemeral: Vec<u8>, view_tag: Option<u8>) -> TransferEvent {
        TransferEvent {
            id: EventId::new(10, version, 0),
            tx_hash: Some(format!("0x{:064x}", version)),
            sender: AptosAddress::from_array([0xAB; 32]),
            receiver,
            ephemeral_public_key: ephemeral,
            value: 1_000,
            view_tag,
            asset_type: AssetType::Ft,
            token_address: Some("0xa".into()),
        }
    }

    fn known_transfer(version: u64, view_tag: Option<u8>) -> TransferEvent {
        transfer(
            version,
            AptosAddress::parse(KNOWN_ADDRESS).unwrap(),
            seven_g().as_bytes().to_vec(),
            view_tag,
        )
    }

    fn scanner(
        source: Arc<MockSource>,
        custody: Arc<AesGcmCustody>,
        store: Arc<MemoryStore>,
        config: ScannerConfig,
    ) -> EventScanner<MemoryStore> {
        EventScanner::new(source, custody, store, config.event_type(STREAM))
    }

    #[tokio::test]
    async fn test_known_payment_recorded_once() {
        let store = Arc::new(MemoryStore::new());
        let custody = custody();
        let record = known_wallet().register("alice", custody.as_ref(), store.as_ref()).await.unwrap();

        let source = Arc::new(MockSource::new(vec![known_transfer(100, None)]));
        let scanner = scanner(source, custody, store.clone(), ScannerConfig::new());

        let report = scanner.poll(None).await.unwrap();
        assert_eq!(report.recorded.len(), 1);
        assert_eq!(report.next_cursor, Some(EventCursor::new(100, 0)));

        let tx = &report.recorded[0];
        assert_eq!(tx.owner_id, "alice");
        assert_eq!(tx.meta_id, record.meta_id);
        assert_eq!(tx.direction, Direction::In);
        assert_eq!(tx.amount, 1_000);
        assert_eq!(tx.stealth_address.to_hex(), KNOWN_ADDRESS);

        let stealth = store
            .stealth_address_by_address(&tx.stealth_address)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stealth.view_tag, Some(206));
        assert_eq!(Some(stealth.stealth_id), tx.stealth_id);
        assert_eq!(store.ephemeral_keys_for(stealth.stealth_id).await.unwrap().len(), 1);

        // The same event delivered again inserts nothing
        let replay = scanner.poll(None).await.unwrap();
        assert!(replay.recorded.is_empty());
        assert_eq!(replay.stats.duplicates_skipped, 1);
        assert_eq!(store.transaction_count(), 1);
    }

    #[tokio::test]
    async fn test_first_registration_wins() {
        let custody = custody();
        for config in [ScannerConfig::new(), ScannerConfig::new().parallel_matching()] {
            let store = Arc::new(MemoryStore::new());
            let wallet = known_wallet();
            wallet.register("alice", custody.as_ref(), store.as_ref()).await.unwrap();
            wallet.register("bob", custody.as_ref(), store.as_ref()).await.unwrap();

            let source = Arc::new(MockSource::new(vec![known_transfer(1, Some(206))]));
            let scanner = scanner(source, custody.clone(), store.clone(), config);
            let report = scanner.poll(None).await.unwrap();

            assert_eq!(report.recorded.len(), 1);
            assert_eq!(report.recorded[0].owner_id, "alice");
            assert!(store.transactions_for_owner("bob").await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_undecryptable_key_is_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let custody = custody();

        // Sealed under a different key
        let foreign = AesGcmCustody::from_key(&[0x01; 32]);
        StealthWallet::generate()
            .unwrap()
            .register("mallory", &foreign, store.as_ref())
            .await
            .unwrap();
        known_wallet().register("alice", custody.as_ref(), store.as_ref()).await.unwrap();

        let source = Arc::new(MockSource::new(vec![known_transfer(5, None)]));
        let scanner = scanner(source, custody, store.clone(), ScannerConfig::new());
        let report = scanner.poll(None).await.unwrap();

        assert_eq!(report.stats.per_key_failures, 1);
        assert_eq!(report.recorded.len(), 1);
        assert_eq!(report.recorded[0].owner_id, "alice");
    }

    /// Counts every unseal.
    struct CountingCustody {
        inner: AesGcmCustody,
        decrypts: std::sync::atomic::AtomicU64,
    }

    #[async_trait]
    impl KeyCustody for CountingCustody {
        async fn encrypt(&self, plaintext: &[u8]) -> Result<SealedKey> {
            self.inner.encrypt(plaintext).await
        }

        async fn decrypt(&self, sealed: &SealedKey) -> Result<zeroize::Zeroizing<Vec<u8>>> {
            self.decrypts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.decrypt(sealed).await
        }
    }

    #[tokio::test]
    async fn test_scan_key_opened_per_event_and_meta_address() {
        for config in [ScannerConfig::new(), ScannerConfig::new().parallel_matching()] {
            let store = Arc::new(MemoryStore::new());
            let custody = Arc::new(CountingCustody {
                inner: AesGcmCustody::from_key(&[0x42; 32]),
                decrypts: std::sync::atomic::AtomicU64::new(0),
            });
            known_wallet().register("alice", custody.as_ref(), store.as_ref()).await.unwrap();
            StealthWallet::generate()
                .unwrap()
                .register("bob", custody.as_ref(), store.as_ref())
                .await
                .unwrap();
            let foreign = AesGcmCustody::from_key(&[0x01; 32]);
            StealthWallet::generate()
                .unwrap()
                .register("mallory", &foreign, store.as_ref())
                .await
                .unwrap();

            let stranger = AptosAddress::from_array([0x33; 32]);
            let events = vec![
                transfer(1, stranger, seven_g().as_bytes().to_vec(), None),
                transfer(2, stranger, seven_g().as_bytes().to_vec(), None),
            ];
            let source = Arc::new(MockSource::new(events));
            let scanner = EventScanner::new(source, custody.clone(), store, config.event_type(STREAM));

            let report = scanner.poll(None).await.unwrap();
            assert!(report.recorded.is_empty());
            assert_eq!(custody.decrypts.load(std::sync::atomic::Ordering::SeqCst), 6);
            assert_eq!(report.stats.per_key_failures, 2);
            assert_eq!(report.stats.full_derivations, 4);
        }
    }

    #[tokio::test]
    async fn test_view_tag_short_circuits_strangers() {
        let store = Arc::new(MemoryStore::new());
        let custody = custody();
        let stranger = StealthWallet::from_scalars(
            SecretScalar::from_u64(11).unwrap(),
            SecretScalar::from_u64(13).unwrap(),
        )
        .unwrap();
        stranger.register("carol", custody.as_ref(), store.as_ref()).await.unwrap();
        known_wallet().register("alice", custody.as_ref(), store.as_ref()).await.unwrap();

        let stranger_tag = recover_stealth_address(
            &SecretScalar::from_u64(11).unwrap(),
            &stranger.meta_address().spend,
            &seven_g(),
        )
        .unwrap()
        .view_tag;
        let expected_rejections = if stranger_tag == 206 { 0 } else { 1 };

        let source = Arc::new(MockSource::new(vec![known_transfer(5, Some(206))]));
        let tagged = scanner(source.clone(), custody.clone(), store.clone(), ScannerConfig::new());
        let report = tagged.poll(None).await.unwrap();
        assert_eq!(report.stats.view_tag_rejections, expected_rejections);
        assert_eq!(report.stats.full_derivations, 2 - expected_rejections);
        assert_eq!(report.stats.matches, 1);

        // With tags ignored every meta-address is fully derived
        let fresh = Arc::new(MemoryStore::new());
        stranger.register("carol", custody.as_ref(), fresh.as_ref()).await.unwrap();
        known_wallet().register("alice", custody.as_ref(), fresh.as_ref()).await.unwrap();
        let untagged = scanner(source, custody, fresh, ScannerConfig::new().without_view_tags());
        let report = untagged.poll(None).await.unwrap();
        assert_eq!(report.stats.view_tag_rejections, 0);
        assert_eq!(report.stats.full_derivations, 2);
    }

    #[tokio::test]
    async fn test_wrong_published_tag_hides_payment() {
        let store = Arc::new(MemoryStore::new());
        let custody = custody();
        known_wallet().register("alice", custody.as_ref(), store.as_ref()).await.unwrap();

        let source = Arc::new(MockSource::new(vec![known_transfer(5, Some(207))]));
        let scanner = scanner(source, custody, store.clone(), ScannerConfig::new());
        let report = scanner.poll(None).await.unwrap();
        assert!(report.recorded.is_empty());
        assert_eq!(report.stats.view_tag_rejections, 1);
        assert_eq!(report.next_cursor, Some(EventCursor::new(5, 0)));
    }

    #[tokio::test]
    async fn test_malformed_event_does_not_stall_batch() {
        let store = Arc::new(MemoryStore::new());
        let custody = custody();
        known_wallet().register("alice", custody.as_ref(), store.as_ref()).await.unwrap();

        let mut off_curve = vec![0u8; 33];
        off_curve[0] = 0x02;
        off_curve[32] = 5;
        let events = vec![
            transfer(1, AptosAddress::from_array([1; 32]), vec![0x02; 5], None),
            transfer(2, AptosAddress::from_array([1; 32]), off_curve, None),
            known_transfer(3, None),
        ];
        let source = Arc::new(MockSource::new(events));
        let scanner = scanner(source, custody, store, ScannerConfig::new());

        let report = scanner.poll(None).await.unwrap();
        assert_eq!(report.stats.malformed_events, 2);
        assert_eq!(report.recorded.len(), 1);
        assert_eq!(report.next_cursor, Some(EventCursor::new(3, 0)));
    }

    #[tokio::test]
    async fn test_unavailable_source_keeps_cursor() {
        let store = Arc::new(MemoryStore::new());
        let custody = custody();
        known_wallet().register("alice", custody.as_ref(), store.as_ref()).await.unwrap();
        store.save_cursor(STREAM, EventCursor::new(50, 0)).await.unwrap();

        let source = Arc::new(MockSource::new(vec![known_transfer(60, None)]));
        source.set_failing(true);
        let scanner = scanner(source.clone(), custody, store.clone(), ScannerConfig::new());

        let result = scanner.scan_once().await;
        assert!(matches!(result, Err(PaytosError::EventSourceUnavailable(_))));
        assert_eq!(store.load_cursor(STREAM).await.unwrap(), Some(EventCursor::new(50, 0)));
        assert_eq!(scanner.state(), ScannerState::Idle);

        source.set_failing(false);
        let report = scanner.scan_once().await.unwrap();
        assert_eq!(report.recorded.len(), 1);
        assert_eq!(store.load_cursor(STREAM).await.unwrap(), Some(EventCursor::new(60, 0)));
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(MockSource {
            delay: Some(Duration::from_secs(5)),
            ..MockSource::new(Vec::new())
        });
        let scanner = scanner(
            source,
            custody(),
            store,
            ScannerConfig::new().fetch_timeout(Duration::from_millis(20)),
        );
        assert!(matches!(
            scanner.poll(None).await,
            Err(PaytosError::EventSourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_batch_keeps_cursor() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(MockSource::new(Vec::new()));
        let scanner = scanner(source, custody(), store, ScannerConfig::new());

        let cursor = Some(EventCursor::new(9, 2));
        let report = scanner.poll(cursor).await.unwrap();
        assert_eq!(report.next_cursor, cursor);
        assert_eq!(report.stats.events_seen, 0);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let custody = custody();
        known_wallet().register("alice", custody.as_ref(), store.as_ref()).await.unwrap();

        let source = Arc::new(MockSource::new(vec![known_transfer(1, None)]));
        let scanner = Arc::new(scanner(
            source.clone(),
            custody,
            store.clone(),
            ScannerConfig::new().interval(Duration::from_millis(10)),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = {
            let scanner = scanner.clone();
            tokio::spawn(async move { scanner.run(shutdown_rx).await })
        };

        // A later event is picked up by a later tick
        tokio::time::sleep(Duration::from_millis(50)).await;
        source.push(known_transfer(2, None));
        tokio::time::sleep(Duration::from_millis(100)).await;

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(scanner.state(), ScannerState::Stopped);
        assert_eq!(store.transaction_count(), 2);
        assert_eq!(store.load_cursor(STREAM).await.unwrap(), Some(EventCursor::new(2, 0)));
        assert_eq!(scanner.stats().matches, 2);
    }

    #[test]
    fn test_filter_efficiency() {
        let stats = ScanStats {
            view_tag_rejections: 255,
            full_derivations: 1,
            ..ScanStats::default()
        };
        assert!((stats.filter_efficiency() - 99.6).abs() < 0.1);
        assert_eq!(ScanStats::default().filter_efficiency(), 0.0);
    }
}
