//! Server nonce registry with per-nonce counter tracking for replay defense.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use ring::rand::{SecureRandom, SystemRandom};
use tracing::debug;

use crate::error::{DaemonError, DaemonResult};

/// Random bytes per nonce (128 bits).
const TOKEN_BYTES: usize = 16;

/// Outcome of checking a `(nonce, nc)` pair against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceStatus {
    /// First use of this counter under a live nonce.
    Ok,
    /// The nonce exists but is older than the maximum age.
    Stale,
    /// The nonce was never issued or has already been purged.
    Unknown,
    /// The counter was already consumed under this nonce.
    Replayed,
}

/// State kept for one issued nonce.
#[derive(Debug, Clone)]
pub struct NonceRecord {
    value: String,
    realm: String,
    issued_at: Instant,
    last_used_counter: u32,
    seen_counters: HashSet<u32>,
    max_age: Duration,
}

impl NonceRecord {
    fn new(value: String, realm: &str, issued_at: Instant, max_age: Duration) -> Self {
        Self {
            value,
            realm: realm.to_string(),
            issued_at,
            last_used_counter: 0,
            seen_counters: HashSet::new(),
            max_age,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    /// Highest counter accepted so far (0 when unused).
    pub fn last_used_counter(&self) -> u32 {
        self.last_used_counter
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.issued_at) > self.max_age
    }

    fn consume(&mut self, nc: u32) -> bool {
        if !self.seen_counters.insert(nc) {
            return false;
        }
        self.last_used_counter = self.last_used_counter.max(nc);
        true
    }
}

/// Thread-safe nonce registry.
///
/// The map lock is only held long enough to find, insert or remove a record;
/// each record carries its own mutex, which serializes counter checks so two
/// concurrent requests can never both consume the same `(nonce, nc)` pair.
pub struct NonceRegistry {
    records: RwLock<HashMap<String, Arc<Mutex<NonceRecord>>>>,
    rng: SystemRandom,
    max_age: Duration,
    grace_factor: u32,
}

impl NonceRegistry {
    /// Create a registry whose nonces go stale after `max_age` and are purged
    /// after `max_age * grace_factor`.
    pub fn new(max_age: Duration, grace_factor: u32) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            rng: SystemRandom::new(),
            max_age,
            grace_factor: grace_factor.max(1),
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Issue a fresh nonce for `realm` and register it.
    pub fn issue(&self, realm: &str) -> DaemonResult<NonceRecord> {
        self.issue_at(realm, Instant::now())
    }

    /// Issue a nonce with an explicit issuance time.
    pub fn issue_at(&self, realm: &str, now: Instant) -> DaemonResult<NonceRecord> {
        let value = random_token(&self.rng)?;
        let record = NonceRecord::new(value.clone(), realm, now, self.max_age);
        let snapshot = record.clone();

        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(value, Arc::new(Mutex::new(record)));

        Ok(snapshot)
    }

    /// Check a `(nonce, nc)` pair and consume the counter on first use.
    pub fn validate(&self, nonce: &str, nc: u32) -> NonceStatus {
        self.validate_at(nonce, nc, Instant::now())
    }

    /// Check a `(nonce, nc)` pair as of `now`.
    pub fn validate_at(&self, nonce: &str, nc: u32, now: Instant) -> NonceStatus {
        let record = {
            let records = self.records.read().unwrap_or_else(|e| e.into_inner());
            match records.get(nonce) {
                Some(record) => Arc::clone(record),
                None => return NonceStatus::Unknown,
            }
        };

        let mut record = record.lock().unwrap_or_else(|e| e.into_inner());

        if record.is_stale(now) {
            return NonceStatus::Stale;
        }

        if !record.consume(nc) {
            return NonceStatus::Replayed;
        }

        NonceStatus::Ok
    }

    /// Drop a nonce, e.g. once a stale nonce has been replaced.
    pub fn revoke(&self, nonce: &str) -> bool {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.remove(nonce).is_some()
    }

    /// Snapshot of a record, if it is still registered.
    pub fn get(&self, nonce: &str) -> Option<NonceRecord> {
        let record = {
            let records = self.records.read().unwrap_or_else(|e| e.into_inner());
            Arc::clone(records.get(nonce)?)
        };
        let record = record.lock().unwrap_or_else(|e| e.into_inner());
        Some(record.clone())
    }

    /// Get the current number of registered nonces (for monitoring).
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Purge records past the grace window.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Purge records older than `max_age * grace_factor` as of `now`.
    ///
    /// Records between `max_age` and the purge horizon are kept so clients
    /// get a clean stale re-challenge instead of an unknown-nonce one.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let horizon = self.max_age.saturating_mul(self.grace_factor);
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let before = records.len();

        records.retain(|_, record| {
            let record = record.lock().unwrap_or_else(|e| e.into_inner());
            now.saturating_duration_since(record.issued_at) <= horizon
        });

        let removed = before - records.len();
        if removed > 0 {
            debug!(removed, remaining = records.len(), "Swept expired nonces");
        }
        removed
    }

    /// Start a background sweep task.
    ///
    /// This spawns a tokio task that periodically purges expired nonces.
    pub fn start_sweep_task(self: &Arc<Self>, interval: Duration) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            loop {
                interval_timer.tick().await;
                registry.sweep();
            }
        });
    }
}

/// Hex-encoded 128-bit token from the system CSPRNG.
pub fn random_token(rng: &SystemRandom) -> DaemonResult<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    rng.fill(&mut bytes).map_err(|_| DaemonError::Server {
        message: "System random source failed".to_string(),
    })?;
    Ok(hex::encode(bytes))
}
