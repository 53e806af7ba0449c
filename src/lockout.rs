//! Password verification with attempt counting and escalating lockouts.
//!
//! Failures are counted per key (an email, a client address) in a fixed
//! window. Reaching the limit locks the key for the next duration in the
//! escalation table. State lives in an [`AttemptStore`] owned by the caller,
//! so the in-memory store can be swapped for a shared one. Each attempt is
//! applied through [`AttemptStore::update`], so concurrent attempts on one
//! key are counted one after another.

use async_trait::async_trait;
use constant_time_eq::constant_time_eq_32;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Minimum time between sweeps of expired entries in [`MemoryAttemptStore`].
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum LockoutError {
    #[error("Attempt store error: {0}")]
    Store(String),

    #[error("Invalid password digest: {0}")]
    InvalidDigest(String),
}

impl From<hex::FromHexError> for LockoutError {
    fn from(err: hex::FromHexError) -> Self {
        LockoutError::InvalidDigest(err.to_string())
    }
}

/// Failure state kept for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// Failures in the current window.
    pub failures: u32,
    pub window_started: Instant,
    /// Lockouts served so far; selects the next escalation step.
    pub lockouts: u32,
    pub locked_until: Option<Instant>,
}

impl AttemptRecord {
    fn fresh(now: Instant) -> Self {
        Self {
            failures: 0,
            window_started: now,
            lockouts: 0,
            locked_until: None,
        }
    }
}

/// What [`AttemptStore::update`] writes back for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUpdate {
    /// Leave the entry as it is.
    Keep,
    /// Replace the entry; it expires after `ttl`.
    Put { record: AttemptRecord, ttl: Duration },
    Remove,
}

/// Keyed store with per-entry expiry.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Current record for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<AttemptRecord>, LockoutError>;

    /// Store `record`, replacing any previous one; it expires after `ttl`.
    async fn put(&self, key: &str, record: AttemptRecord, ttl: Duration) -> Result<(), LockoutError>;

    async fn remove(&self, key: &str) -> Result<(), LockoutError>;

    /// Read, change and write back the record for `key` as one step.
    ///
    /// `apply` receives the live record (`None` if absent or expired) and
    /// returns the write to perform plus a value handed back to the caller.
    /// No other operation on the same key may interleave with it.
    async fn update<F, T>(&self, key: &str, apply: F) -> Result<T, LockoutError>
    where
        F: FnOnce(Option<AttemptRecord>) -> (StoreUpdate, T) + Send,
        T: Send;
}

#[derive(Debug, Default)]
struct Entries {
    records: HashMap<String, (AttemptRecord, Instant)>,
    swept_at: Option<Instant>,
}

impl Entries {
    fn live(&mut self, key: &str, now: Instant) -> Option<AttemptRecord> {
        let expired = match self.records.get(key) {
            Some((record, expires)) if *expires > now => return Some(record.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.records.remove(key);
        }
        None
    }

    fn insert(&mut self, key: &str, record: AttemptRecord, ttl: Duration, now: Instant) {
        self.sweep(now);
        self.records.insert(key.to_string(), (record, now + ttl));
    }

    /// Drop every expired entry, at most once per [`SWEEP_INTERVAL`].
    fn sweep(&mut self, now: Instant) {
        if self
            .swept_at
            .is_some_and(|at| now.duration_since(at) < SWEEP_INTERVAL)
        {
            return;
        }
        let before = self.records.len();
        self.records.retain(|_, (_, expires)| *expires > now);
        self.swept_at = Some(now);
        if self.records.len() < before {
            debug!(dropped = before - self.records.len(), "swept expired attempt records");
        }
    }
}

/// Process-local [`AttemptStore`].
///
/// Expired entries are dropped when their key is read, and by a sweep that
/// runs on writes at most once a minute.
#[derive(Debug, Default)]
pub struct MemoryAttemptStore {
    entries: Mutex<Entries>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries held, expired or not.
    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.lock().await.records.len()
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn get(&self, key: &str) -> Result<Option<AttemptRecord>, LockoutError> {
        let now = Instant::now();
        Ok(self.entries.lock().await.live(key, now))
    }

    async fn put(&self, key: &str, record: AttemptRecord, ttl: Duration) -> Result<(), LockoutError> {
        let now = Instant::now();
        self.entries.lock().await.insert(key, record, ttl, now);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), LockoutError> {
        self.entries.lock().await.records.remove(key);
        Ok(())
    }

    async fn update<F, T>(&self, key: &str, apply: F) -> Result<T, LockoutError>
    where
        F: FnOnce(Option<AttemptRecord>) -> (StoreUpdate, T) + Send,
        T: Send,
    {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let (update, out) = apply(entries.live(key, now));
        match update {
            StoreUpdate::Keep => {}
            StoreUpdate::Put { record, ttl } => entries.insert(key, record, ttl, now),
            StoreUpdate::Remove => {
                entries.records.remove(key);
            }
        }
        Ok(out)
    }
}
/// Limits and lockout durations.
#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    /// Failures allowed per window before a lockout.
    pub max_attempts: u32,
    pub window: Duration,
    /// Lockout durations by level. The last entry repeats.
    pub escalation: Vec<Duration>,
    /// How long a key's record is kept after its last failure.
    pub retention: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(15 * 60),
            escalation: vec![
                Duration::from_secs(60),
                Duration::from_secs(5 * 60),
                Duration::from_secs(15 * 60),
                Duration::from_secs(60 * 60),
            ],
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl LockoutPolicy {
    /// Lockout duration for the given level.
    pub fn lockout_for(&self, level: u32) -> Duration {
        self.escalation
            .get(level as usize)
            .or_else(|| self.escalation.last())
            .copied()
            .unwrap_or(self.window)
    }
}

/// Outcome of a verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Granted,
    Denied { remaining: u32 },
    Locked { retry_after: Duration },
}

/// Verifies a shared password, enforcing a [`LockoutPolicy`] per key.
pub struct PasswordGate<S> {
    store: S,
    policy: LockoutPolicy,
    expected: [u8; 32],
}

impl<S: AttemptStore> PasswordGate<S> {
    /// Build a gate from the hex-encoded SHA-256 digest of the password.
    pub fn new(store: S, policy: LockoutPolicy, expected_hex: &str) -> Result<Self, LockoutError> {
        let bytes = hex::decode(expected_hex.trim())?;
        let expected: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            LockoutError::InvalidDigest(format!("expected 32 bytes, got {}", b.len()))
        })?;
        Ok(Self {
            store,
            policy,
            expected,
        })
    }

    /// Build a gate from the plain password.
    pub fn with_password(store: S, policy: LockoutPolicy, password: &str) -> Self {
        Self {
            store,
            policy,
            expected: digest(password),
        }
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Check `candidate` for `key`.
    ///
    /// A locked key is rejected whatever the password.
    pub async fn verify(&self, key: &str, candidate: &str) -> Result<Verdict, LockoutError> {
        let now = Instant::now();
        let matches = constant_time_eq_32(&digest(candidate), &self.expected);
        self.store
            .update(key, |existing| self.apply_attempt(key, existing, matches, now))
            .await
    }

    fn apply_attempt(
        &self,
        key: &str,
        existing: Option<AttemptRecord>,
        matches: bool,
        now: Instant,
    ) -> (StoreUpdate, Verdict) {
        if let Some(until) = existing.as_ref().and_then(|r| r.locked_until) {
            if until > now {
                let verdict = Verdict::Locked {
                    retry_after: until - now,
                };
                return (StoreUpdate::Keep, verdict);
            }
        }

        if matches {
            let update = match existing {
                Some(_) => StoreUpdate::Remove,
                None => StoreUpdate::Keep,
            };
            return (update, Verdict::Granted);
        }

        let mut record = existing.unwrap_or_else(|| AttemptRecord::fresh(now));
        record.locked_until = None;
        if now.duration_since(record.window_started) >= self.policy.window {
            record.failures = 0;
            record.window_started = now;
        }
        record.failures += 1;

        if record.failures >= self.policy.max_attempts {
            let duration = self.policy.lockout_for(record.lockouts);
            record.lockouts += 1;
            record.failures = 0;
            record.window_started = now;
            record.locked_until = Some(now + duration);
            info!(
                key,
                level = record.lockouts,
                lockout_secs = duration.as_secs(),
                "locking out after repeated password failures"
            );
            let ttl = duration + self.policy.retention;
            let verdict = Verdict::Locked {
                retry_after: duration,
            };
            return (StoreUpdate::Put { record, ttl }, verdict);
        }

        let remaining = self.policy.max_attempts - record.failures;
        debug!(key, remaining, "password rejected");
        let update = StoreUpdate::Put {
            record,
            ttl: self.policy.retention,
        };
        (update, Verdict::Denied { remaining })
    }
}

fn digest(password: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(password.as_bytes()));
    out
}
