use super::strategies::{SlidingLog, TokenBucket};
use crate::clock::{Clock, SystemClock};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Inputs to the token-bucket procedure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketParams {
    /// Tokens per second.
    pub rate: f64,
    pub burst: f64,
    pub requested: u32,
    /// Wall-clock time of the attempt, since the UNIX epoch.
    pub now: Duration,
    /// Idle expiry for the stored state.
    pub ttl: Duration,
}

/// Inputs to the sliding-window procedure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowParams {
    pub limit: f64,
    pub window: Duration,
    pub requested: u32,
    pub now: Duration,
    pub ttl: Duration,
    /// Caller-unique value that keeps entries recorded in the same nanosecond distinct.
    pub nonce: u64,
}

/// Key-value store able to run each admission procedure as one atomic unit.
///
/// Implementations must never split a procedure into a separate read and write
/// visible to other clients: two processes racing on a key would both see stale
/// capacity and over-admit.
#[async_trait]
pub trait AtomicStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Refill the bucket at `key` (stored as fields `tokens` and `last_time`),
    /// take `requested` tokens if available, and persist the result with `ttl`.
    /// A missing bucket starts full.
    async fn token_bucket(&self, key: &str, params: BucketParams) -> Result<bool, Self::Error>;

    /// Prune entries older than `now - window` from the ordered set at `key`; if
    /// `count + requested <= limit`, add `requested` entries scored `now` and admit.
    async fn sliding_window(&self, key: &str, params: WindowParams) -> Result<bool, Self::Error>;

    /// Add `by` to the counter at `key`, attaching `ttl` when this call created it.
    /// Returns the post-increment value.
    async fn increment(&self, key: &str, by: u32, ttl: Duration) -> Result<u64, Self::Error>;

    /// Remove `keys`; missing keys are ignored.
    async fn delete(&self, keys: &[String]) -> Result<(), Self::Error>;
}

/// Errors from [`InMemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InMemoryStoreError {
    /// The key holds a value of a different kind.
    #[error("key '{0}' holds a value of the wrong type")]
    WrongType(String),
}

#[derive(Debug, Clone)]
enum StoredValue {
    Bucket(TokenBucket),
    Log(SlidingLog),
    Counter(u64),
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: StoredValue,
    expires_at: Option<Duration>,
}

/// In-process [`AtomicStore`]: each procedure runs under one mutex.
///
/// Clones share the same data. Expiry is evaluated lazily against the store's clock.
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, StoredEntry>>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Use `clock` for TTL expiry; share it with the limiter in tests.
    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())), clock: Arc::new(clock) }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.lock().values().filter(|e| !e.expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.lock().get(key).is_some_and(|e| !e.expired(now))
    }

    /// Remaining TTL of `key`, if it exists and has one.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let guard = self.lock();
        let entry = guard.get(key).filter(|e| !e.expired(now))?;
        entry.expires_at.map(|at| at.saturating_sub(now))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop `key` if it has expired, so the procedure sees it as missing.
    fn purge_expired(map: &mut HashMap<String, StoredEntry>, key: &str, now: Duration) {
        if map.get(key).is_some_and(|e| e.expired(now)) {
            map.remove(key);
        }
    }
}

impl StoredEntry {
    fn expired(&self, now: Duration) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[async_trait]
impl AtomicStore for InMemoryStore {
    type Error = InMemoryStoreError;

    async fn token_bucket(&self, key: &str, params: BucketParams) -> Result<bool, Self::Error> {
        let now = self.clock.now();
        let mut map = self.lock();
        Self::purge_expired(&mut map, key, now);
        let mut bucket = match map.get(key) {
            Some(StoredEntry { value: StoredValue::Bucket(b), .. }) => *b,
            Some(_) => return Err(InMemoryStoreError::WrongType(key.to_string())),
            None => TokenBucket::full(params.burst, params.now),
        };
        let admitted =
            bucket.try_take(params.now, params.rate, params.burst, f64::from(params.requested));
        map.insert(
            key.to_string(),
            StoredEntry {
                value: StoredValue::Bucket(bucket),
                expires_at: Some(now.saturating_add(params.ttl)),
            },
        );
        Ok(admitted)
    }

    async fn sliding_window(&self, key: &str, params: WindowParams) -> Result<bool, Self::Error> {
        let now = self.clock.now();
        let mut map = self.lock();
        Self::purge_expired(&mut map, key, now);
        let entry = map.entry(key.to_string()).or_insert_with(|| StoredEntry {
            value: StoredValue::Log(SlidingLog::default()),
            expires_at: None,
        });
        let StoredValue::Log(log) = &mut entry.value else {
            return Err(InMemoryStoreError::WrongType(key.to_string()));
        };
        let admitted = log.try_record(params.now, params.window, params.limit, params.requested);
        if admitted {
            entry.expires_at = Some(now.saturating_add(params.ttl));
        } else if log.is_empty() {
            map.remove(key);
        }
        Ok(admitted)
    }

    async fn increment(&self, key: &str, by: u32, ttl: Duration) -> Result<u64, Self::Error> {
        let now = self.clock.now();
        let mut map = self.lock();
        Self::purge_expired(&mut map, key, now);
        match map.get_mut(key) {
            Some(StoredEntry { value: StoredValue::Counter(count), .. }) => {
                *count = count.saturating_add(u64::from(by));
                Ok(*count)
            }
            Some(_) => Err(InMemoryStoreError::WrongType(key.to_string())),
            None => {
                let entry = StoredEntry {
                    value: StoredValue::Counter(u64::from(by)),
                    expires_at: Some(now.saturating_add(ttl)),
                };
                map.insert(key.to_string(), entry);
                Ok(u64::from(by))
            }
        }
    }

    async fn delete(&self, keys: &[String]) -> Result<(), Self::Error> {
        let mut map = self.lock();
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }
}
