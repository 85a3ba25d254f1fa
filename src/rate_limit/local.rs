//! In-process token buckets, one per key.

use super::strategies::TokenBucket;
use super::{validate_request, wait_until_allowed, RateLimiter, DEFAULT_POLL_INTERVAL};
use crate::clock::{Clock, MonotonicClock};
use crate::config::{Algorithm, LimiterConfig};
use crate::context::CallContext;
use crate::error::{ConfigError, RateLimitError};
use crate::sleeper::{Sleeper, TokioSleeper};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Key count above which a sweep drops every bucket.
pub const DEFAULT_MAX_KEYS: usize = 10_000;

type Bucket = Arc<Mutex<TokenBucket>>;

/// Token-bucket limiter keeping per-key state in process memory.
///
/// Buckets are created full on first use. Idle buckets are reclaimed by
/// [`sweep`](Self::sweep), typically driven by [`spawn_sweeper`](Self::spawn_sweeper).
/// Only the token-bucket algorithm runs in process; for the window algorithms use a
/// [`DistributedLimiter`](super::DistributedLimiter) over an
/// [`InMemoryStore`](super::InMemoryStore).
#[derive(Debug)]
pub struct LocalTokenBucketLimiter {
    config: LimiterConfig,
    buckets: RwLock<HashMap<String, Bucket>>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    poll_interval: Duration,
    max_keys: usize,
}

impl LocalTokenBucketLimiter {
    /// # Examples
    /// ```
    /// use floodgate::config::LimiterConfig;
    /// use floodgate::rate_limit::{LocalTokenBucketLimiter, RateLimiter};
    /// # tokio_test_block(async {
    /// let limiter = LocalTokenBucketLimiter::new(LimiterConfig::new(5.0, 2).unwrap()).unwrap();
    /// assert!(limiter.allow_n("user:1", 2).await.unwrap());
    /// assert!(!limiter.allow("user:1").await.unwrap());
    /// # });
    /// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
    /// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
    /// # }
    /// ```
    pub fn new(config: LimiterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.algorithm() != Algorithm::TokenBucket {
            tracing::warn!(
                algorithm = %config.algorithm(),
                "Local limiter only implements token_bucket; configured algorithm ignored"
            );
        }
        Ok(Self {
            config,
            buckets: RwLock::new(HashMap::new()),
            clock: Arc::new(MonotonicClock::default()),
            sleeper: Arc::new(TokioSleeper),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_keys: DEFAULT_MAX_KEYS,
        })
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_sleeper<T: Sleeper + 'static>(mut self, sleeper: T) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Size threshold past which [`sweep`](Self::sweep) clears the whole map.
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Number of keys currently holding a bucket.
    pub fn len(&self) -> usize {
        self.buckets.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bucket for `key`, created full on first use.
    fn bucket(&self, key: &str, now: Duration) -> Bucket {
        if let Some(bucket) = self.buckets.read().unwrap_or_else(PoisonError::into_inner).get(key) {
            return bucket.clone();
        }
        // Re-check under the write lock: another caller may have inserted meanwhile.
        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        buckets
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(TokenBucket::full(f64::from(self.config.burst()), now)))
            })
            .clone()
    }

    /// Drop buckets idle for longer than [`LimiterConfig::state_ttl`], or every bucket if
    /// more than `max_keys` are held. Returns how many were removed.
    ///
    /// Evicting a key only costs it a fresh, full bucket on its next request.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.config.state_ttl();
        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        let before = buckets.len();

        if before > self.max_keys {
            buckets.clear();
        } else {
            buckets.retain(|_, bucket| {
                let last = bucket.lock().unwrap_or_else(PoisonError::into_inner).last_refill();
                now.saturating_sub(last) <= ttl
            });
        }

        let removed = before - buckets.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = buckets.len(), "Swept idle rate limit buckets");
        }
        removed
    }

    /// Run [`sweep`](Self::sweep) every `every` on the current tokio runtime.
    ///
    /// The task holds only a weak reference and exits once the limiter is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match limiter.upgrade() {
                    Some(limiter) => {
                        limiter.sweep();
                    }
                    None => break,
                }
            }
        })
    }
}

#[async_trait]
impl RateLimiter for LocalTokenBucketLimiter {
    async fn allow_n(&self, key: &str, n: u32) -> Result<bool, RateLimitError> {
        validate_request(key, n)?;
        let now = self.clock.now();
        let bucket = self.bucket(key, now);
        let admitted = bucket.lock().unwrap_or_else(PoisonError::into_inner).try_take(
            now,
            self.config.rate(),
            f64::from(self.config.burst()),
            f64::from(n),
        );
        if !admitted {
            tracing::debug!(key, requested = n, "Rate limit denied");
        }
        Ok(admitted)
    }

    async fn wait(&self, ctx: &CallContext, key: &str) -> Result<(), RateLimitError> {
        wait_until_allowed(self, ctx, key, self.sleeper.as_ref(), self.poll_interval).await
    }

    async fn reset(&self, ctx: &CallContext, key: &str) -> Result<(), RateLimitError> {
        validate_request(key, 1)?;
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        self.buckets.write().unwrap_or_else(PoisonError::into_inner).remove(key);
        Ok(())
    }
}
