//! Limiter whose state lives in an [`AtomicStore`] shared by every process.
//!
//! Keys are namespaced as `ratelimit:<algorithm>:<key>`; fixed-window counters add
//! the window index: `ratelimit:fixed_window:<key>:<unix-second>`.

use super::store::{AtomicStore, BucketParams, WindowParams};
use super::strategies::{window_index, WINDOW};
use super::{validate_request, wait_until_allowed, RateLimiter, DEFAULT_POLL_INTERVAL};
use crate::clock::{Clock, SystemClock};
use crate::config::{Algorithm, LimiterConfig};
use crate::context::CallContext;
use crate::error::{ConfigError, RateLimitError};
use crate::sleeper::{Sleeper, TokioSleeper};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Store key for `key` under `algorithm`.
///
/// # Examples
/// ```
/// use floodgate::config::Algorithm;
/// use floodgate::rate_limit::distributed::key_for;
/// assert_eq!(key_for(Algorithm::TokenBucket, "user:42"), "ratelimit:token_bucket:user:42");
/// ```
pub fn key_for(algorithm: Algorithm, key: &str) -> String {
    format!("ratelimit:{}:{}", algorithm.as_str(), key)
}

/// Counter key for the fixed window with index `window`.
pub fn fixed_window_key(key: &str, window: u64) -> String {
    format!("{}:{}", key_for(Algorithm::FixedWindow, key), window)
}

/// Rate limiter running the configured algorithm against an [`AtomicStore`].
///
/// Every admission is a single store procedure, so any number of processes may
/// share a key. Store failures surface as [`RateLimitError::Backend`]; whether to
/// fail open or closed is up to the caller.
#[derive(Debug)]
pub struct DistributedLimiter<S> {
    store: S,
    config: LimiterConfig,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    poll_interval: Duration,
}

impl<S: AtomicStore> DistributedLimiter<S> {
    /// # Errors
    /// Returns a [`ConfigError`] if `config` does not validate.
    pub fn new(store: S, config: LimiterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Processes sharing a store must share a time base; the default is [`SystemClock`].
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_sleeper<T: Sleeper + 'static>(mut self, sleeper: T) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Pause between attempts in [`RateLimiter::wait`].
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn admit(&self, key: &str, n: u32, now: Duration) -> Result<bool, S::Error> {
        let algorithm = self.config.algorithm();
        match algorithm {
            // A leaky-bucket meter at level L is a token bucket holding burst - L.
            Algorithm::TokenBucket | Algorithm::LeakyBucket => {
                let params = BucketParams {
                    rate: self.config.rate(),
                    burst: f64::from(self.config.burst()),
                    requested: n,
                    now,
                    ttl: self.config.state_ttl(),
                };
                self.store.token_bucket(&key_for(algorithm, key), params).await
            }
            Algorithm::SlidingWindow => {
                let params = WindowParams {
                    limit: self.config.rate(),
                    window: WINDOW,
                    requested: n,
                    now,
                    ttl: self.config.ttl().max(WINDOW),
                    nonce: rand::random(),
                };
                self.store.sliding_window(&key_for(algorithm, key), params).await
            }
            Algorithm::FixedWindow => {
                let counter = fixed_window_key(key, window_index(now));
                let count = self.store.increment(&counter, n, WINDOW * 2).await?;
                Ok(count as f64 <= self.config.rate())
            }
        }
    }

    /// Every store key `key` may occupy.
    fn keys_for(&self, key: &str, now: Duration) -> Vec<String> {
        let window = window_index(now);
        let mut keys: Vec<String> = [Algorithm::TokenBucket, Algorithm::LeakyBucket, Algorithm::SlidingWindow]
            .into_iter()
            .map(|algorithm| key_for(algorithm, key))
            .collect();
        keys.push(fixed_window_key(key, window));
        if let Some(previous) = window.checked_sub(1) {
            keys.push(fixed_window_key(key, previous));
        }
        keys
    }
}

#[async_trait]
impl<S> RateLimiter for DistributedLimiter<S>
where
    S: AtomicStore + 'static,
{
    async fn allow_n(&self, key: &str, n: u32) -> Result<bool, RateLimitError> {
        validate_request(key, n)?;
        let algorithm = self.config.algorithm();
        let now = self.clock.now();

        let admitted = self.admit(key, n, now).await.map_err(|e| {
            tracing::warn!(key, algorithm = %algorithm, error = %e, "Rate limit backend failed");
            RateLimitError::backend(algorithm, e)
        })?;

        if !admitted {
            tracing::debug!(key, algorithm = %algorithm, requested = n, "Rate limit denied");
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
        let keys = self.keys_for(key, self.clock.now());
        tokio::select! {
            biased;
            reason = ctx.done() => Err(reason.into()),
            result = self.store.delete(&keys) => result.map_err(|e| {
                tracing::warn!(key, error = %e, "Rate limit reset failed");
                RateLimitError::backend(self.config.algorithm(), e)
            }),
        }
    }
}
