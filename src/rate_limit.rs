//! Rate limiting primitives.
//!
//! This module provides the building blocks for rate limiting:
//! - [`RateLimiter`]: The core trait every limiter implements.
//! - [`LocalTokenBucketLimiter`]: In-process token buckets keyed by caller.
//! - [`DistributedLimiter`]: Token bucket, sliding window, fixed window and leaky
//!   bucket algorithms executed atomically by an [`AtomicStore`].
//! - [`RateLimitLayer`]: Tower middleware that enforces the limit.
//!
//! # Architecture
//!
//! - **Middleware**: `RateLimitLayer` wraps your service. It doesn't know *how* limiting works,
//!   only that it should ask a `RateLimiter` about the key it extracted.
//! - **Logic**: the refill and window math lives in [`strategies`].
//! - **Storage**: `AtomicStore` (in `store` module) runs each admission as a single
//!   read-modify-write, in memory or in a shared backend such as Redis.

use crate::context::CallContext;
use crate::error::RateLimitError;
use crate::sleeper::Sleeper;
use async_trait::async_trait;
use std::time::Duration;

pub mod distributed;
pub mod local;
pub mod middleware;
pub mod store;
pub mod strategies;

pub use distributed::DistributedLimiter;
pub use local::LocalTokenBucketLimiter;
pub use middleware::{RateLimitLayer, RateLimitService};
pub use store::{AtomicStore, InMemoryStore};

/// Pause between admission attempts inside [`RateLimiter::wait`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Core interface for rate limiting logic.
///
/// Denial is a normal `Ok(false)`; errors are reserved for bad input, backend
/// failures and ended contexts.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Attempt to admit one unit for `key`.
    async fn allow(&self, key: &str) -> Result<bool, RateLimitError> {
        self.allow_n(key, 1).await
    }

    /// Atomically admit `n` units, consuming capacity only on success.
    async fn allow_n(&self, key: &str, n: u32) -> Result<bool, RateLimitError>;

    /// Block until one unit is admitted or `ctx` ends.
    async fn wait(&self, ctx: &CallContext, key: &str) -> Result<(), RateLimitError>;

    /// Drop all state for `key`, returning it to full capacity.
    async fn reset(&self, ctx: &CallContext, key: &str) -> Result<(), RateLimitError>;

    /// Like [`allow`](Self::allow), but denial is `RateLimitError::RateLimitExceeded`.
    async fn check(&self, key: &str) -> Result<(), RateLimitError> {
        self.check_n(key, 1).await
    }

    async fn check_n(&self, key: &str, n: u32) -> Result<(), RateLimitError> {
        if self.allow_n(key, n).await? {
            Ok(())
        } else {
            Err(RateLimitError::RateLimitExceeded { key: key.to_string() })
        }
    }
}

pub(crate) fn validate_request(key: &str, n: u32) -> Result<(), RateLimitError> {
    if key.is_empty() {
        return Err(RateLimitError::InvalidKey);
    }
    if n == 0 {
        return Err(RateLimitError::InvalidPermits);
    }
    Ok(())
}

/// Poll `limiter.allow(key)` every `interval` until it admits or `ctx` ends.
///
/// Cancellation is observed between attempts and while sleeping, so it takes
/// effect within one interval.
pub async fn wait_until_allowed<L>(
    limiter: &L,
    ctx: &CallContext,
    key: &str,
    sleeper: &dyn Sleeper,
    interval: Duration,
) -> Result<(), RateLimitError>
where
    L: RateLimiter + ?Sized,
{
    validate_request(key, 1)?;
    loop {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        if limiter.allow(key).await? {
            return Ok(());
        }
        tokio::select! {
            biased;
            reason = ctx.done() => return Err(reason.into()),
            _ = sleeper.sleep(interval) => {}
        }
    }
}
