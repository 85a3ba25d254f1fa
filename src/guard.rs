//! Rate limit check followed by a breaker-protected call.
//!
//! ```text
//! caller ─▶ limiter.allow(key) ─▶ breaker.call(op) ─▶ op() ─▶ result
//!              │ denied                │ open / probes in use
//!              ▼                       ▼
//!         RateLimited       CircuitOpen / TooManyRequests
//! ```

use crate::circuit_breaker::CircuitBreaker;
use crate::context::CallContext;
use crate::error::{RateLimitError, ResilienceError};
use crate::rate_limit::RateLimiter;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A limiter and a breaker applied in sequence to one unit of work.
///
/// The two share no state: a denial never reaches the breaker, so it cannot
/// count as a downstream failure.
#[derive(Clone)]
pub struct Guard {
    limiter: Arc<dyn RateLimiter>,
    breaker: CircuitBreaker,
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard").field("breaker", &self.breaker).finish_non_exhaustive()
    }
}

impl Guard {
    pub fn new(limiter: Arc<dyn RateLimiter>, breaker: CircuitBreaker) -> Self {
        Self { limiter, breaker }
    }

    pub fn limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.limiter
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Admit one unit for `key`, then run `operation` through the breaker.
    ///
    /// # Errors
    /// `RateLimited` on denial, `Limiter` if the limiter failed, `Context` if `ctx`
    /// ended first, the breaker's rejections, or the operation's own error as `Inner`.
    pub async fn run<T, E, Fut, Op>(
        &self,
        ctx: &CallContext,
        key: &str,
        operation: Op,
    ) -> Result<T, ResilienceError<E>>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        if !self.limiter.allow(key).await? {
            return Err(RateLimitError::RateLimitExceeded { key: key.to_string() }.into());
        }
        self.breaker.call_with_context(ctx, operation).await
    }

    /// Like [`run`](Self::run), but waits for rate limit capacity instead of
    /// failing fast. The wait is bounded by `ctx`.
    pub async fn run_waiting<T, E, Fut, Op>(
        &self,
        ctx: &CallContext,
        key: &str,
        operation: Op,
    ) -> Result<T, ResilienceError<E>>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.limiter.wait(ctx, key).await?;
        self.breaker.call_with_context(ctx, operation).await
    }
}
