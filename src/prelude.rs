//! Convenient re-exports for common Floodgate types.
pub use crate::{
    circuit_breaker::{
        BreakerConfig, CircuitBreaker, CircuitBreakerLayer, CircuitState, Counts,
    },
    config::{Algorithm, LimiterConfig, TripPolicy},
    context::CallContext,
    error::{ErrorCode, RateLimitError, ResilienceError},
    guard::Guard,
    rate_limit::{
        DistributedLimiter, InMemoryStore, LocalTokenBucketLimiter, RateLimitLayer, RateLimiter,
    },
    CircuitBreakerRegistry,
};
