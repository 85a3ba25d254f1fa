#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Floodgate
//!
//! Overload protection for async Rust: rate limiters that admit or deny work per
//! key, and a circuit breaker that fails fast while a dependency is unhealthy.
//!
//! ## Features
//!
//! - **Local token buckets** keyed by caller, with an idle-key sweeper
//! - **Distributed limiters** (token bucket, sliding window, fixed window, leaky
//!   bucket) whose every admission is one atomic store procedure
//! - **Circuit breaker** with Closed / Open / Half-Open states and generation-scoped counts
//! - **Tower layers** for both, plus a [`Guard`] composing them
//! - **Structured errors** carrying an [`ErrorCode`]
//!
//! ## Quick Start
//!
//! ```rust
//! use floodgate::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let limiter = LocalTokenBucketLimiter::new(LimiterConfig::new(100.0, 20).unwrap()).unwrap();
//!     let breaker = CircuitBreaker::new(BreakerConfig::new("inventory"));
//!     let guard = Guard::new(Arc::new(limiter), breaker);
//!
//!     let result = guard
//!         .run(&CallContext::background(), "user:42", || async {
//!             // Your downstream call here
//!             Ok::<_, std::io::Error>(())
//!         })
//!         .await;
//!     assert!(result.is_ok());
//! }
//! ```

pub mod circuit_breaker;
pub mod circuit_breaker_registry;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod prelude;
pub mod rate_limit;
pub mod sleeper;
pub mod telemetry;

// Re-exports
pub use circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitBreakerLayer, CircuitState, Counts};
pub use circuit_breaker_registry::CircuitBreakerRegistry;
pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use config::{Algorithm, BreakerSettings, LimiterConfig, TripPolicy};
pub use context::CallContext;
pub use error::{ConfigError, ContextError, ErrorCode, RateLimitError, ResilienceError};
pub use guard::Guard;
pub use rate_limit::{
    AtomicStore, DistributedLimiter, InMemoryStore, LocalTokenBucketLimiter, RateLimitLayer,
    RateLimiter,
};
pub use sleeper::{ClockSleeper, Sleeper, TokioSleeper};
