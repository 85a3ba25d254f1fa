//! Telemetry for limiters and breakers.
//!
//! Events flow through [`TelemetrySink`] implementations, which are plain
//! `tower::Service<PolicyEvent>`s, so they can log, buffer, or forward events to
//! external systems.
//!
//! - **Rate limiting**: [`RateLimitEvent::Denied`], [`RateLimitEvent::Failed`],
//!   emitted by [`RateLimitLayer`](crate::rate_limit::RateLimitLayer) when given a sink.
//! - **Circuit breaker**: [`CircuitBreakerEvent::StateChanged`], emitted through
//!   [`state_change_observer`].
//!
//! ```rust
//! use floodgate::circuit_breaker::{BreakerConfig, CircuitBreaker};
//! use floodgate::telemetry::{state_change_observer, LogSink};
//!
//! let config = BreakerConfig::builder("search")
//!     .on_state_change(state_change_observer(LogSink))
//!     .build()
//!     .unwrap();
//! let _breaker = CircuitBreaker::new(config);
//! ```

pub mod events;
pub mod sinks;

pub use events::{CircuitBreakerEvent, PolicyEvent, RateLimitEvent};
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, TelemetrySink};

use crate::circuit_breaker::CircuitState;

/// Adapt `sink` into a breaker `on_state_change` observer.
///
/// Observers run synchronously inside `call`, so each event is emitted on a task
/// spawned onto the current tokio runtime. Outside a runtime the event is dropped.
pub fn state_change_observer<S>(sink: S) -> impl Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static
where
    S: TelemetrySink + Sync,
    S::Future: Send + 'static,
{
    move |name, from, to| {
        let event = PolicyEvent::CircuitBreaker(CircuitBreakerEvent::StateChanged {
            name: name.to_string(),
            from,
            to,
        });
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(emit_best_effort(sink.clone(), event));
            }
            Err(_) => tracing::trace!(event = %event, "No runtime; telemetry event dropped"),
        }
    }
}
