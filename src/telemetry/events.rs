use crate::circuit_breaker::CircuitState;
use crate::error::ErrorCode;
use std::fmt;

/// Events emitted by limiters and breakers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyEvent {
    /// Rate limiter events
    RateLimit(RateLimitEvent),
    /// Circuit breaker events
    CircuitBreaker(CircuitBreakerEvent),
}

/// Events emitted where a request meets a rate limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitEvent {
    /// The limiter had no capacity for the request.
    Denied {
        key: String,
        permits: u32,
    },
    /// The limiter could not decide, e.g. its store was unreachable.
    Failed {
        key: String,
        code: ErrorCode,
    },
}

/// Events emitted by circuit breakers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitBreakerEvent {
    /// The breaker moved between states; a new generation has started.
    StateChanged {
        name: String,
        from: CircuitState,
        to: CircuitState,
    },
}

impl fmt::Display for PolicyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyEvent::RateLimit(e) => write!(f, "RateLimit::{}", e),
            PolicyEvent::CircuitBreaker(e) => write!(f, "CircuitBreaker::{}", e),
        }
    }
}

impl fmt::Display for RateLimitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitEvent::Denied { key, permits } => {
                write!(f, "Denied(key={}, permits={})", key, permits)
            }
            RateLimitEvent::Failed { key, code } => write!(f, "Failed(key={}, code={})", key, code),
        }
    }
}

impl fmt::Display for CircuitBreakerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitBreakerEvent::StateChanged { name, from, to } => {
                write!(f, "StateChanged({}: {} -> {})", name, from, to)
            }
        }
    }
}
