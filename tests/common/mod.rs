#![allow(dead_code)]

use floodgate::circuit_breaker::{BreakerConfig, CircuitBreaker};
use floodgate::clock::ManualClock;
use floodgate::ResilienceError;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downstream(pub &'static str);

impl fmt::Display for Downstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "downstream failed: {}", self.0)
    }
}

impl std::error::Error for Downstream {}

/// Breaker tripping on five consecutive failures, with a 30s open timeout.
pub fn breaker(clock: &ManualClock, max_requests: u32) -> CircuitBreaker {
    let config = BreakerConfig::builder("downstream")
        .max_requests(max_requests)
        .timeout(Duration::from_secs(30))
        .ready_to_trip(|c| c.consecutive_failures >= 5)
        .clock(clock.clone())
        .build()
        .expect("valid breaker config");
    CircuitBreaker::new(config)
}

pub async fn fail(breaker: &CircuitBreaker) -> Result<(), ResilienceError<Downstream>> {
    breaker.call(|| async { Err(Downstream("boom")) }).await
}

pub async fn succeed(breaker: &CircuitBreaker) -> Result<&'static str, ResilienceError<Downstream>> {
    breaker.call(|| async { Ok("ok") }).await
}
