//! Admission math shared by the in-process limiter and the in-memory store.
//!
//! Backends that evaluate these procedures server-side (see `floodgate-redis`)
//! must reproduce them exactly.

use std::collections::VecDeque;
use std::time::Duration;

/// Width of the sliding and fixed windows.
pub const WINDOW: Duration = Duration::from_secs(1);

// Absorbs float drift so `k` refills of `1/rate` seconds always buy `k` tokens.
const TOKEN_EPSILON: f64 = 1e-9;

/// Token bucket state: current tokens and the time of the last refill.
///
/// Replenishes at `rate` tokens per second, up to `burst`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucket {
    tokens: f64,
    last_refill: Duration,
}

impl TokenBucket {
    /// A full bucket, as every key starts.
    pub fn full(burst: f64, now: Duration) -> Self {
        Self { tokens: burst, last_refill: now }
    }

    /// Refill for the time elapsed since the last attempt, then try to take `n`.
    ///
    /// The refill timestamp advances even when the attempt is denied.
    pub fn try_take(&mut self, now: Duration, rate: f64, burst: f64, n: f64) -> bool {
        let elapsed = now.saturating_sub(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(burst);
        self.last_refill = self.last_refill.max(now);

        if self.tokens + TOKEN_EPSILON >= n {
            self.tokens = (self.tokens - n).max(0.0);
            true
        } else {
            false
        }
    }

    pub fn last_refill(&self) -> Duration {
        self.last_refill
    }
}

/// Sliding log of accepted-request timestamps (nanoseconds), kept sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlidingLog {
    entries: VecDeque<u128>,
}

impl SlidingLog {
    /// Drop entries older than `now - window`, then admit `n` iff
    /// `remaining + n <= limit`. Denied attempts record nothing.
    pub fn try_record(&mut self, now: Duration, window: Duration, limit: f64, n: u32) -> bool {
        let now = now.as_nanos();
        let floor = now.saturating_sub(window.as_nanos());
        while self.entries.front().is_some_and(|&t| t < floor) {
            self.entries.pop_front();
        }

        if (self.entries.len() as f64) + f64::from(n) > limit {
            return false;
        }
        let at = self.entries.partition_point(|&t| t <= now);
        for _ in 0..n {
            self.entries.insert(at, now);
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Index of the fixed window containing `now`.
pub fn window_index(now: Duration) -> u64 {
    now.as_secs()
}
