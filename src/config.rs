//! Limiter and breaker configuration.
//!
//! Both configs deserialize with `serde` so they can live in whatever settings
//! file the host application already loads. Durations are integer milliseconds.

use crate::circuit_breaker::{BreakerConfig, Counts};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Idle expiry applied to limiter state when none is configured.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Longest accepted idle expiry (one year).
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

/// Rate limiting algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    TokenBucket,
    SlidingWindow,
    /// Per-second counter. Admits up to `2 * rate` across a window boundary in
    /// exchange for O(1) state.
    FixedWindow,
    LeakyBucket,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::TokenBucket,
        Algorithm::SlidingWindow,
        Algorithm::FixedWindow,
        Algorithm::LeakyBucket,
    ];

    /// Name used in store key namespaces: `ratelimit:<name>:<key>`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::TokenBucket => "token_bucket",
            Algorithm::SlidingWindow => "sliding_window",
            Algorithm::FixedWindow => "fixed_window",
            Algorithm::LeakyBucket => "leaky_bucket",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownAlgorithm(s.to_string()))
    }
}

/// Validated limiter parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLimiterConfig", into = "RawLimiterConfig")]
pub struct LimiterConfig {
    rate: f64,
    burst: u32,
    ttl: Duration,
    algorithm: Algorithm,
}

impl LimiterConfig {
    /// Token-bucket config refilling `rate` permits per second up to `burst`.
    ///
    /// # Examples
    /// ```
    /// use floodgate::config::{Algorithm, LimiterConfig};
    /// let cfg = LimiterConfig::new(10.0, 20).unwrap().with_algorithm(Algorithm::SlidingWindow);
    /// assert_eq!(cfg.burst(), 20);
    /// ```
    pub fn new(rate: f64, burst: u32) -> Result<Self, ConfigError> {
        let cfg = Self { rate, burst, ttl: DEFAULT_TTL, algorithm: Algorithm::TokenBucket };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(ConfigError::InvalidRate(self.rate));
        }
        if self.burst == 0 {
            return Err(ConfigError::InvalidBurst(self.burst));
        }
        if self.ttl.is_zero() || self.ttl > MAX_TTL {
            return Err(ConfigError::InvalidTtl { ttl: self.ttl, max: MAX_TTL });
        }
        if matches!(self.algorithm, Algorithm::SlidingWindow | Algorithm::FixedWindow)
            && self.rate < 1.0
        {
            return Err(ConfigError::RateBelowWindow { algorithm: self.algorithm, rate: self.rate });
        }
        Ok(())
    }

    /// Expiry applied to bucket state: `ttl`, but never shorter than a full
    /// refill, so a drained key cannot expire back to a full bucket early.
    pub fn state_ttl(&self) -> Duration {
        let refill = (f64::from(self.burst) / self.rate).ceil();
        let refill = Duration::try_from_secs_f64(refill).unwrap_or(Duration::MAX);
        self.ttl.max(refill)
    }

    /// Permits per second. For the window algorithms this is the per-window limit.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Bucket capacity.
    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Idle expiry for per-key state.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

#[derive(Serialize, Deserialize)]
struct RawLimiterConfig {
    rate: f64,
    burst: u32,
    #[serde(default = "default_ttl_ms")]
    ttl_ms: u64,
    #[serde(default)]
    algorithm: Algorithm,
}

fn default_ttl_ms() -> u64 {
    DEFAULT_TTL.as_millis() as u64
}

impl TryFrom<RawLimiterConfig> for LimiterConfig {
    type Error = ConfigError;

    fn try_from(raw: RawLimiterConfig) -> Result<Self, Self::Error> {
        let cfg = Self {
            rate: raw.rate,
            burst: raw.burst,
            ttl: Duration::from_millis(raw.ttl_ms),
            algorithm: raw.algorithm,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

impl From<LimiterConfig> for RawLimiterConfig {
    fn from(cfg: LimiterConfig) -> Self {
        Self {
            rate: cfg.rate,
            burst: cfg.burst,
            ttl_ms: u64::try_from(cfg.ttl.as_millis()).unwrap_or(u64::MAX),
            algorithm: cfg.algorithm,
        }
    }
}

/// When a closed breaker should trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TripPolicy {
    /// Trip once this many calls fail in a row.
    ConsecutiveFailures { threshold: u32 },
    /// Trip once `failures / requests >= ratio`, after at least `min_requests` calls.
    FailureRate { ratio: f64, min_requests: u32 },
}

impl Default for TripPolicy {
    fn default() -> Self {
        TripPolicy::ConsecutiveFailures { threshold: 5 }
    }
}

impl TripPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            TripPolicy::FailureRate { ratio, .. } if !(ratio > 0.0 && ratio <= 1.0) => {
                Err(ConfigError::InvalidFailureRatio(ratio))
            }
            _ => Ok(()),
        }
    }

    /// Evaluate the policy against a statistics snapshot.
    pub fn should_trip(&self, counts: &Counts) -> bool {
        match *self {
            TripPolicy::ConsecutiveFailures { threshold } => {
                counts.consecutive_failures >= threshold.max(1)
            }
            TripPolicy::FailureRate { ratio, min_requests } => {
                counts.requests >= min_requests.max(1) && counts.failure_rate() >= ratio
            }
        }
    }
}

/// Serializable subset of [`BreakerConfig`]; observers and clocks are attached in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSettings {
    pub name: String,
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default)]
    pub interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub trip: TripPolicy,
}

fn default_max_requests() -> u32 {
    1
}

fn default_timeout_ms() -> u64 {
    60_000
}

impl BreakerSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_requests: default_max_requests(),
            interval_ms: 0,
            timeout_ms: default_timeout_ms(),
            trip: TripPolicy::default(),
        }
    }

    /// Build a breaker config; fails on a zero probe quota or an out-of-range ratio.
    pub fn into_config(self) -> Result<BreakerConfig, ConfigError> {
        self.trip.validate()?;
        let trip = self.trip;
        BreakerConfig::builder(self.name)
            .max_requests(self.max_requests)
            .interval(Duration::from_millis(self.interval_ms))
            .timeout(Duration::from_millis(self.timeout_ms))
            .ready_to_trip(move |counts| trip.should_trip(counts))
            .build()
    }
}
