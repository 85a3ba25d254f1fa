//! Error types for limiters and breakers
use crate::config::Algorithm;
use std::fmt;
use std::time::Duration;

/// Boxed error returned by storage backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structured tag carried by every error in this crate.
///
/// Adapters map codes to user-visible behavior (HTTP 429 vs 503, fallbacks)
/// without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidKey,
    InvalidPermits,
    ConfigInvalid,
    RateLimitExceeded,
    BackendUnavailable,
    OpenState,
    TooManyRequests,
    Canceled,
    DeadlineExceeded,
    Inner,
}

impl ErrorCode {
    /// Stable upper-case identifier, suitable for logs and response bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidKey => "INVALID_KEY",
            ErrorCode::InvalidPermits => "INVALID_PERMITS",
            ErrorCode::ConfigInvalid => "CONFIG_INVALID",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::BackendUnavailable => "BACKEND_UNAVAILABLE",
            ErrorCode::OpenState => "OPEN_STATE",
            ErrorCode::TooManyRequests => "TOO_MANY_REQUESTS",
            ErrorCode::Canceled => "CANCELED",
            ErrorCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ErrorCode::Inner => "INNER",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid limiter or breaker configuration, detected at construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("rate must be a finite value > 0 (got {0})")]
    InvalidRate(f64),
    #[error("burst must be >= 1 (got {0})")]
    InvalidBurst(u32),
    #[error("ttl must be within (0, {max:?}] (got {ttl:?})")]
    InvalidTtl { ttl: Duration, max: Duration },
    /// Window algorithms count whole requests per second.
    #[error("{algorithm} needs rate >= 1 request per window (got {rate})")]
    RateBelowWindow { algorithm: Algorithm, rate: f64 },
    #[error("max_requests must be >= 1 (got {0})")]
    InvalidMaxRequests(u32),
    #[error("failure ratio must be within (0, 1] (got {0})")]
    InvalidFailureRatio(f64),
    #[error("unknown rate limiting algorithm '{0}'")]
    UnknownAlgorithm(String),
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::ConfigInvalid
    }
}

/// The caller's context ended before the operation could run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl ContextError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ContextError::Canceled => ErrorCode::Canceled,
            ContextError::DeadlineExceeded => ErrorCode::DeadlineExceeded,
        }
    }
}

/// Per-call errors from a [`RateLimiter`](crate::rate_limit::RateLimiter).
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The limiting key was empty.
    #[error("rate limit key must not be empty")]
    InvalidKey,
    /// Zero permits were requested.
    #[error("permits must be >= 1")]
    InvalidPermits,
    /// Capacity was exhausted; only produced by the `check*` helpers.
    #[error("rate limit exceeded for key '{key}'")]
    RateLimitExceeded { key: String },
    /// The backing store failed; the caller decides between failing open or closed.
    #[error("{algorithm} backend failed: {source}")]
    Backend {
        algorithm: Algorithm,
        #[source]
        source: BoxError,
    },
    #[error(transparent)]
    Context(#[from] ContextError),
}

impl RateLimitError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RateLimitError::InvalidKey => ErrorCode::InvalidKey,
            RateLimitError::InvalidPermits => ErrorCode::InvalidPermits,
            RateLimitError::RateLimitExceeded { .. } => ErrorCode::RateLimitExceeded,
            RateLimitError::Backend { .. } => ErrorCode::BackendUnavailable,
            RateLimitError::Context(e) => e.code(),
        }
    }

    /// True when the backing store could not be reached or failed mid-procedure.
    pub fn is_backend(&self) -> bool {
        matches!(self, RateLimitError::Backend { .. })
    }

    pub(crate) fn backend(algorithm: Algorithm, source: impl Into<BoxError>) -> Self {
        RateLimitError::Backend { algorithm, source: source.into() }
    }
}

/// Unified error returned by guarded calls.
///
/// Rejections (`CircuitOpen`, `TooManyRequests`, `RateLimited`) are kept apart from
/// `Inner` so a caller can apply a fallback without the rejection ever counting
/// as a downstream failure.
#[derive(Debug)]
pub enum ResilienceError<E> {
    /// The breaker is open and the wrapped function was not invoked.
    CircuitOpen { name: String, remaining: Duration },
    /// The half-open probe quota is used up.
    TooManyRequests { name: String, max_requests: u32 },
    /// The limiter denied the request.
    RateLimited { key: String },
    /// The limiter itself failed (bad key, backend outage).
    Limiter(RateLimitError),
    /// The caller's context ended first.
    Context(ContextError),
    /// The underlying operation failed
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen { name, remaining } => {
                write!(f, "circuit breaker '{}' is open (retry in {:?})", name, remaining)
            }
            Self::TooManyRequests { name, max_requests } => write!(
                f,
                "circuit breaker '{}' is half-open and its {} probe(s) are in use",
                name, max_requests
            ),
            Self::RateLimited { key } => write!(f, "rate limit exceeded for key '{}'", key),
            Self::Limiter(e) => write!(f, "rate limiter failed: {}", e),
            Self::Context(e) => write!(f, "{}", e),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ResilienceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Limiter(e) => Some(e),
            Self::Context(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<RateLimitError> for ResilienceError<E> {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::RateLimitExceeded { key } => ResilienceError::RateLimited { key },
            RateLimitError::Context(e) => ResilienceError::Context(e),
            other => ResilienceError::Limiter(other),
        }
    }
}

impl<E> From<ContextError> for ResilienceError<E> {
    fn from(err: ContextError) -> Self {
        ResilienceError::Context(err)
    }
}

impl<E> ResilienceError<E> {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::CircuitOpen { .. } => ErrorCode::OpenState,
            Self::TooManyRequests { .. } => ErrorCode::TooManyRequests,
            Self::RateLimited { .. } => ErrorCode::RateLimitExceeded,
            Self::Limiter(e) => e.code(),
            Self::Context(e) => e.code(),
            Self::Inner(_) => ErrorCode::Inner,
        }
    }

    /// Check if this error is due to an open breaker
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Check if the half-open probe quota rejected the call
    pub fn is_too_many_requests(&self) -> bool {
        matches!(self, Self::TooManyRequests { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// True for every rejection issued before the protected function ran.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::TooManyRequests { .. } | Self::RateLimited { .. })
    }

    pub fn is_context(&self) -> bool {
        matches!(self, Self::Context(_))
    }

    /// Check if this error wraps an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}
