//! Three-state circuit breaker with generation-scoped statistics.
//!
//! ```text
//! Closed ──ready_to_trip(counts)──▶ Open ──timeout──▶ HalfOpen
//!   ▲                                 ▲                  │
//!   └──── max_requests successes ─────┼──────────────────┤
//!                                     └──── any failure ─┘
//! ```
//!
//! Every transition, and every Closed-state `interval` rollover, starts a new
//! generation with zeroed [`Counts`]. Outcomes reported by calls admitted under an
//! older generation are discarded.

use crate::clock::{Clock, MonotonicClock};
use crate::config::TripPolicy;
use crate::context::CallContext;
use crate::error::{ConfigError, ResilienceError};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

mod counts;
pub mod layer;

pub use counts::Counts;
pub use layer::{CircuitBreakerLayer, CircuitBreakerService};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Normal operating mode.
    Closed,
    /// Short-circuits calls until the timeout elapses.
    Open,
    /// Probe mode allowing a limited number of calls to test recovery.
    HalfOpen,
}

impl CircuitState {
    /// Observer-facing name: `CLOSED`, `OPEN` or `HALF_OPEN`.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicate deciding whether a closed breaker trips.
pub type TripFn = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;
/// Observer invoked as `(name, from, to)` after each transition, outside the state lock.
pub type StateChangeFn = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Validated configuration for a named breaker.
#[derive(Clone)]
pub struct BreakerConfig {
    name: String,
    /// Probe quota while Half-Open.
    pub(crate) max_requests: u32,
    /// Closed-state statistics period; zero disables rollover.
    pub(crate) interval: Duration,
    /// Delay before an open breaker admits probes.
    pub(crate) timeout: Duration,
    ready_to_trip: TripFn,
    on_state_change: Option<StateChangeFn>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for BreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerConfig")
            .field("name", &self.name)
            .field("max_requests", &self.max_requests)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("on_state_change", &self.on_state_change.is_some())
            .field("clock", &self.clock)
            .finish()
    }
}

impl BreakerConfig {
    /// Defaults: one probe, no Closed rollover, 60s open timeout, trip on five
    /// consecutive failures.
    pub fn new(name: impl Into<String>) -> Self {
        let trip = TripPolicy::default();
        Self {
            name: name.into(),
            max_requests: 1,
            interval: Duration::ZERO,
            timeout: DEFAULT_TIMEOUT,
            ready_to_trip: Arc::new(move |counts| trip.should_trip(counts)),
            on_state_change: None,
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    pub fn builder(name: impl Into<String>) -> BreakerConfigBuilder {
        BreakerConfigBuilder { config: Self::new(name) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for [`BreakerConfig`].
#[derive(Debug)]
pub struct BreakerConfigBuilder {
    config: BreakerConfig,
}

impl BreakerConfigBuilder {
    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.config.max_requests = max_requests;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// A zero timeout falls back to 60s.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = if timeout.is_zero() { DEFAULT_TIMEOUT } else { timeout };
        self
    }

    pub fn ready_to_trip<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Counts) -> bool + Send + Sync + 'static,
    {
        self.config.ready_to_trip = Arc::new(predicate);
        self
    }

    pub fn on_state_change<F>(mut self, observer: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.config.on_state_change = Some(Arc::new(observer));
        self
    }

    /// Override the clock (useful for deterministic tests).
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.config.clock = Arc::new(clock);
        self
    }

    pub fn build(self) -> Result<BreakerConfig, ConfigError> {
        if self.config.max_requests == 0 {
            return Err(ConfigError::InvalidMaxRequests(0));
        }
        Ok(self.config)
    }
}

type Transition = (CircuitState, CircuitState);

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    /// End of the current Closed interval or Open timeout.
    expiry: Option<Duration>,
}

impl BreakerState {
    fn new(config: &BreakerConfig, now: Duration) -> Self {
        let mut s =
            Self { state: CircuitState::Closed, generation: 0, counts: Counts::default(), expiry: None };
        s.expiry = s.expiry_from(config, now);
        s
    }

    /// Apply time-driven changes and return the state calls should observe.
    fn current(&mut self, config: &BreakerConfig, now: Duration) -> (CircuitState, Option<Transition>) {
        let expired = self.expiry.is_some_and(|expiry| expiry <= now);
        let transition = match self.state {
            CircuitState::Closed if expired => {
                self.new_generation(config, now);
                None
            }
            CircuitState::Open if expired => self.set_state(config, CircuitState::HalfOpen, now),
            _ => None,
        };
        (self.state, transition)
    }

    /// Effective state without mutating anything.
    fn peek(&self, now: Duration) -> (CircuitState, Counts) {
        let expired = self.expiry.is_some_and(|expiry| expiry <= now);
        match self.state {
            CircuitState::Closed if expired => (CircuitState::Closed, Counts::default()),
            CircuitState::Open if expired => (CircuitState::HalfOpen, Counts::default()),
            state => (state, self.counts),
        }
    }

    fn set_state(&mut self, config: &BreakerConfig, to: CircuitState, now: Duration) -> Option<Transition> {
        if self.state == to {
            return None;
        }
        let from = self.state;
        self.state = to;
        self.new_generation(config, now);
        Some((from, to))
    }

    fn new_generation(&mut self, config: &BreakerConfig, now: Duration) {
        self.generation = self.generation.wrapping_add(1);
        self.counts.clear();
        self.expiry = self.expiry_from(config, now);
    }

    fn expiry_from(&self, config: &BreakerConfig, now: Duration) -> Option<Duration> {
        match self.state {
            CircuitState::Closed if config.interval.is_zero() => None,
            CircuitState::Closed => now.checked_add(config.interval),
            CircuitState::Open => Some(now.saturating_add(config.timeout)),
            CircuitState::HalfOpen => None,
        }
    }

    fn on_success(&mut self, config: &BreakerConfig, now: Duration) -> Option<Transition> {
        self.counts.on_success();
        if self.state == CircuitState::HalfOpen
            && self.counts.consecutive_successes >= config.max_requests
        {
            return self.set_state(config, CircuitState::Closed, now);
        }
        None
    }

    fn on_failure(&mut self, config: &BreakerConfig, now: Duration) -> Option<Transition> {
        match self.state {
            CircuitState::Closed => {
                self.counts.on_failure();
                if (config.ready_to_trip)(&self.counts) {
                    return self.set_state(config, CircuitState::Open, now);
                }
                None
            }
            CircuitState::HalfOpen => self.set_state(config, CircuitState::Open, now),
            CircuitState::Open => None,
        }
    }
}

struct Shared {
    config: BreakerConfig,
    state: RwLock<BreakerState>,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, BreakerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BreakerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> Duration {
        self.config.clock.now()
    }

    fn before_request<E>(&self) -> Result<u64, ResilienceError<E>> {
        let now = self.now();
        let mut guard = self.write();
        let (state, transition) = guard.current(&self.config, now);
        let admitted = match state {
            CircuitState::Open => Err(ResilienceError::CircuitOpen {
                name: self.config.name.clone(),
                remaining: guard.expiry.map(|e| e.saturating_sub(now)).unwrap_or_default(),
            }),
            CircuitState::HalfOpen if guard.counts.requests >= self.config.max_requests => {
                Err(ResilienceError::TooManyRequests {
                    name: self.config.name.clone(),
                    max_requests: self.config.max_requests,
                })
            }
            _ => {
                guard.counts.on_request();
                Ok(guard.generation)
            }
        };
        drop(guard);
        self.notify(transition);
        admitted
    }

    fn after_request(&self, generation: u64, success: bool) {
        let now = self.now();
        let mut guard = self.write();
        let (_, rolled) = guard.current(&self.config, now);
        let transition = if guard.generation != generation {
            None
        } else if success {
            guard.on_success(&self.config, now)
        } else {
            guard.on_failure(&self.config, now)
        };
        drop(guard);
        self.notify(rolled);
        self.notify(transition);
    }

    fn abandon(&self, generation: u64) {
        let mut guard = self.write();
        if guard.generation == generation {
            guard.counts.on_abandon();
        }
    }

    fn notify(&self, transition: Option<Transition>) {
        let Some((from, to)) = transition else { return };
        let name = self.config.name.as_str();
        match to {
            CircuitState::Open if from == CircuitState::HalfOpen => {
                tracing::warn!(breaker = name, "Circuit breaker: probe failed → open")
            }
            CircuitState::Open => tracing::error!(breaker = name, "Circuit breaker → open"),
            CircuitState::HalfOpen => tracing::info!(breaker = name, "Circuit breaker → half-open"),
            CircuitState::Closed => tracing::info!(breaker = name, from = %from, "Circuit breaker → closed"),
        }
        if let Some(observer) = &self.config.on_state_change {
            observer(name, from, to);
        }
    }
}

/// Reports the outcome of an admitted call exactly once, even if the call panics
/// or its future is dropped.
struct OutcomeGuard<'a> {
    shared: &'a Shared,
    generation: u64,
    armed: bool,
}

impl OutcomeGuard<'_> {
    fn finish(mut self, success: bool) {
        self.armed = false;
        self.shared.after_request(self.generation, success);
    }
}

impl Drop for OutcomeGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if std::thread::panicking() {
            self.shared.after_request(self.generation, false);
        } else {
            // Dropped before completing: release the slot without recording an outcome.
            self.shared.abandon(self.generation);
        }
    }
}

/// Circuit breaker guarding arbitrary async calls.
///
/// Clones share the same underlying state via `Arc`, so all handles observe and
/// affect the same lifecycle.
#[derive(Clone)]
pub struct CircuitBreaker {
    shared: Arc<Shared>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.shared.config.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// # Examples
    /// ```
    /// use floodgate::circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitState};
    /// let breaker = CircuitBreaker::new(BreakerConfig::new("inventory"));
    /// assert_eq!(breaker.state(), CircuitState::Closed);
    /// ```
    pub fn new(config: BreakerConfig) -> Self {
        let now = config.clock.now();
        let state = BreakerState::new(&config, now);
        Self { shared: Arc::new(Shared { config, state: RwLock::new(state) }) }
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.shared.config
    }

    /// Point-in-time state. An open breaker whose timeout has elapsed reads as
    /// `HalfOpen`; the transition itself happens on the next call.
    pub fn state(&self) -> CircuitState {
        let now = self.shared.now();
        self.shared.read().peek(now).0
    }

    /// Statistics of the current generation.
    pub fn counts(&self) -> Counts {
        let now = self.shared.now();
        self.shared.read().peek(now).1
    }

    pub fn generation(&self) -> u64 {
        self.shared.read().generation
    }

    /// Force Closed with zeroed counts and a fresh generation.
    pub fn reset(&self) {
        let now = self.shared.now();
        let mut guard = self.shared.write();
        let from = guard.state;
        guard.state = CircuitState::Closed;
        guard.new_generation(&self.shared.config, now);
        drop(guard);
        tracing::debug!(breaker = self.name(), from = %from, "Circuit breaker reset");
        if from != CircuitState::Closed {
            self.shared.notify(Some((from, CircuitState::Closed)));
        }
    }

    /// Executes `operation` under breaker protection; every `Err` counts as a failure.
    ///
    /// # Errors
    /// `CircuitOpen` while open, `TooManyRequests` once the half-open quota is used,
    /// otherwise the operation's own error wrapped in `Inner`.
    pub async fn call<T, E, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError<E>>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_classified(&CallContext::background(), operation, |_| true).await
    }

    /// Like [`call`](Self::call), but refuses to start once `ctx` has ended and stops
    /// waiting if it ends mid-flight. Cancellation never counts as a failure.
    pub async fn call_with_context<T, E, Fut, Op>(
        &self,
        ctx: &CallContext,
        operation: Op,
    ) -> Result<T, ResilienceError<E>>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_classified(ctx, operation, |_| true).await
    }

    /// Full form: `is_failure` decides which errors count against the breaker.
    /// Errors it rejects are still returned to the caller but recorded as successes.
    pub async fn call_classified<T, E, Fut, Op, C>(
        &self,
        ctx: &CallContext,
        operation: Op,
        is_failure: C,
    ) -> Result<T, ResilienceError<E>>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnOnce(&E) -> bool,
    {
        if let Some(err) = ctx.err() {
            return Err(ResilienceError::Context(err));
        }

        let generation = self.shared.before_request()?;
        let guard = OutcomeGuard { shared: &self.shared, generation, armed: true };

        let result = tokio::select! {
            biased;
            result = operation() => result,
            reason = ctx.done() => return Err(ResilienceError::Context(reason)),
        };

        let success = match &result {
            Ok(_) => true,
            Err(e) => !is_failure(e),
        };
        guard.finish(success);
        result.map_err(ResilienceError::Inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    fn breaker(clock: &ManualClock, max_requests: u32) -> CircuitBreaker {
        let config = BreakerConfig::builder("test")
            .max_requests(max_requests)
            .timeout(Duration::from_secs(10))
            .ready_to_trip(|c| c.consecutive_failures >= 2)
            .clock(clock.clone())
            .build()
            .expect("valid config");
        CircuitBreaker::new(config)
    }

    async fn fail(b: &CircuitBreaker) -> Result<(), ResilienceError<TestError>> {
        b.call(|| async { Err::<(), _>(TestError("fail".into())) }).await
    }

    async fn succeed(b: &CircuitBreaker) -> Result<u32, ResilienceError<TestError>> {
        b.call(|| async { Ok::<_, TestError>(7) }).await
    }

    #[test]
    fn rejects_zero_max_requests() {
        let err = BreakerConfig::builder("x").max_requests(0).build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidMaxRequests(0));
    }

    #[test]
    fn zero_timeout_falls_back_to_default() {
        let cfg = BreakerConfig::builder("x").timeout(Duration::ZERO).build().unwrap();
        assert_eq!(cfg.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn state_names_match_observer_strings() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
    }

    #[tokio::test]
    async fn open_breaker_never_invokes_operation() {
        let clock = ManualClock::new();
        let b = breaker(&clock, 1);
        let _ = fail(&b).await;
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);

        let invoked = AtomicUsize::new(0);
        let result = b
            .call(|| {
                invoked.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TestError>(()) }
            })
            .await;
        assert!(result.unwrap_err().is_circuit_open());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn open_rejection_reports_remaining_timeout() {
        let clock = ManualClock::new();
        let b = breaker(&clock, 1);
        let _ = fail(&b).await;
        let _ = fail(&b).await;
        clock.advance(Duration::from_secs(4));
        match succeed(&b).await.unwrap_err() {
            ResilienceError::CircuitOpen { name, remaining } => {
                assert_eq!(name, "test");
                assert_eq!(remaining, Duration::from_secs(6));
            }
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn state_read_does_not_transition() {
        let clock = ManualClock::new();
        let b = breaker(&clock, 1);
        let _ = fail(&b).await;
        let _ = fail(&b).await;
        let generation = b.generation();
        clock.advance(Duration::from_secs(10));

        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert_eq!(b.generation(), generation, "reading state must not start a generation");
    }

    #[tokio::test]
    async fn half_open_quota_rejects_extra_probes() {
        let clock = ManualClock::new();
        let b = breaker(&clock, 2);
        let _ = fail(&b).await;
        let _ = fail(&b).await;
        clock.advance(Duration::from_secs(10));

        let (tx1, rx1) = tokio::sync::oneshot::channel::<()>();
        let (tx2, rx2) = tokio::sync::oneshot::channel::<()>();
        let b1 = b.clone();
        let p1 = tokio::spawn(async move {
            b1.call(|| async move {
                let _ = rx1.await;
                Ok::<_, TestError>(())
            })
            .await
        });
        let b2 = b.clone();
        let p2 = tokio::spawn(async move {
            b2.call(|| async move {
                let _ = rx2.await;
                Ok::<_, TestError>(())
            })
            .await
        });
        while b.counts().requests < 2 {
            tokio::task::yield_now().await;
        }

        let third = succeed(&b).await.unwrap_err();
        assert!(third.is_too_many_requests());
        assert_eq!(b.state(), CircuitState::HalfOpen);

        tx1.send(()).unwrap();
        tx2.send(()).unwrap();
        assert!(p1.await.unwrap().is_ok());
        assert!(p2.await.unwrap().is_ok());
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.counts(), Counts::default());
    }

    #[tokio::test]
    async fn stale_generation_outcomes_are_ignored() {
        let clock = ManualClock::new();
        let b = breaker(&clock, 1);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let b1 = b.clone();
        let slow = tokio::spawn(async move {
            b1.call(|| async move {
                let _ = rx.await;
                Err::<(), _>(TestError("late".into()))
            })
            .await
        });
        while b.counts().requests < 1 {
            tokio::task::yield_now().await;
        }

        b.reset();
        tx.send(()).unwrap();
        assert!(slow.await.unwrap().unwrap_err().is_inner());
        assert_eq!(b.counts().total_failures, 0, "failure from the old generation was counted");
    }

    #[tokio::test]
    async fn closed_interval_rolls_counts_over() {
        let clock = ManualClock::new();
        let config = BreakerConfig::builder("rolling")
            .interval(Duration::from_secs(1))
            .ready_to_trip(|c| c.total_failures >= 3)
            .clock(clock.clone())
            .build()
            .unwrap();
        let b = CircuitBreaker::new(config);

        let _ = fail(&b).await;
        let _ = fail(&b).await;
        clock.advance(Duration::from_millis(1500));
        assert_eq!(b.counts(), Counts::default());
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.counts().total_failures, 1);
    }

    #[tokio::test]
    async fn classifier_can_excuse_errors() {
        let clock = ManualClock::new();
        let b = breaker(&clock, 1);
        for _ in 0..5 {
            let result = b
                .call_classified(
                    &CallContext::background(),
                    || async { Err::<(), _>(TestError("not found".into())) },
                    |e| e.0 != "not found",
                )
                .await;
            assert!(result.unwrap_err().is_inner());
        }
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.counts().total_successes, 5);
    }

    #[tokio::test]
    async fn canceled_context_is_not_a_failure() {
        let clock = ManualClock::new();
        let b = breaker(&clock, 1);
        let ctx = CallContext::background();
        ctx.cancel();
        let invoked = AtomicUsize::new(0);
        let result = b
            .call_with_context(&ctx, || {
                invoked.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TestError("x".into())) }
            })
            .await;
        assert!(result.unwrap_err().is_context());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(b.counts(), Counts::default());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_mid_flight_releases_probe_slot() {
        let clock = ManualClock::new();
        let b = breaker(&clock, 1);
        let _ = fail(&b).await;
        let _ = fail(&b).await;
        clock.advance(Duration::from_secs(10));

        let ctx = CallContext::with_timeout(Duration::from_millis(20));
        let result = b
            .call_with_context(&ctx, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, TestError>(())
            })
            .await;
        assert!(matches!(result, Err(ResilienceError::Context(crate::error::ContextError::DeadlineExceeded))));
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert_eq!(b.counts().requests, 0);

        assert_eq!(succeed(&b).await.unwrap(), 7);
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn panic_in_probe_counts_as_failure() {
        let clock = ManualClock::new();
        let b = breaker(&clock, 1);
        let _ = fail(&b).await;
        let _ = fail(&b).await;
        clock.advance(Duration::from_secs(10));

        let result = std::panic::AssertUnwindSafe(b.call(|| async {
            if true {
                panic!("boom");
            }
            Ok::<(), TestError>(())
        }))
        .catch_unwind()
        .await;
        assert!(result.is_err());
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn observer_sees_every_transition() {
        let clock = ManualClock::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let config = BreakerConfig::builder("observed")
            .ready_to_trip(|c| c.consecutive_failures >= 1)
            .timeout(Duration::from_secs(1))
            .clock(clock.clone())
            .on_state_change(move |name, from, to| {
                sink.lock().unwrap().push(format!("{name}:{from}->{to}"));
            })
            .build()
            .unwrap();
        let b = CircuitBreaker::new(config);

        let _ = fail(&b).await;
        clock.advance(Duration::from_secs(1));
        let _ = succeed(&b).await;
        let _ = fail(&b).await;
        b.reset();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "observed:CLOSED->OPEN",
                "observed:OPEN->HALF_OPEN",
                "observed:HALF_OPEN->CLOSED",
                "observed:CLOSED->OPEN",
                "observed:OPEN->CLOSED",
            ]
        );
    }
}
