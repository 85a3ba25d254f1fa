use floodgate::clock::ManualClock;
use floodgate::config::{Algorithm, LimiterConfig};
use floodgate::context::CallContext;
use floodgate::error::{ConfigError, ContextError, RateLimitError};
use floodgate::rate_limit::{DistributedLimiter, InMemoryStore, LocalTokenBucketLimiter, RateLimiter};
use floodgate::sleeper::ClockSleeper;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const EPOCH: Duration = Duration::from_secs(1_700_000_000);

fn local(clock: &ManualClock, rate: f64, burst: u32) -> LocalTokenBucketLimiter {
    LocalTokenBucketLimiter::new(LimiterConfig::new(rate, burst).unwrap())
        .unwrap()
        .with_clock(clock.clone())
}

fn distributed(
    clock: &ManualClock,
    algorithm: Algorithm,
    rate: f64,
    burst: u32,
) -> DistributedLimiter<InMemoryStore> {
    let config = LimiterConfig::new(rate, burst).unwrap().with_algorithm(algorithm);
    DistributedLimiter::new(InMemoryStore::with_clock(clock.clone()), config)
        .unwrap()
        .with_clock(clock.clone())
}

/// Full burst once, then nothing, then one more after `1/rate` seconds.
async fn assert_token_bucket(limiter: &dyn RateLimiter, clock: &ManualClock, rate: f64, burst: u32) {
    assert!(limiter.allow_n("user:42", burst).await.unwrap());
    assert!(!limiter.allow("user:42").await.unwrap());
    clock.advance(Duration::from_secs_f64(1.0 / rate));
    assert!(limiter.allow("user:42").await.unwrap());
}

/// Idle for 100 * burst / rate seconds, still no more than `burst` tokens.
async fn assert_refill_cap(limiter: &dyn RateLimiter, clock: &ManualClock, rate: f64, burst: u32) {
    assert!(limiter.allow("user:7").await.unwrap());
    clock.advance(Duration::from_secs_f64(100.0 * f64::from(burst) / rate));
    assert!(!limiter.allow_n("user:7", burst + 1).await.unwrap());
    assert!(limiter.allow_n("user:7", burst).await.unwrap());
}

#[tokio::test]
async fn local_token_bucket_correctness() {
    let clock = ManualClock::starting_at(EPOCH);
    assert_token_bucket(&local(&clock, 20.0, 10), &clock, 20.0, 10).await;
    assert_refill_cap(&local(&clock, 20.0, 10), &clock, 20.0, 10).await;
}

#[tokio::test]
async fn distributed_token_bucket_correctness() {
    let clock = ManualClock::starting_at(EPOCH);
    assert_token_bucket(&distributed(&clock, Algorithm::TokenBucket, 20.0, 10), &clock, 20.0, 10)
        .await;
    assert_refill_cap(&distributed(&clock, Algorithm::TokenBucket, 20.0, 10), &clock, 20.0, 10)
        .await;
}

#[tokio::test]
async fn zero_ttl_is_rejected_at_construction() {
    let err = serde_json::from_str::<LimiterConfig>(r#"{"rate": 1.0, "burst": 2, "ttl_ms": 0}"#)
        .unwrap_err();
    assert!(err.to_string().contains("ttl must be"));

    let config = LimiterConfig::new(1.0, 2).unwrap().with_ttl(Duration::ZERO);
    assert!(matches!(
        DistributedLimiter::new(InMemoryStore::new(), config.clone()),
        Err(ConfigError::InvalidTtl { .. })
    ));
    assert!(matches!(LocalTokenBucketLimiter::new(config), Err(ConfigError::InvalidTtl { .. })));
}

#[tokio::test]
async fn short_ttl_does_not_refill_a_drained_key() {
    let clock = ManualClock::starting_at(EPOCH);
    let config = LimiterConfig::new(1.0, 10).unwrap().with_ttl(Duration::from_secs(1));
    let limiter = DistributedLimiter::new(InMemoryStore::with_clock(clock.clone()), config)
        .unwrap()
        .with_clock(clock.clone());

    assert!(limiter.allow_n("k", 10).await.unwrap());
    clock.advance(Duration::from_millis(1010));
    assert!(!limiter.allow_n("k", 10).await.unwrap(), "expired state must not read as a full bucket");
    assert!(limiter.allow("k").await.unwrap());
}

#[tokio::test]
async fn sliding_window_exactness() {
    let clock = ManualClock::starting_at(EPOCH);
    let limiter = distributed(&clock, Algorithm::SlidingWindow, 5.0, 5);
    for _ in 0..5 {
        assert!(limiter.allow("ip:203.0.113.9").await.unwrap());
    }
    clock.advance(Duration::from_millis(100));
    assert!(!limiter.allow("ip:203.0.113.9").await.unwrap());

    clock.set(EPOCH + Duration::from_millis(1100));
    assert!(limiter.allow("ip:203.0.113.9").await.unwrap());
}

#[tokio::test]
async fn fixed_window_boundary_admits_two_windows() {
    const RATE: u32 = 4;
    let clock = ManualClock::starting_at(EPOCH - Duration::from_millis(10));
    let limiter = distributed(&clock, Algorithm::FixedWindow, f64::from(RATE), RATE);

    let mut admitted = 0;
    for _ in 0..RATE {
        admitted += usize::from(limiter.allow("k").await.unwrap());
    }
    clock.advance(Duration::from_millis(20));
    for _ in 0..RATE {
        admitted += usize::from(limiter.allow("k").await.unwrap());
    }
    assert_eq!(admitted, 2 * RATE as usize, "2R burst across the boundary is expected");
    assert!(!limiter.allow("k").await.unwrap());
}

#[tokio::test]
async fn wait_respects_cancellation() {
    let clock = ManualClock::starting_at(EPOCH);
    let limiter = Arc::new(local(&clock, 1.0, 1));
    assert!(limiter.allow("k").await.unwrap());

    let ctx = CallContext::background();
    let waiter = {
        let limiter = limiter.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { limiter.wait(&ctx, "k").await })
    };
    tokio::task::yield_now().await;
    ctx.cancel();

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, RateLimitError::Context(ContextError::Canceled)));
}

#[tokio::test]
async fn wait_on_canceled_context_does_not_consume() {
    let clock = ManualClock::starting_at(EPOCH);
    let limiter = local(&clock, 1.0, 1);
    let ctx = CallContext::background();
    ctx.cancel();

    assert!(limiter.wait(&ctx, "k").await.is_err());
    assert!(limiter.allow("k").await.unwrap(), "the token must still be there");
}

#[tokio::test]
async fn wait_with_clock_sleeper_is_deterministic() {
    let clock = ManualClock::starting_at(EPOCH);
    let sleeper = ClockSleeper::new(clock.clone());
    let limiter = distributed(&clock, Algorithm::SlidingWindow, 2.0, 2)
        .with_sleeper(sleeper.clone())
        .with_poll_interval(Duration::from_millis(250));

    assert!(limiter.allow_n("k", 2).await.unwrap());
    limiter.wait(&CallContext::background(), "k").await.unwrap();
    // Entries at t=0 fall out of the window once more than 1s has passed.
    assert_eq!(sleeper.calls().len(), 5);
}

#[tokio::test]
async fn reset_clears_every_algorithm_namespace() {
    let clock = ManualClock::starting_at(EPOCH);
    let store = InMemoryStore::with_clock(clock.clone());
    for algorithm in Algorithm::ALL {
        let config = LimiterConfig::new(1.0, 1).unwrap().with_algorithm(algorithm);
        let limiter =
            DistributedLimiter::new(store.clone(), config).unwrap().with_clock(clock.clone());
        assert!(limiter.allow("shared").await.unwrap());
    }
    assert_eq!(store.len(), 4);

    let config = LimiterConfig::new(1.0, 1).unwrap();
    let limiter = DistributedLimiter::new(store.clone(), config).unwrap().with_clock(clock.clone());
    limiter.reset(&CallContext::background(), "shared").await.unwrap();
    assert!(store.is_empty());
}

async fn hammer(limiter: Arc<dyn RateLimiter>, callers: usize) -> usize {
    let barrier = Arc::new(tokio::sync::Barrier::new(callers));
    let admitted = Arc::new(AtomicUsize::new(0));
    let tasks: Vec<_> = (0..callers)
        .map(|_| {
            let limiter = limiter.clone();
            let barrier = barrier.clone();
            let admitted = admitted.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                if limiter.allow_n("hot-key", 1).await.unwrap() {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }
    admitted.load(Ordering::SeqCst)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_callers_admit_exactly_burst() {
    const BURST: u32 = 64;
    const EXTRA: usize = 36;
    let clock = ManualClock::starting_at(EPOCH);

    let local: Arc<dyn RateLimiter> = Arc::new(local(&clock, 1.0, BURST));
    assert_eq!(hammer(local, BURST as usize + EXTRA).await, BURST as usize);

    for algorithm in [Algorithm::TokenBucket, Algorithm::SlidingWindow, Algorithm::LeakyBucket] {
        let limiter: Arc<dyn RateLimiter> =
            Arc::new(distributed(&clock, algorithm, f64::from(BURST), BURST));
        assert_eq!(hammer(limiter, BURST as usize + EXTRA).await, BURST as usize, "{algorithm}");
    }
}
