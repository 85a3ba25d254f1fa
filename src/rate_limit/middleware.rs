use crate::rate_limit::RateLimiter;
use crate::telemetry::{emit_best_effort, NullSink, PolicyEvent, RateLimitEvent, TelemetrySink};
use crate::ResilienceError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// A layer that enforces rate limits using a [`RateLimiter`].
///
/// `key_fn` extracts the limiting key (user ID, client IP, ...) from each request.
/// Denials fail with [`ResilienceError::RateLimited`] without calling the inner
/// service; limiter failures surface as [`ResilienceError::Limiter`].
pub struct RateLimitLayer<L: ?Sized, K, T = NullSink> {
    limiter: Arc<L>,
    key_fn: Arc<K>,
    sink: T,
}

impl<L: ?Sized, K, T: Clone> Clone for RateLimitLayer<L, K, T> {
    fn clone(&self) -> Self {
        Self { limiter: self.limiter.clone(), key_fn: self.key_fn.clone(), sink: self.sink.clone() }
    }
}

impl<L: ?Sized, K, T: fmt::Debug> fmt::Debug for RateLimitLayer<L, K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitLayer").field("sink", &self.sink).finish_non_exhaustive()
    }
}

impl<L: ?Sized, K> RateLimitLayer<L, K> {
    /// Create a new rate limit layer.
    pub fn new(limiter: Arc<L>, key_fn: K) -> Self {
        Self { limiter, key_fn: Arc::new(key_fn), sink: NullSink }
    }
}

impl<L: ?Sized, K, T> RateLimitLayer<L, K, T> {
    /// Report denials and limiter failures to `sink`.
    pub fn with_sink<T2>(self, sink: T2) -> RateLimitLayer<L, K, T2>
    where
        T2: TelemetrySink,
    {
        RateLimitLayer { limiter: self.limiter, key_fn: self.key_fn, sink }
    }
}

impl<S, L: ?Sized, K, T: Clone> Layer<S> for RateLimitLayer<L, K, T> {
    type Service = RateLimitService<S, L, K, T>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService {
            inner: service,
            limiter: self.limiter.clone(),
            key_fn: self.key_fn.clone(),
            sink: self.sink.clone(),
        }
    }
}

/// Middleware service that enforces rate limits.
pub struct RateLimitService<S, L: ?Sized, K, T = NullSink> {
    inner: S,
    limiter: Arc<L>,
    key_fn: Arc<K>,
    sink: T,
}

impl<S: Clone, L: ?Sized, K, T: Clone> Clone for RateLimitService<S, L, K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
            key_fn: self.key_fn.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<S: fmt::Debug, L: ?Sized, K, T: fmt::Debug> fmt::Debug for RateLimitService<S, L, K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitService")
            .field("inner", &self.inner)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

impl<S, L, K, T, Req> Service<Req> for RateLimitService<S, L, K, T>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    L: RateLimiter + ?Sized + 'static,
    K: Fn(&Req) -> String + Send + Sync + 'static,
    T: TelemetrySink,
    T::Future: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = ResilienceError<S::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(ResilienceError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let limiter = self.limiter.clone();
        let sink = self.sink.clone();
        let key = (self.key_fn)(&req);
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match limiter.allow(&key).await {
                Ok(true) => inner.call(req).await.map_err(ResilienceError::Inner),
                Ok(false) => {
                    let event = RateLimitEvent::Denied { key: key.clone(), permits: 1 };
                    emit_best_effort(sink, PolicyEvent::RateLimit(event)).await;
                    Err(ResilienceError::RateLimited { key })
                }
                Err(e) => {
                    let event = RateLimitEvent::Failed { key, code: e.code() };
                    emit_best_effort(sink, PolicyEvent::RateLimit(event)).await;
                    Err(ResilienceError::from(e))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::LimiterConfig;
    use crate::rate_limit::LocalTokenBucketLimiter;
    use crate::telemetry::MemorySink;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::{service_fn, ServiceBuilder, ServiceExt};

    fn limiter() -> Arc<LocalTokenBucketLimiter> {
        let config = LimiterConfig::new(1.0, 2).unwrap();
        Arc::new(LocalTokenBucketLimiter::new(config).unwrap().with_clock(ManualClock::new()))
    }

    #[tokio::test]
    async fn denies_once_key_is_exhausted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sink = MemorySink::new();
        let svc = ServiceBuilder::new()
            .layer(
                RateLimitLayer::new(limiter(), |user: &&'static str| user.to_string())
                    .with_sink(sink.clone()),
            )
            .service(service_fn(move |user: &'static str| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, Infallible>(user.len()) }
            }));

        assert_eq!(svc.clone().oneshot("alice").await.unwrap(), 5);
        assert_eq!(svc.clone().oneshot("alice").await.unwrap(), 5);
        let err = svc.clone().oneshot("alice").await.unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(svc.clone().oneshot("bob").await.unwrap(), 3);

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            sink.events(),
            vec![PolicyEvent::RateLimit(RateLimitEvent::Denied { key: "alice".into(), permits: 1 })]
        );
    }

    #[tokio::test]
    async fn limiter_errors_are_not_rate_limits() {
        let svc = RateLimitLayer::new(limiter(), |_: &()| String::new())
            .layer(service_fn(|_: ()| async { Ok::<_, Infallible>(()) }));
        let err = svc.oneshot(()).await.unwrap_err();
        assert!(!err.is_rate_limited());
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidKey);
    }

    #[tokio::test]
    async fn accepts_trait_object_limiters() {
        let limiter: Arc<dyn RateLimiter> = limiter();
        let svc = RateLimitLayer::new(limiter, |_: &u8| "shared".to_string())
            .layer(service_fn(|n: u8| async move { Ok::<_, Infallible>(n) }));
        assert_eq!(svc.oneshot(7).await.unwrap(), 7);
    }
}
