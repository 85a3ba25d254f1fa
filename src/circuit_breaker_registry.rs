//! Registry for managing named circuit breakers.
//!
//! An explicit instance, passed to whoever needs it, rather than process-global
//! state: tests build their own registry per case.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitState};
use tracing::warn;

/// Errors from breaker registries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CircuitBreakerRegistryError {
    /// The requested circuit breaker was not found.
    #[error("circuit breaker '{name}' not found")]
    NotFound { name: String },
}

/// Name-indexed set of shared breakers. Clones share the same map.
#[derive(Default, Clone, Debug)]
pub struct CircuitBreakerRegistry {
    inner: Arc<RwLock<HashMap<String, CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CircuitBreaker>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CircuitBreaker>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `breaker` under its own name, replacing any existing entry.
    ///
    /// The last registration wins. Replacing does not merge state: callers that
    /// still hold the old breaker keep using it.
    pub fn register(&self, breaker: CircuitBreaker) {
        let name = breaker.name().to_string();
        let mut map = self.write();
        if map.contains_key(&name) {
            warn!(target: "floodgate::circuit_breaker_registry", breaker = %name, "circuit breaker name replaced; last registration wins");
        }
        map.insert(name, breaker);
    }

    /// Breaker named `name`, building it from `make` on first use.
    pub fn get_or_insert<F>(&self, name: &str, make: F) -> CircuitBreaker
    where
        F: FnOnce() -> BreakerConfig,
    {
        if let Some(breaker) = self.read().get(name) {
            return breaker.clone();
        }
        self.write()
            .entry(name.to_string())
            .or_insert_with(|| CircuitBreaker::new(make()))
            .clone()
    }

    /// Like [`get_or_insert`](Self::get_or_insert) with default settings.
    pub fn get_or_default(&self, name: &str) -> CircuitBreaker {
        self.get_or_insert(name, || BreakerConfig::new(name))
    }

    pub fn get(&self, name: &str) -> Option<CircuitBreaker> {
        self.read().get(name).cloned()
    }

    /// Reset a breaker by name, erroring if missing.
    pub fn reset(&self, name: &str) -> Result<(), CircuitBreakerRegistryError> {
        let breaker = self
            .get(name)
            .ok_or_else(|| CircuitBreakerRegistryError::NotFound { name: name.to_string() })?;
        breaker.reset();
        Ok(())
    }

    /// Breaker states sorted by name.
    pub fn snapshot(&self) -> Vec<(String, CircuitState)> {
        let mut entries: Vec<(String, CircuitState)> =
            self.read().iter().map(|(k, v)| (k.clone(), v.state())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
