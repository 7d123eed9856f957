//! Cache-aside wrapper with at most one in-flight computation per key.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::key::{CacheParams, derive_key};
use super::ttl::TtlCache;

/// Per-key async locks. An entry lives only while someone holds or waits on it.
#[derive(Debug, Default)]
struct InFlight {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl InFlight {
    async fn acquire<'a>(&'a self, key: &str) -> FlightGuard<'a> {
        let lock = match self.locks.lock() {
            Ok(mut locks) => Arc::clone(locks.entry(key.to_string()).or_default()),
            // Poisoned table: fall back to an unshared lock (no deduplication).
            Err(_) => Arc::new(AsyncMutex::new(())),
        };
        let guard = lock.lock_owned().await;
        FlightGuard {
            flights: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }
}

struct FlightGuard<'a> {
    flights: &'a InFlight,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        if let Ok(mut locks) = self.flights.locks.lock() {
            // Only the table's own reference left: nobody is waiting.
            if locks.get(&self.key).is_some_and(|l| Arc::strong_count(l) == 1) {
                locks.remove(&self.key);
            }
        }
    }
}

/// Typed cache-aside access to one namespace of a [`TtlCache`].
///
/// Concurrent misses on the same key run `compute` once; the other callers
/// wait and then read what the first one stored. Clones share the same
/// in-flight table.
#[derive(Debug)]
pub struct CacheAside<T> {
    cache: Arc<TtlCache>,
    namespace: &'static str,
    ttl: Duration,
    flights: Arc<InFlight>,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for CacheAside<T> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            namespace: self.namespace,
            ttl: self.ttl,
            flights: Arc::clone(&self.flights),
            _value: PhantomData,
        }
    }
}

impl<T> CacheAside<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(cache: Arc<TtlCache>, namespace: &'static str, ttl: Duration) -> Self {
        Self {
            cache,
            namespace,
            ttl,
            flights: Arc::new(InFlight::default()),
            _value: PhantomData,
        }
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn key(&self, params: &CacheParams) -> String {
        derive_key(self.namespace, params)
    }

    /// Cached value for `params`, if present and fresh.
    pub fn peek(&self, params: &CacheParams) -> Option<T> {
        self.lookup(&self.key(params))
    }

    /// Return the cached value or compute, store and return a fresh one.
    ///
    /// Errors from `compute` are returned as-is and nothing is cached.
    pub async fn get_or_compute<F, Fut, E>(&self, params: &CacheParams, compute: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = self.key(params);
        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }

        let _flight = self.flights.acquire(&key).await;
        if let Some(hit) = self.lookup(&key) {
            // Filled by the caller we waited on.
            return Ok(hit);
        }

        tracing::debug!(namespace = self.namespace, key = %key, "cache miss");
        let value = compute().await?;
        self.store(&key, &value);
        Ok(value)
    }

    /// Compute and store unconditionally, still serialized with other
    /// computations of the same key.
    pub async fn refresh<F, Fut, E>(&self, params: &CacheParams, compute: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = self.key(params);
        let _flight = self.flights.acquire(&key).await;
        let value = compute().await?;
        self.store(&key, &value);
        Ok(value)
    }

    pub fn invalidate(&self, params: &CacheParams) -> bool {
        self.cache.invalidate(&self.key(params))
    }

    /// Drop every entry in this namespace.
    pub fn invalidate_all(&self) -> usize {
        self.cache.invalidate_namespace(self.namespace)
    }

    fn lookup(&self, key: &str) -> Option<T> {
        let raw = self.cache.get(key)?;
        match serde_json::from_value(raw) {
            Ok(value) => {
                tracing::debug!(namespace = self.namespace, key, "cache hit");
                Some(value)
            }
            Err(err) => {
                tracing::warn!(namespace = self.namespace, key, "dropping undecodable cache entry: {err:?}");
                self.cache.invalidate(key);
                None
            }
        }
    }

    fn store(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(raw) => self.cache.set(key, raw, self.ttl),
            Err(err) => {
                tracing::warn!(namespace = self.namespace, key, "value not cached: {err:?}");
            }
        }
    }
}
