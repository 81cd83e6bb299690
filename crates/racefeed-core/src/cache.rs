//! Time-boxed memoization of fetch results with single-flight collapsing.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::data_source::SourceError;
use crate::SourceId;

/// Cache key: the source plus its normalized query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source: SourceId,
    pub query: String,
}

impl CacheKey {
    pub fn new(source: SourceId, query: impl Into<String>) -> Self {
        Self {
            source,
            query: query.into(),
        }
    }
}

/// Where a [`Lookup`] got its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOrigin {
    /// An unexpired entry was already stored.
    Cache,
    /// This caller ran the fetch.
    Fetched,
    /// This caller waited on another caller's fetch.
    Joined,
}

#[derive(Debug, Clone)]
pub struct Lookup<T, E> {
    pub result: Result<T, E>,
    pub origin: LookupOrigin,
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

type Outcome<T, E> = Option<Result<T, E>>;

#[derive(Debug)]
struct CacheInner<T, E> {
    entries: HashMap<CacheKey, CacheEntry<T>>,
    in_flight: HashMap<CacheKey, watch::Receiver<Outcome<T, E>>>,
}

enum Claim<T, E> {
    Hit(T),
    Leader(watch::Sender<Outcome<T, E>>),
    Follower(watch::Receiver<Outcome<T, E>>),
}

/// Thread-safe result cache.
///
/// Expired entries are dropped lazily by the lookup that observes them.
/// Only successful results are stored; failures are shared with callers that
/// were already waiting, then forgotten.
#[derive(Debug)]
pub struct CacheLayer<T, E = SourceError> {
    inner: Arc<Mutex<CacheInner<T, E>>>,
}

impl<T, E> Clone for CacheLayer<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Default for CacheLayer<T, E> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            })),
        }
    }
}

impl<T, E> CacheLayer<T, E>
where
    T: Clone + Send + Sync,
    E: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored value when it has not expired.
    pub fn get(&self, key: &CacheKey) -> Option<T> {
        let mut inner = self.lock();
        Self::live_entry(&mut inner, key)
    }

    /// Stores `value` for `ttl`. A zero TTL stores nothing.
    pub fn put(&self, key: CacheKey, value: T, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.lock().entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Returns the cached value, or runs `fetch` once for all concurrent
    /// callers of the same key and caches a successful result for `ttl`.
    ///
    /// If the caller running the fetch is cancelled, a waiting caller takes over.
    pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, ttl: Duration, fetch: F) -> Lookup<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let sender = loop {
            match self.claim(&key) {
                Claim::Hit(value) => {
                    return Lookup {
                        result: Ok(value),
                        origin: LookupOrigin::Cache,
                    };
                }
                Claim::Follower(mut receiver) => {
                    let shared = match receiver.wait_for(Option::is_some).await {
                        Ok(outcome) => (*outcome).clone(),
                        Err(_) => None,
                    };
                    if let Some(result) = shared {
                        return Lookup {
                            result,
                            origin: LookupOrigin::Joined,
                        };
                    }
                    // The leader went away without a result; race for the lead again.
                }
                Claim::Leader(sender) => break sender,
            }
        };

        let mut guard = InFlightGuard {
            cache: self,
            key: Some(key),
        };
        let result = fetch().await;

        if let Some(key) = guard.key.take() {
            let mut inner = self.lock();
            inner.in_flight.remove(&key);
            if let (Ok(value), false) = (&result, ttl.is_zero()) {
                inner.entries.insert(
                    key,
                    CacheEntry {
                        value: value.clone(),
                        expires_at: Instant::now() + ttl,
                    },
                );
            }
        }
        let _ = sender.send(Some(result.clone()));

        Lookup {
            result,
            origin: LookupOrigin::Fetched,
        }
    }

    /// Drops every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.lock().entries.retain(|_, entry| entry.expires_at > now);
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of stored entries, including expired ones not yet observed.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn claim(&self, key: &CacheKey) -> Claim<T, E> {
        let mut inner = self.lock();
        if let Some(value) = Self::live_entry(&mut inner, key) {
            return Claim::Hit(value);
        }
        if let Some(receiver) = inner.in_flight.get(key) {
            return Claim::Follower(receiver.clone());
        }

        let (sender, receiver) = watch::channel(None);
        inner.in_flight.insert(key.clone(), receiver);
        Claim::Leader(sender)
    }

    fn live_entry(inner: &mut CacheInner<T, E>, key: &CacheKey) -> Option<T> {
        let entry = inner.entries.get(key)?;
        if Instant::now() < entry.expires_at {
            return Some(entry.value.clone());
        }
        inner.entries.remove(key);
        None
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner<T, E>> {
        self.inner
            .lock()
            .expect("cache lock should not be poisoned")
    }
}

/// Releases the in-flight slot if the leading fetch is dropped before it completes.
struct InFlightGuard<'a, T, E> {
    cache: &'a CacheLayer<T, E>,
    key: Option<CacheKey>,
}

impl<T, E> Drop for InFlightGuard<'_, T, E> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            if let Ok(mut inner) = self.cache.inner.lock() {
                inner.in_flight.remove(&key);
            }
        }
    }
}
