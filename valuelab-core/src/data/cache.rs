//! In-memory TTL cache for fetched series.
//!
//! Entries are keyed by `(identifiers, start, end)` and expire after a fixed
//! time-to-live. Only successful fetches are stored. The lock is not held
//! while fetching, so two callers racing on the same key may both fetch; the
//! later result wins.

use super::provider::{DataError, DataSource, MacroSource, PriceSource};
use crate::series::TimeSeries;
use chrono::NaiveDate;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default time-to-live: one hour.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Cache key for one fetch request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    pub identifiers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FetchKey {
    pub fn new<S: AsRef<str>>(identifiers: &[S], start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            identifiers: identifiers.iter().map(|s| s.as_ref().to_string()).collect(),
            start,
            end,
        }
    }
}

/// TTL memoization of fetch results.
pub struct FetchCache<T> {
    ttl: Duration,
    entries: Mutex<HashMap<FetchKey, (Instant, T)>>,
}

impl<T: Clone> FetchCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh cached value for `key`, if any.
    pub fn get(&self, key: &FetchKey) -> Option<T> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    /// Return the cached value for `key`, or run `fetch` and cache its success.
    ///
    /// Expired entries are evicted whenever a new value is stored.
    pub fn get_or_fetch<E>(
        &self,
        key: FetchKey,
        fetch: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        if let Some(hit) = self.get(&key) {
            debug!("cache hit: {:?} {}..{}", key.identifiers, key.start, key.end);
            return Ok(hit);
        }
        debug!("cache miss: {:?} {}..{}", key.identifiers, key.start, key.end);

        let value = fetch()?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let ttl = self.ttl;
        entries.retain(|_, (stored, _)| stored.elapsed() < ttl);
        entries.insert(key, (Instant::now(), value.clone()));
        Ok(value)
    }

    pub fn invalidate(&self, key: &FetchKey) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for FetchCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// A `PriceSource` with a TTL cache in front of it.
pub struct CachedPriceSource<S> {
    inner: S,
    cache: FetchCache<TimeSeries>,
}

impl<S: PriceSource> CachedPriceSource<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            cache: FetchCache::new(ttl),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn cache(&self) -> &FetchCache<TimeSeries> {
        &self.cache
    }
}

impl<S: PriceSource> PriceSource for CachedPriceSource<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> DataSource {
        self.inner.kind()
    }

    fn fetch_close(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TimeSeries, DataError> {
        let key = FetchKey::new(&[self.inner.name(), symbol], start, end);
        self.cache
            .get_or_fetch(key, || self.inner.fetch_close(symbol, start, end))
    }
}

/// A `MacroSource` with a TTL cache in front of it.
pub struct CachedMacroSource<M> {
    inner: M,
    cache: FetchCache<TimeSeries>,
}

impl<M: MacroSource> CachedMacroSource<M> {
    pub fn new(inner: M, ttl: Duration) -> Self {
        Self {
            inner,
            cache: FetchCache::new(ttl),
        }
    }
}

impl<M: MacroSource> MacroSource for CachedMacroSource<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fetch_ratio(&self, start: NaiveDate, end: NaiveDate) -> Result<TimeSeries, DataError> {
        let key = FetchKey::new(&[self.inner.name()], start, end);
        self.cache
            .get_or_fetch(key, || self.inner.fetch_ratio(start, end))
    }
}

/// Tries `primary`; on any error logs it and returns `fallback`'s result.
pub struct FallbackMacroSource<P, F> {
    primary: P,
    fallback: F,
    name: String,
}

impl<P: MacroSource, F: MacroSource> FallbackMacroSource<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        let name = format!("{}|{}", primary.name(), fallback.name());
        Self {
            primary,
            fallback,
            name,
        }
    }
}

impl<P: MacroSource, F: MacroSource> MacroSource for FallbackMacroSource<P, F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_ratio(&self, start: NaiveDate, end: NaiveDate) -> Result<TimeSeries, DataError> {
        match self.primary.fetch_ratio(start, end) {
            Ok(series) => Ok(series),
            Err(e) => {
                warn!(
                    "{} failed ({e}); falling back to {}",
                    self.primary.name(),
                    self.fallback.name()
                );
                self.fallback.fetch_ratio(start, end)
            }
        }
    }
}
