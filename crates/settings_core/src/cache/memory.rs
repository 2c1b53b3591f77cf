//! In-process cache backed by moka.

use super::{CacheError, CacheResult, GroupSelector, SettingsCache};
use crate::model::value::SettingsMap;
use moka::sync::Cache as MokaCache;
use moka::Expiry;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CachedScope {
    settings: SettingsMap,
    ttl: Duration,
}

/// Expires each scope after the TTL it was added with.
struct PerEntryTtl;

impl Expiry<String, CachedScope> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedScope,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Thread-safe, bounded in-memory cache with per-entry TTL.
#[derive(Clone)]
pub struct MemoryCache {
    inner: MokaCache<String, CachedScope>,
}

impl MemoryCache {
    /// Creates a cache holding at most `capacity` resolved scopes.
    pub fn new(capacity: u64) -> Self {
        let inner = MokaCache::builder()
            .max_capacity(capacity)
            .expire_after(PerEntryTtl)
            .support_invalidation_closures()
            .build();
        Self { inner }
    }
}

impl SettingsCache for MemoryCache {
    fn get(&self, key: &str) -> CacheResult<Option<SettingsMap>> {
        Ok(self.inner.get(key).map(|scope| scope.settings))
    }

    fn add(&self, key: &str, value: SettingsMap, ttl: Duration) -> CacheResult<bool> {
        let entry = self
            .inner
            .entry(key.to_string())
            .or_insert_with(|| CachedScope {
                settings: value,
                ttl,
            });
        Ok(entry.is_fresh())
    }

    fn forget(&self, key: &str) -> CacheResult<bool> {
        Ok(self.inner.remove(key).is_some())
    }

    fn forget_group(&self, selector: &GroupSelector) -> CacheResult<()> {
        let selector = selector.clone();
        self.inner
            .invalidate_entries_if(move |key, _| selector.matches(key))
            .map(|_| ())
            .map_err(|err| CacheError::Backend(err.to_string()))
    }

    fn missing(&self, key: &str) -> CacheResult<bool> {
        Ok(!self.inner.contains_key(key))
    }

    fn flush(&self) -> CacheResult<()> {
        self.inner.invalidate_all();
        Ok(())
    }
}
