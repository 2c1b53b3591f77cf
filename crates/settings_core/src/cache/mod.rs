//! Cache adapters for resolved settings scopes.
//!
//! # Responsibility
//! - Define the cache contract used by the cache-aside read path.
//! - Derive collision-free cache keys from group selector and owner.
//!
//! # Invariants
//! - `add` never overwrites an existing, unexpired value.
//! - Distinct (groups, owner) pairs map to distinct keys.
//! - A key's groups and owner can be recovered from it, so a write to one
//!   group can find every aggregate key that selects that group.

use crate::model::owner::Owner;
use crate::model::value::SettingsMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

mod memory;

pub use memory::MemoryCache;

pub type CacheResult<T> = Result<T, CacheError>;

/// Failure reported by a cache backend.
#[derive(Debug)]
pub enum CacheError {
    Backend(String),
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backend(message) => write!(f, "settings cache backend failed: {message}"),
        }
    }
}

impl Error for CacheError {}

/// Key-value cache with TTL, consumed by the settings service.
pub trait SettingsCache {
    fn get(&self, key: &str) -> CacheResult<Option<SettingsMap>>;
    /// Stores `value` only when `key` is absent. Returns whether it stored.
    fn add(&self, key: &str, value: SettingsMap, ttl: Duration) -> CacheResult<bool>;
    /// Removes `key`. Returns whether a value was present.
    fn forget(&self, key: &str) -> CacheResult<bool>;
    /// Removes every scope key matched by `selector`, single- and
    /// multi-group alike.
    fn forget_group(&self, selector: &GroupSelector) -> CacheResult<()>;
    fn missing(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get(key)?.is_none())
    }
    /// Removes every key.
    fn flush(&self) -> CacheResult<()>;
}

impl<C: SettingsCache + ?Sized> SettingsCache for &C {
    fn get(&self, key: &str) -> CacheResult<Option<SettingsMap>> {
        (**self).get(key)
    }

    fn add(&self, key: &str, value: SettingsMap, ttl: Duration) -> CacheResult<bool> {
        (**self).add(key, value, ttl)
    }

    fn forget(&self, key: &str) -> CacheResult<bool> {
        (**self).forget(key)
    }

    fn forget_group(&self, selector: &GroupSelector) -> CacheResult<()> {
        (**self).forget_group(selector)
    }

    fn missing(&self, key: &str) -> CacheResult<bool> {
        (**self).missing(key)
    }

    fn flush(&self) -> CacheResult<()> {
        (**self).flush()
    }
}

/// Cache that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl SettingsCache for NoCache {
    fn get(&self, _key: &str) -> CacheResult<Option<SettingsMap>> {
        Ok(None)
    }

    fn add(&self, _key: &str, _value: SettingsMap, _ttl: Duration) -> CacheResult<bool> {
        Ok(false)
    }

    fn forget(&self, _key: &str) -> CacheResult<bool> {
        Ok(false)
    }

    fn forget_group(&self, _selector: &GroupSelector) -> CacheResult<()> {
        Ok(())
    }

    fn flush(&self) -> CacheResult<()> {
        Ok(())
    }
}

/// Builds the cache key for a scope.
///
/// Format: `base "." join(groups, "_") ["@" kind ":" id] "_"`.
/// Components escape `%`, `.`, `_`, `@` and `:` so the separators stay
/// unambiguous; plain names produce the unescaped layout.
pub fn cache_key(base: &str, groups: &[String], owner: Option<&Owner>) -> String {
    let mut key = base.to_string();

    if !groups.is_empty() {
        key.push('.');
        let escaped: Vec<String> = groups.iter().map(|group| escape(group)).collect();
        key.push_str(&escaped.join("_"));
    }

    key.push_str(&owner_suffix(owner));
    key.push('_');
    key
}

/// Matches the cache keys of every scope that selects one group for one
/// owner (or for global entries when the owner is `None`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSelector {
    prefix: String,
    group: String,
    owner_suffix: String,
}

impl GroupSelector {
    pub fn new(base: &str, group: &str, owner: Option<&Owner>) -> Self {
        Self {
            prefix: format!("{base}."),
            group: escape(group),
            owner_suffix: owner_suffix(owner),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        let Some(groups) = key
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_suffix('_'))
            .and_then(|rest| rest.strip_suffix(self.owner_suffix.as_str()))
        else {
            return false;
        };

        // Escaped group names never contain `@`; one left over is another owner.
        !groups.contains('@') && groups.split('_').any(|group| group == self.group)
    }
}

fn owner_suffix(owner: Option<&Owner>) -> String {
    owner.map_or_else(String::new, |owner| {
        format!("@{}:{}", escape(&owner.kind), escape(&owner.id))
    })
}

fn escape(component: &str) -> String {
    let mut escaped = String::with_capacity(component.len());
    for ch in component.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            '.' => escaped.push_str("%2E"),
            ':' => escaped.push_str("%3A"),
            '@' => escaped.push_str("%40"),
            '_' => escaped.push_str("%5F"),
            other => escaped.push(other),
        }
    }
    escaped
}
