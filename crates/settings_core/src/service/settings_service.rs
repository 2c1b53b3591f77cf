//! Settings resolution and caching service.
//!
//! # Responsibility
//! - Resolve a lookup against the active group selector and owner.
//! - Serve reads cache-aside and invalidate the scope's cache key after every
//!   mutation.
//!
//! # Invariants
//! - A `Scope` always names at least one group.
//! - Unscoped reads and writes only touch global entries (no owner).
//! - Multi-group reads flatten into one map; later groups win on collisions.
//! - Mutations never repopulate the cache; the next read does.
//! - Store and cache failures propagate unchanged. The only degraded path is
//!   a missing table, which reads as an empty map.

use crate::auth::PrincipalProvider;
use crate::cache::{cache_key, CacheError, GroupSelector, SettingsCache};
use crate::config::SettingsConfig;
use crate::model::entry::{Entry, EntryKey};
use crate::model::owner::{Owner, Settable};
use crate::model::value::{is_truthy, SettingValue, SettingsMap};
use crate::repo::entry_repo::{EntryFilter, EntryRepository, RepoError, Trashed};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Failure surfaced by a store or cache collaborator.
#[derive(Debug)]
pub enum SettingsError {
    Repo(RepoError),
    Cache(CacheError),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Cache(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Cache(err) => Some(err),
        }
    }
}

impl From<RepoError> for SettingsError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<CacheError> for SettingsError {
    fn from(value: CacheError) -> Self {
        Self::Cache(value)
    }
}

/// Immutable resolution scope: group selector plus optional owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    groups: Vec<String>,
    owner: Option<Owner>,
}

impl Scope {
    /// Scope over global entries of a single group.
    pub fn global(group: impl Into<String>) -> Self {
        Self {
            groups: vec![group.into()],
            owner: None,
        }
    }

    /// Active group names, in selection order.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn owner(&self) -> Option<&Owner> {
        self.owner.as_ref()
    }

    /// Returns a copy selecting `groups`; duplicates are dropped keeping the
    /// first occurrence. An empty selector falls back to `fallback`.
    pub fn with_groups<I, S>(&self, groups: I, fallback: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut selected: Vec<String> = Vec::new();
        for group in groups {
            let group = group.into();
            if !selected.contains(&group) {
                selected.push(group);
            }
        }
        if selected.is_empty() {
            selected.push(fallback.to_string());
        }

        Self {
            groups: selected,
            owner: self.owner.clone(),
        }
    }

    pub fn with_owner(&self, owner: Option<Owner>) -> Self {
        Self {
            groups: self.groups.clone(),
            owner,
        }
    }

    fn filter(&self) -> EntryFilter {
        EntryFilter::default()
            .in_groups(self.groups.iter().cloned())
            .owned_by(self.owner.clone())
    }

    fn filter_named(&self, key: &str) -> EntryFilter {
        EntryFilter {
            name: Some(key.to_string()),
            ..self.filter()
        }
    }
}

/// Settings store with a cache-aside read path.
///
/// Holds the collaborators; per-call group/owner state lives in the
/// `ScopedSettings` handles it hands out.
pub struct SettingsService<R: EntryRepository, C: SettingsCache> {
    repo: R,
    cache: C,
    config: SettingsConfig,
    principal: Option<Box<dyn PrincipalProvider>>,
}

impl<R: EntryRepository, C: SettingsCache> SettingsService<R, C> {
    pub fn new(repo: R, cache: C, config: SettingsConfig) -> Self {
        Self {
            repo,
            cache,
            config,
            principal: None,
        }
    }

    /// Sets the provider consulted by `user()` and `my()`.
    pub fn with_principal_provider(mut self, provider: impl PrincipalProvider + 'static) -> Self {
        self.principal = Some(Box::new(provider));
        self
    }

    pub fn config(&self) -> &SettingsConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Handle over global entries of the default group.
    pub fn scope(&self) -> ScopedSettings<'_, R, C> {
        self.with_scope(Scope::global(self.config.schema.default_group.clone()))
    }

    pub fn with_scope(&self, scope: Scope) -> ScopedSettings<'_, R, C> {
        ScopedSettings {
            service: self,
            scope,
        }
    }

    pub fn group(&self, name: impl Into<String>) -> ScopedSettings<'_, R, C> {
        self.scope().group(name)
    }

    pub fn groups<I, S>(&self, names: I) -> ScopedSettings<'_, R, C>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope().groups(names)
    }

    pub fn for_owner(&self, owner: impl Into<Option<Owner>>) -> ScopedSettings<'_, R, C> {
        self.scope().for_owner(owner)
    }

    pub fn for_entity<S: Settable + ?Sized>(&self, entity: &S) -> ScopedSettings<'_, R, C> {
        self.scope().for_entity(entity)
    }

    pub fn user(&self) -> ScopedSettings<'_, R, C> {
        self.scope().user()
    }

    pub fn all(&self) -> SettingsResult<SettingsMap> {
        self.scope().all()
    }

    pub fn get(
        &self,
        key: &str,
        default: impl Into<SettingValue>,
    ) -> SettingsResult<SettingValue> {
        self.scope().get(key, default)
    }

    pub fn my(&self, key: &str, default: impl Into<SettingValue>) -> SettingsResult<SettingValue> {
        self.scope().my(key, default)
    }

    pub fn set(&self, key: &str, value: impl Into<SettingValue>) -> SettingsResult<SettingValue> {
        self.scope().set(key, value)
    }

    pub fn set_many<I, K, V>(&self, pairs: I) -> SettingsResult<Option<SettingValue>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SettingValue>,
    {
        self.scope().set_many(pairs)
    }

    pub fn add(&self, key: &str, value: impl Into<SettingValue>) -> SettingsResult<SettingValue> {
        self.scope().add(key, value)
    }

    pub fn has(&self, key: &str) -> SettingsResult<bool> {
        self.scope().has(key)
    }

    pub fn missing(&self, key: &str) -> SettingsResult<bool> {
        self.scope().missing(key)
    }

    pub fn remember(
        &self,
        key: &str,
        default: impl Into<SettingValue>,
    ) -> SettingsResult<SettingValue> {
        self.scope().remember(key, default)
    }

    pub fn trash(&self, key: &str) -> SettingsResult<usize> {
        self.scope().trash(key)
    }

    pub fn restore(&self, key: &str) -> SettingsResult<usize> {
        self.scope().restore(key)
    }

    pub fn delete(&self, key: &str) -> SettingsResult<usize> {
        self.scope().delete(key)
    }

    pub fn flush(&self) -> SettingsResult<bool> {
        self.scope().flush()
    }

    /// Drops every cached scope, not only the default one.
    pub fn flush_all_cache(&self) -> SettingsResult<()> {
        self.cache.flush()?;
        info!("event=settings_flush_all module=service status=ok");
        Ok(())
    }
}

/// Service handle bound to one `Scope`.
///
/// Scope-changing methods consume the handle and return a new one; the
/// service itself is never mutated.
pub struct ScopedSettings<'s, R: EntryRepository, C: SettingsCache> {
    service: &'s SettingsService<R, C>,
    scope: Scope,
}

impl<R: EntryRepository, C: SettingsCache> Clone for ScopedSettings<'_, R, C> {
    fn clone(&self) -> Self {
        Self {
            service: self.service,
            scope: self.scope.clone(),
        }
    }
}

impl<'s, R: EntryRepository, C: SettingsCache> ScopedSettings<'s, R, C> {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Selects a single group.
    pub fn group(self, name: impl Into<String>) -> Self {
        self.groups([name.into()])
    }

    /// Selects one or more groups, keeping their order.
    pub fn groups<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scope = self
            .scope
            .with_groups(names, &self.service.config.schema.default_group);
        Self { scope, ..self }
    }

    /// Binds (or with `None`, clears) the owner.
    pub fn for_owner(self, owner: impl Into<Option<Owner>>) -> Self {
        let scope = self.scope.with_owner(owner.into());
        Self { scope, ..self }
    }

    pub fn for_entity<S: Settable + ?Sized>(self, entity: &S) -> Self {
        self.for_owner(Owner::of(entity))
    }

    /// Scopes to the authenticated principal.
    ///
    /// Without a provider or principal the handle becomes unscoped instead of
    /// failing.
    pub fn user(self) -> Self {
        let principal = self
            .service
            .principal
            .as_ref()
            .and_then(|provider| provider.current_principal());

        match principal {
            Some(principal) => {
                let owner = match &self.service.config.user_owner_type {
                    Some(kind) => Owner::new(kind.clone(), principal.id),
                    None => principal,
                };
                self.for_owner(owner)
            }
            None => {
                debug!("event=settings_scope module=service status=unauthenticated");
                self.for_owner(None)
            }
        }
    }

    /// Cache key of the active scope.
    pub fn cache_key(&self) -> String {
        cache_key(
            &self.service.config.cache.key,
            &self.scope.groups,
            self.scope.owner.as_ref(),
        )
    }

    /// Resolves every live setting of the scope.
    pub fn all(&self) -> SettingsResult<SettingsMap> {
        let service = self.service;

        if !service.repo.table_exists()? {
            if service.config.debug {
                warn!(
                    "event=settings_resolve module=service status=degraded reason=table_missing table={}",
                    service.config.schema.table
                );
            }
            return Ok(SettingsMap::new());
        }

        if !service.config.cache.enabled {
            return self.load();
        }

        let key = self.cache_key();
        if let Some(cached) = service.cache.get(&key)? {
            debug!("event=settings_resolve module=service status=hit key={key}");
            return Ok(cached);
        }

        let loaded = self.load()?;
        let stored = service
            .cache
            .add(&key, loaded.clone(), service.config.cache.ttl)?;
        debug!(
            "event=settings_resolve module=service status=miss key={key} entries={} stored={stored}",
            loaded.len()
        );
        if stored {
            return Ok(loaded);
        }

        // Another caller populated the key first; both loads saw the same rows.
        Ok(service.cache.get(&key)?.unwrap_or(loaded))
    }

    pub fn get(&self, key: &str, default: impl Into<SettingValue>) -> SettingsResult<SettingValue> {
        Ok(self.all()?.remove(key).unwrap_or_else(|| default.into()))
    }

    /// `get` for the authenticated principal.
    pub fn my(&self, key: &str, default: impl Into<SettingValue>) -> SettingsResult<SettingValue> {
        self.clone().user().get(key, default)
    }

    /// Writes `value` under `key` in every active group and returns it.
    pub fn set(&self, key: &str, value: impl Into<SettingValue>) -> SettingsResult<SettingValue> {
        let value = value.into();
        let written = self.write(key, &value);
        self.invalidate()?;
        written?;
        Ok(value)
    }

    /// Writes every pair, invalidates once, and returns the resolved value of
    /// the first key (`None` for empty input).
    pub fn set_many<I, K, V>(&self, pairs: I) -> SettingsResult<Option<SettingValue>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SettingValue>,
    {
        let mut first: Option<(String, SettingValue)> = None;
        let mut written = Ok(());
        for (key, value) in pairs {
            let key = key.into();
            let value = value.into();
            written = self.write(&key, &value);
            if written.is_err() {
                break;
            }
            if first.is_none() {
                first = Some((key, value));
            }
        }

        self.invalidate()?;
        written?;

        match first {
            Some((key, value)) => self.get(&key, value).map(Some),
            None => Ok(None),
        }
    }

    /// Same as `set`.
    pub fn add(&self, key: &str, value: impl Into<SettingValue>) -> SettingsResult<SettingValue> {
        self.set(key, value)
    }

    pub fn has(&self, key: &str) -> SettingsResult<bool> {
        Ok(self.all()?.contains_key(key))
    }

    pub fn missing(&self, key: &str) -> SettingsResult<bool> {
        Ok(!self.has(key)?)
    }

    /// Returns the stored value when it is present and truthy, otherwise
    /// stores and returns `default`.
    ///
    /// Falsy stored values (`false`, `0`, `""`, `null`, empty collections)
    /// are overwritten on every call.
    pub fn remember(
        &self,
        key: &str,
        default: impl Into<SettingValue>,
    ) -> SettingsResult<SettingValue> {
        if let Some(current) = self.all()?.remove(key) {
            if is_truthy(&current) {
                return Ok(current);
            }
        }
        self.set(key, default)
    }

    /// Soft-deletes `key` within the scope. Returns affected entries.
    pub fn trash(&self, key: &str) -> SettingsResult<usize> {
        let filter = self.scope.filter_named(key);
        let trashed = self.service.repo.soft_delete(&filter);
        self.after_mutation("trash", key, trashed)
    }

    /// Restores trashed `key` within the scope.
    pub fn restore(&self, key: &str) -> SettingsResult<usize> {
        let filter = self.scope.filter_named(key);
        let restored = self.service.repo.restore(&filter);
        self.after_mutation("restore", key, restored)
    }

    /// Permanently removes `key` within the scope, only if it is trashed.
    pub fn delete(&self, key: &str) -> SettingsResult<usize> {
        let filter = self.scope.filter_named(key);
        let deleted = self.service.repo.force_delete(&filter);
        self.after_mutation("delete", key, deleted)
    }

    /// Forgets the scope's cache key and every cached scope overlapping it.
    ///
    /// Returns `true` without touching the cache when caching is disabled.
    pub fn flush(&self) -> SettingsResult<bool> {
        self.invalidate()
    }

    /// Lists the scope's entries with full metadata.
    pub fn entries(&self, trashed: Trashed) -> SettingsResult<Vec<Entry>> {
        if !self.service.repo.table_exists()? {
            return Ok(Vec::new());
        }
        let filter = self.scope.filter().with_trashed(trashed);
        Ok(self.service.repo.list_entries(&filter)?)
    }

    fn load(&self) -> SettingsResult<SettingsMap> {
        let mut settings = SettingsMap::new();
        for group in &self.scope.groups {
            let filter = EntryFilter::default()
                .in_groups([group.as_str()])
                .owned_by(self.scope.owner.clone());
            settings.extend(self.service.repo.pluck(&filter)?);
        }
        Ok(settings)
    }

    fn write(&self, key: &str, value: &SettingValue) -> SettingsResult<()> {
        for group in &self.scope.groups {
            let entry_key = EntryKey::new(key, group.as_str(), self.scope.owner.clone());
            self.service.repo.upsert(&entry_key, value)?;
        }
        info!(
            "event=settings_write module=service status=ok op=set name={key} groups={} owner_scoped={}",
            self.scope.groups.len(),
            self.scope.owner.is_some()
        );
        Ok(())
    }

    fn after_mutation(
        &self,
        op: &str,
        key: &str,
        affected: Result<usize, RepoError>,
    ) -> SettingsResult<usize> {
        self.invalidate()?;
        let affected = affected?;
        info!(
            "event=settings_write module=service status=ok op={op} name={key} affected={affected}"
        );
        Ok(affected)
    }

    /// Forgets the selector's key and every cached scope of the same owner
    /// that selects one of its groups.
    fn invalidate(&self) -> SettingsResult<bool> {
        let service = self.service;
        if !service.config.cache.enabled {
            return Ok(true);
        }

        let forgotten = service.cache.forget(&self.cache_key())?;
        for group in &self.scope.groups {
            service.cache.forget_group(&GroupSelector::new(
                &service.config.cache.key,
                group,
                self.scope.owner.as_ref(),
            ))?;
        }
        Ok(forgotten)
    }
}
