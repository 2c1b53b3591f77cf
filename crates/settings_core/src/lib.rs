//! Grouped, optionally owner-scoped settings store.
//!
//! Entries live in one SQLite table and are read through a cache-aside
//! layer; every mutation invalidates the affected scope.

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use auth::{FixedPrincipal, PrincipalProvider};
pub use cache::{
    cache_key, CacheError, CacheResult, GroupSelector, MemoryCache, NoCache, SettingsCache,
};
pub use crate::config::{CacheConfig, ConfigError, SchemaNames, SettingsConfig};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget, LoggingError};
pub use model::entry::{Entry, EntryId, EntryKey};
pub use model::owner::{Owner, Settable};
pub use model::value::{is_truthy, SettingValue, SettingsMap};
pub use repo::entry_repo::{
    EntryFilter, EntryRepository, OwnerFilter, RepoError, RepoResult, SqliteEntryRepository,
    Trashed,
};
pub use service::accessor::{setting_or_default, store_settings};
pub use service::settings_service::{
    Scope, ScopedSettings, SettingsError, SettingsResult, SettingsService,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
