use rusqlite::Connection;
use serde_json::json;
use settings_core::db::open_db_in_memory;
use settings_core::{
    cache_key, setting_or_default, store_settings, CacheConfig, CacheError, CacheResult, Entry,
    EntryFilter, EntryId, EntryKey, EntryRepository, GroupSelector, MemoryCache, NoCache, Owner,
    RepoResult, SchemaNames, SettingValue, SettingsCache, SettingsConfig, SettingsError,
    SettingsMap, SettingsService, SqliteEntryRepository,
};
use std::cell::Cell;
use std::time::Duration;

/// Counts `pluck` calls to observe cache hits.
struct CountingRepo<'conn> {
    inner: SqliteEntryRepository<'conn>,
    plucks: Cell<usize>,
}

impl<'conn> CountingRepo<'conn> {
    fn new(conn: &'conn Connection) -> Self {
        Self {
            inner: SqliteEntryRepository::try_new(conn, &SchemaNames::default()).unwrap(),
            plucks: Cell::new(0),
        }
    }
}

impl EntryRepository for CountingRepo<'_> {
    fn table_exists(&self) -> RepoResult<bool> {
        self.inner.table_exists()
    }

    fn pluck(&self, filter: &EntryFilter) -> RepoResult<SettingsMap> {
        self.plucks.set(self.plucks.get() + 1);
        self.inner.pluck(filter)
    }

    fn upsert(&self, key: &EntryKey, value: &SettingValue) -> RepoResult<EntryId> {
        self.inner.upsert(key, value)
    }

    fn soft_delete(&self, filter: &EntryFilter) -> RepoResult<usize> {
        self.inner.soft_delete(filter)
    }

    fn restore(&self, filter: &EntryFilter) -> RepoResult<usize> {
        self.inner.restore(filter)
    }

    fn force_delete(&self, filter: &EntryFilter) -> RepoResult<usize> {
        self.inner.force_delete(filter)
    }

    fn list_entries(&self, filter: &EntryFilter) -> RepoResult<Vec<Entry>> {
        self.inner.list_entries(filter)
    }
}

struct BrokenCache;

impl SettingsCache for BrokenCache {
    fn get(&self, _key: &str) -> CacheResult<Option<SettingsMap>> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    fn add(&self, _key: &str, _value: SettingsMap, _ttl: Duration) -> CacheResult<bool> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    fn forget(&self, _key: &str) -> CacheResult<bool> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    fn forget_group(&self, _selector: &GroupSelector) -> CacheResult<()> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    fn flush(&self) -> CacheResult<()> {
        Err(CacheError::Backend("connection refused".to_string()))
    }
}

fn config_without_cache() -> SettingsConfig {
    SettingsConfig {
        cache: CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        },
        ..SettingsConfig::default()
    }
}

#[test]
fn reads_are_served_from_cache_after_first_miss() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let cache = MemoryCache::new(64);
    let settings =
        SettingsService::new(CountingRepo::new(&conn), &cache, SettingsConfig::default());

    settings.set("app_name", "Laravel").unwrap();
    assert!(cache.missing("settings.default_").unwrap());

    settings.get("app_name", SettingValue::Null).unwrap();
    settings.get("app_name", SettingValue::Null).unwrap();
    settings.has("app_name").unwrap();

    assert_eq!(settings.repository().plucks.get(), 1);
    assert_eq!(
        cache.get("settings.default_").unwrap().unwrap().get("app_name"),
        Some(&json!("Laravel"))
    );
}

#[test]
fn every_mutation_invalidates_the_scope_key() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let cache = MemoryCache::new(64);
    let settings =
        SettingsService::new(CountingRepo::new(&conn), &cache, SettingsConfig::default());
    let key = settings.scope().cache_key();

    settings.set("k", "v1").unwrap();
    settings.all().unwrap();
    assert!(!cache.missing(&key).unwrap());

    settings.set("k", "v2").unwrap();
    assert!(cache.missing(&key).unwrap());
    assert_eq!(settings.get("k", SettingValue::Null).unwrap(), json!("v2"));

    settings.trash("k").unwrap();
    assert!(cache.missing(&key).unwrap());
    assert!(settings.missing("k").unwrap());

    settings.restore("k").unwrap();
    assert!(cache.missing(&key).unwrap());
    assert!(settings.has("k").unwrap());

    settings.trash("k").unwrap();
    settings.all().unwrap();
    settings.delete("k").unwrap();
    assert!(cache.missing(&key).unwrap());
    assert!(settings.all().unwrap().is_empty());
}

#[test]
fn populated_key_is_trusted_until_a_mutation_forgets_it() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let cache = MemoryCache::new(64);
    let settings =
        SettingsService::new(CountingRepo::new(&conn), &cache, SettingsConfig::default());

    let mut stale = SettingsMap::new();
    stale.insert("k".to_string(), json!("stale"));
    cache
        .add("settings.default_", stale, Duration::from_secs(60))
        .unwrap();

    assert_eq!(settings.get("k", SettingValue::Null).unwrap(), json!("stale"));
    settings.set("k", "fresh").unwrap();
    assert_eq!(settings.get("k", SettingValue::Null).unwrap(), json!("fresh"));
}

#[test]
fn scopes_use_distinct_cache_keys() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let cache = MemoryCache::new(64);
    let settings =
        SettingsService::new(CountingRepo::new(&conn), &cache, SettingsConfig::default());
    let owner = Owner::new("user", "1");

    settings.set("theme", "light").unwrap();
    settings.for_owner(owner.clone()).set("theme", "dark").unwrap();

    assert_eq!(settings.get("theme", SettingValue::Null).unwrap(), json!("light"));
    assert_eq!(
        settings
            .for_owner(owner.clone())
            .get("theme", SettingValue::Null)
            .unwrap(),
        json!("dark")
    );
    assert_eq!(settings.scope().cache_key(), "settings.default_");
    assert_eq!(
        settings.for_owner(owner).cache_key(),
        "settings.default@user:1_"
    );
    assert_eq!(
        settings.groups(["team1", "team2"]).cache_key(),
        cache_key("settings", &["team1".to_string(), "team2".to_string()], None)
    );
}

#[test]
fn multi_group_write_forgets_covered_single_group_keys() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let cache = MemoryCache::new(64);
    let settings =
        SettingsService::new(CountingRepo::new(&conn), &cache, SettingsConfig::default());

    settings.group("a").all().unwrap();
    settings.group("b").all().unwrap();
    settings.groups(["a", "b"]).all().unwrap();

    settings.groups(["a", "b"]).set("k", "v").unwrap();

    assert!(cache.missing("settings.a_").unwrap());
    assert!(cache.missing("settings.b_").unwrap());
    assert!(cache.missing("settings.a_b_").unwrap());
    assert_eq!(settings.group("a").get("k", SettingValue::Null).unwrap(), json!("v"));
}

#[test]
fn single_group_write_forgets_overlapping_multi_group_keys() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let cache = MemoryCache::new(64);
    let settings =
        SettingsService::new(CountingRepo::new(&conn), &cache, SettingsConfig::default());

    settings.group("a").set("k", "old").unwrap();
    assert_eq!(
        settings.groups(["a", "b"]).get("k", SettingValue::Null).unwrap(),
        json!("old")
    );
    assert!(!cache.missing("settings.a_b_").unwrap());

    settings.group("a").set("k", "new").unwrap();
    assert_eq!(
        settings.groups(["a", "b"]).get("k", SettingValue::Null).unwrap(),
        json!("new")
    );

    settings.groups(["b", "a"]).all().unwrap();
    settings.group("a").trash("k").unwrap();
    assert!(settings.groups(["b", "a"]).missing("k").unwrap());
}

#[test]
fn global_write_keeps_owner_scoped_keys() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let cache = MemoryCache::new(64);
    let settings =
        SettingsService::new(CountingRepo::new(&conn), &cache, SettingsConfig::default());
    let owned_key = settings
        .groups(["a", "b"])
        .for_owner(Owner::new("user", "1"))
        .cache_key();

    settings
        .groups(["a", "b"])
        .for_owner(Owner::new("user", "1"))
        .all()
        .unwrap();
    settings.group("a").set("k", "v").unwrap();

    assert!(!cache.missing(&owned_key).unwrap());
}

#[test]
fn flush_forgets_only_the_active_scope() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let cache = MemoryCache::new(64);
    let settings =
        SettingsService::new(CountingRepo::new(&conn), &cache, SettingsConfig::default());

    settings.group("a").all().unwrap();
    settings.group("b").all().unwrap();

    assert!(settings.group("a").flush().unwrap());
    assert!(!settings.group("a").flush().unwrap());
    assert!(cache.missing("settings.a_").unwrap());
    assert!(!cache.missing("settings.b_").unwrap());

    settings.flush_all_cache().unwrap();
    assert!(cache.missing("settings.b_").unwrap());
}

#[test]
fn disabled_cache_reads_store_every_time_and_flush_reports_success() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let cache = MemoryCache::new(64);
    let settings = SettingsService::new(CountingRepo::new(&conn), &cache, config_without_cache());

    settings.set("k", 1).unwrap();
    settings.get("k", SettingValue::Null).unwrap();
    settings.get("k", SettingValue::Null).unwrap();

    assert_eq!(settings.repository().plucks.get(), 2);
    assert!(cache.missing("settings.default_").unwrap());
    assert!(settings.flush().unwrap());
}

#[test]
fn disabled_cache_ignores_a_broken_backend() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let settings =
        SettingsService::new(CountingRepo::new(&conn), BrokenCache, config_without_cache());

    settings.set("k", "v").unwrap();
    assert_eq!(settings.get("k", SettingValue::Null).unwrap(), json!("v"));
}

#[test]
fn cache_failures_propagate_from_the_service() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let settings =
        SettingsService::new(CountingRepo::new(&conn), BrokenCache, SettingsConfig::default());

    assert!(matches!(
        settings.get("k", "D").unwrap_err(),
        SettingsError::Cache(CacheError::Backend(_))
    ));
    assert!(matches!(
        settings.set("k", "v").unwrap_err(),
        SettingsError::Cache(_)
    ));
}

#[test]
fn accessor_swallows_failures_into_defaults() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let settings =
        SettingsService::new(CountingRepo::new(&conn), BrokenCache, SettingsConfig::default());

    assert_eq!(
        setting_or_default(&settings.scope(), "k", "fallback"),
        json!("fallback")
    );
    assert_eq!(store_settings(&settings.scope(), [("k", "v")]), None);
}

#[test]
fn missing_table_reads_as_empty() {
    let conn = Connection::open_in_memory().unwrap();
    let config = SettingsConfig {
        debug: true,
        ..SettingsConfig::default()
    };
    let settings = SettingsService::new(CountingRepo::new(&conn), MemoryCache::new(8), config);

    assert!(settings.all().unwrap().is_empty());
    assert_eq!(settings.get("k", "D").unwrap(), json!("D"));
    assert!(!settings.has("k").unwrap());
    assert!(settings
        .scope()
        .entries(settings_core::Trashed::With)
        .unwrap()
        .is_empty());
    assert_eq!(settings.repository().plucks.get(), 0);
}

#[test]
fn missing_table_write_surfaces_store_error() {
    let conn = Connection::open_in_memory().unwrap();
    let settings =
        SettingsService::new(CountingRepo::new(&conn), NoCache, SettingsConfig::default());

    assert!(matches!(
        settings.set("k", "v").unwrap_err(),
        SettingsError::Repo(_)
    ));
}

#[test]
fn no_cache_backend_always_queries_the_store() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let settings =
        SettingsService::new(CountingRepo::new(&conn), NoCache, SettingsConfig::default());

    settings.set("k", "v").unwrap();
    assert_eq!(settings.get("k", SettingValue::Null).unwrap(), json!("v"));
    assert_eq!(settings.get("k", SettingValue::Null).unwrap(), json!("v"));
    assert_eq!(settings.repository().plucks.get(), 2);
}
