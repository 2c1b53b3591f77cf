use rusqlite::Connection;
use serde_json::json;
use settings_core::db::open_db_in_memory;
use settings_core::{
    MemoryCache, Owner, SchemaNames, SettingValue, SettingsConfig, SettingsService,
    SqliteEntryRepository, Trashed,
};

fn service(conn: &Connection) -> SettingsService<SqliteEntryRepository<'_>, MemoryCache> {
    let repo = SqliteEntryRepository::try_new(conn, &SchemaNames::default()).unwrap();
    SettingsService::new(repo, MemoryCache::new(64), SettingsConfig::default())
}

fn row_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM settings;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn trash_hides_entry_and_restore_brings_it_back() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let settings = service(&conn);
    settings.set("app_name", "Laravel").unwrap();
    assert!(settings.has("app_name").unwrap());

    assert_eq!(settings.trash("app_name").unwrap(), 1);
    assert!(!settings.has("app_name").unwrap());
    assert_eq!(settings.get("app_name", "gone").unwrap(), json!("gone"));
    assert!(settings.all().unwrap().is_empty());

    let trashed = settings.scope().entries(Trashed::Only).unwrap();
    assert_eq!(trashed.len(), 1);
    assert!(trashed[0].is_trashed());

    assert_eq!(settings.restore("app_name").unwrap(), 1);
    assert_eq!(
        settings.get("app_name", SettingValue::Null).unwrap(),
        json!("Laravel")
    );
    assert!(settings.scope().entries(Trashed::Only).unwrap().is_empty());
}

#[test]
fn delete_only_removes_trashed_entries() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let settings = service(&conn);
    settings.set("app_name", "Laravel").unwrap();

    assert_eq!(settings.delete("app_name").unwrap(), 0);
    assert_eq!(
        settings.get("app_name", SettingValue::Null).unwrap(),
        json!("Laravel")
    );
    assert_eq!(row_count(&conn), 1);

    settings.trash("app_name").unwrap();
    assert_eq!(settings.delete("app_name").unwrap(), 1);
    assert_eq!(row_count(&conn), 0);
    assert_eq!(settings.restore("app_name").unwrap(), 0);
    assert!(settings.missing("app_name").unwrap());
}

#[test]
fn destructive_ops_on_unknown_key_affect_nothing() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let settings = service(&conn);

    assert_eq!(settings.trash("absent").unwrap(), 0);
    assert_eq!(settings.restore("absent").unwrap(), 0);
    assert_eq!(settings.delete("absent").unwrap(), 0);
}

#[test]
fn repeated_trash_and_restore_are_idempotent() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let settings = service(&conn);
    settings.set("k", 1).unwrap();

    assert_eq!(settings.trash("k").unwrap(), 1);
    assert_eq!(settings.trash("k").unwrap(), 0);
    assert_eq!(settings.restore("k").unwrap(), 1);
    assert_eq!(settings.restore("k").unwrap(), 0);
}

#[test]
fn destructive_ops_are_limited_to_the_active_scope() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let settings = service(&conn);
    let owner = Owner::new("user", "1");

    settings.group("a").set("k", "in a").unwrap();
    settings.group("b").set("k", "in b").unwrap();
    settings.group("a").for_owner(owner.clone()).set("k", "mine").unwrap();

    assert_eq!(settings.group("a").trash("k").unwrap(), 1);

    assert!(settings.group("a").missing("k").unwrap());
    assert_eq!(
        settings.group("b").get("k", SettingValue::Null).unwrap(),
        json!("in b")
    );
    assert_eq!(
        settings
            .group("a")
            .for_owner(owner.clone())
            .get("k", SettingValue::Null)
            .unwrap(),
        json!("mine")
    );

    assert_eq!(settings.group("b").delete("k").unwrap(), 0);
    assert_eq!(settings.group("a").for_owner(owner).restore("k").unwrap(), 0);
    assert_eq!(settings.group("a").restore("k").unwrap(), 1);
}

#[test]
fn writing_a_trashed_key_revives_it_with_the_new_value() {
    let conn = open_db_in_memory(&SchemaNames::default()).unwrap();
    let settings = service(&conn);
    settings.set("k", "old").unwrap();
    let original_id = settings.scope().entries(Trashed::Without).unwrap()[0].id;
    settings.trash("k").unwrap();

    settings.set("k", "new").unwrap();

    let entries = settings.scope().entries(Trashed::With).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, original_id);
    assert!(!entries[0].is_trashed());
    assert_eq!(entries[0].value, json!("new"));
}
