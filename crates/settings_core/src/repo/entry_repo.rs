//! Settings entry store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide filter/upsert/trash/restore/purge APIs over the settings table.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - `upsert` never creates a second row for an existing
//!   (`name`, `group`, `owner`) tuple, trashed rows included.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::config::SchemaNames;
use crate::db::{is_valid_identifier, table_exists, DbError};
use crate::model::entry::{Entry, EntryId, EntryKey};
use crate::model::owner::Owner;
use crate::model::value::{SettingValue, SettingsMap};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const NOW_MS_SQL: &str = "CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)";

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from settings persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// A value could not be encoded to or decoded from its JSON payload.
    Serialization(serde_json::Error),
    /// Persisted data cannot be converted to a valid entry.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "setting value serialization failed: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted setting data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Trash visibility for entry queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Trashed {
    /// Live entries only.
    #[default]
    Without,
    /// Live and trashed entries.
    With,
    /// Trashed entries only.
    Only,
}

/// Owner constraint for entry queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OwnerFilter {
    /// No owner constraint.
    #[default]
    Any,
    /// Global entries (no owner) only.
    Global,
    Exactly(Owner),
}

impl From<Option<Owner>> for OwnerFilter {
    fn from(value: Option<Owner>) -> Self {
        value.map_or(Self::Global, Self::Exactly)
    }
}

/// Filter over settings entries.
///
/// Empty `groups` means any group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub name: Option<String>,
    pub groups: Vec<String>,
    pub owner: OwnerFilter,
    pub trashed: Trashed,
}

impl EntryFilter {
    /// Matches entries with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn in_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn owned_by(mut self, owner: impl Into<OwnerFilter>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn with_trashed(mut self, trashed: Trashed) -> Self {
        self.trashed = trashed;
        self
    }
}

/// Store contract consumed by the settings service.
pub trait EntryRepository {
    /// Returns whether the backing table has been provisioned.
    fn table_exists(&self) -> RepoResult<bool>;
    /// Projects live matching entries as `name -> value`.
    ///
    /// Ignores `filter.trashed`.
    fn pluck(&self, filter: &EntryFilter) -> RepoResult<SettingsMap>;
    /// Writes `value` for the tuple, creating the entry if needed.
    fn upsert(&self, key: &EntryKey, value: &SettingValue) -> RepoResult<EntryId>;
    /// Marks live matching entries as trashed. Returns affected rows.
    fn soft_delete(&self, filter: &EntryFilter) -> RepoResult<usize>;
    /// Clears the trash marker on trashed matching entries.
    fn restore(&self, filter: &EntryFilter) -> RepoResult<usize>;
    /// Permanently removes trashed matching entries.
    fn force_delete(&self, filter: &EntryFilter) -> RepoResult<usize>;
    /// Lists matching entries honoring `filter.trashed`.
    fn list_entries(&self, filter: &EntryFilter) -> RepoResult<Vec<Entry>>;
}

/// SQLite-backed settings store.
pub struct SqliteEntryRepository<'conn> {
    conn: &'conn Connection,
    table: String,
    name_column: String,
    value_column: String,
}

impl<'conn> SqliteEntryRepository<'conn> {
    /// Builds a repository for the configured table.
    ///
    /// The table does not need to exist yet; reads degrade to empty results
    /// until it is provisioned.
    pub fn try_new(conn: &'conn Connection, schema: &SchemaNames) -> RepoResult<Self> {
        for identifier in [&schema.table, &schema.name_column, &schema.value_column] {
            if !is_valid_identifier(identifier) {
                return Err(DbError::InvalidIdentifier(identifier.clone()).into());
            }
        }

        Ok(Self {
            conn,
            table: schema.table.clone(),
            name_column: schema.name_column.clone(),
            value_column: schema.value_column.clone(),
        })
    }

    fn select_sql(&self) -> String {
        format!(
            "SELECT
                id,
                \"{name}\" AS name,
                \"{value}\" AS value,
                \"group\",
                owner_type,
                owner_id,
                created_at,
                updated_at,
                deleted_at
            FROM \"{table}\"",
            name = self.name_column,
            value = self.value_column,
            table = self.table,
        )
    }

    fn where_clause(&self, filter: &EntryFilter, trashed: Trashed) -> (String, Vec<Value>) {
        let mut sql = String::from(" WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        match trashed {
            Trashed::Without => sql.push_str(" AND deleted_at IS NULL"),
            Trashed::Only => sql.push_str(" AND deleted_at IS NOT NULL"),
            Trashed::With => {}
        }

        if let Some(name) = &filter.name {
            sql.push_str(&format!(" AND \"{}\" = ?", self.name_column));
            bind_values.push(Value::Text(name.clone()));
        }

        if !filter.groups.is_empty() {
            let placeholders = vec!["?"; filter.groups.len()].join(", ");
            sql.push_str(&format!(" AND \"group\" IN ({placeholders})"));
            bind_values.extend(filter.groups.iter().cloned().map(Value::Text));
        }

        match &filter.owner {
            OwnerFilter::Any => {}
            OwnerFilter::Global => sql.push_str(" AND owner_type IS NULL AND owner_id IS NULL"),
            OwnerFilter::Exactly(owner) => {
                sql.push_str(" AND owner_type = ? AND owner_id = ?");
                bind_values.push(Value::Text(owner.kind.clone()));
                bind_values.push(Value::Text(owner.id.clone()));
            }
        }

        (sql, bind_values)
    }
}

impl EntryRepository for SqliteEntryRepository<'_> {
    fn table_exists(&self) -> RepoResult<bool> {
        Ok(table_exists(self.conn, &self.table)?)
    }

    fn pluck(&self, filter: &EntryFilter) -> RepoResult<SettingsMap> {
        let (where_sql, bind_values) = self.where_clause(filter, Trashed::Without);
        let sql = format!(
            "SELECT \"{name}\", \"{value}\" FROM \"{table}\"{where_sql} ORDER BY \"{name}\" ASC",
            name = self.name_column,
            value = self.value_column,
            table = self.table,
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut settings = SettingsMap::new();
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let value = decode_value(row.get(1)?)?;
            settings.insert(name, value);
        }

        Ok(settings)
    }

    fn upsert(&self, key: &EntryKey, value: &SettingValue) -> RepoResult<EntryId> {
        let encoded = encode_value(value)?;
        let owner_type = key.owner.as_ref().map(|owner| owner.kind.as_str());
        let owner_id = key.owner.as_ref().map(|owner| owner.id.as_str());

        // Why: a trashed row still occupies the tuple in the unique index, so
        // it is revived in place; the live/trashed state never splits a tuple.
        let tx = self.conn.unchecked_transaction()?;
        let updated: Option<String> = tx
            .query_row(
                &format!(
                    "UPDATE \"{table}\"
                     SET
                        \"{value}\" = ?1,
                        deleted_at = NULL,
                        updated_at = {NOW_MS_SQL}
                     WHERE \"{name}\" = ?2
                       AND \"group\" = ?3
                       AND owner_type IS ?4
                       AND owner_id IS ?5
                     RETURNING id;",
                    table = self.table,
                    value = self.value_column,
                    name = self.name_column,
                ),
                params![encoded, key.name, key.group, owner_type, owner_id],
                |row| row.get(0),
            )
            .optional()?;

        let id = match updated {
            Some(id_text) => parse_entry_id(&id_text)?,
            None => {
                let id = Uuid::new_v4();
                tx.execute(
                    &format!(
                        "INSERT INTO \"{table}\" (
                            id,
                            \"{name}\",
                            \"{value}\",
                            \"group\",
                            owner_type,
                            owner_id,
                            created_at,
                            updated_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, {NOW_MS_SQL}, {NOW_MS_SQL});",
                        table = self.table,
                        name = self.name_column,
                        value = self.value_column,
                    ),
                    params![
                        id.to_string(),
                        key.name,
                        encoded,
                        key.group,
                        owner_type,
                        owner_id
                    ],
                )?;
                id
            }
        };
        tx.commit()?;

        Ok(id)
    }

    fn soft_delete(&self, filter: &EntryFilter) -> RepoResult<usize> {
        let (where_sql, bind_values) = self.where_clause(filter, Trashed::Without);
        let sql = format!(
            "UPDATE \"{table}\" SET deleted_at = {NOW_MS_SQL}, updated_at = {NOW_MS_SQL}{where_sql};",
            table = self.table,
        );
        Ok(self.conn.execute(&sql, params_from_iter(bind_values))?)
    }

    fn restore(&self, filter: &EntryFilter) -> RepoResult<usize> {
        let (where_sql, bind_values) = self.where_clause(filter, Trashed::Only);
        let sql = format!(
            "UPDATE \"{table}\" SET deleted_at = NULL, updated_at = {NOW_MS_SQL}{where_sql};",
            table = self.table,
        );
        Ok(self.conn.execute(&sql, params_from_iter(bind_values))?)
    }

    fn force_delete(&self, filter: &EntryFilter) -> RepoResult<usize> {
        let (where_sql, bind_values) = self.where_clause(filter, Trashed::Only);
        let sql = format!("DELETE FROM \"{table}\"{where_sql};", table = self.table);
        Ok(self.conn.execute(&sql, params_from_iter(bind_values))?)
    }

    fn list_entries(&self, filter: &EntryFilter) -> RepoResult<Vec<Entry>> {
        let (where_sql, bind_values) = self.where_clause(filter, filter.trashed);
        let sql = format!(
            "{}{where_sql} ORDER BY \"group\" ASC, name ASC, owner_type ASC, owner_id ASC",
            self.select_sql()
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_entry_row(row)?);
        }

        Ok(entries)
    }
}

fn parse_entry_row(row: &Row<'_>) -> RepoResult<Entry> {
    let id_text: String = row.get("id")?;
    let id = parse_entry_id(&id_text)?;

    let owner = match (
        row.get::<_, Option<String>>("owner_type")?,
        row.get::<_, Option<String>>("owner_id")?,
    ) {
        (Some(kind), Some(owner_id)) => Some(Owner::new(kind, owner_id)),
        (None, None) => None,
        _ => {
            return Err(RepoError::InvalidData(format!(
                "entry {id} has a partial owner reference"
            )));
        }
    };

    Ok(Entry {
        id,
        name: row.get("name")?,
        value: decode_value(row.get("value")?)?,
        group: row.get("group")?,
        owner,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn parse_entry_id(value: &str) -> RepoResult<EntryId> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid entry id `{value}`")))
}

fn encode_value(value: &SettingValue) -> RepoResult<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(value)?))
}

fn decode_value(payload: Option<String>) -> RepoResult<SettingValue> {
    match payload {
        Some(text) => Ok(serde_json::from_str(&text)?),
        None => Ok(SettingValue::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_value, encode_value, EntryFilter, OwnerFilter, Trashed};
    use crate::model::owner::Owner;
    use serde_json::json;

    #[test]
    fn null_is_stored_as_sql_null() {
        assert_eq!(encode_value(&json!(null)).unwrap(), None);
        assert_eq!(decode_value(None).unwrap(), json!(null));
        assert_eq!(
            encode_value(&json!("Laravel")).unwrap().as_deref(),
            Some("\"Laravel\"")
        );
    }

    #[test]
    fn filter_builder_sets_every_constraint() {
        let filter = EntryFilter::named("app_name")
            .in_groups(["a", "b"])
            .owned_by(Some(Owner::new("user", "1")))
            .with_trashed(Trashed::Only);

        assert_eq!(filter.name.as_deref(), Some("app_name"));
        assert_eq!(filter.groups, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            filter.owner,
            OwnerFilter::Exactly(Owner::new("user", "1"))
        );
        assert_eq!(filter.trashed, Trashed::Only);
        assert_eq!(
            EntryFilter::default().owned_by(None).owner,
            OwnerFilter::Global
        );
    }
}
