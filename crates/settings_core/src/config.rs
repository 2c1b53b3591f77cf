//! Settings configuration surface.
//!
//! # Responsibility
//! - Describe the backing table, cache policy, default group and principal
//!   overrides consumed by the service.
//! - Load layered configuration: `settings.toml` (optional), an explicit
//!   file, then `SETTINGS__*` environment variables.
//!
//! # Invariants
//! - Table and column names are valid SQL identifiers after loading.
//! - The default group and cache key are never empty.

use crate::db::is_valid_identifier;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TABLE: &str = "settings";
pub const DEFAULT_NAME_COLUMN: &str = "name";
pub const DEFAULT_VALUE_COLUMN: &str = "value";
pub const DEFAULT_GROUP: &str = "default";
pub const DEFAULT_CACHE_KEY: &str = "settings";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Columns every settings table carries regardless of configuration.
const FIXED_COLUMNS: &[&str] = &[
    "id",
    "group",
    "owner_type",
    "owner_id",
    "created_at",
    "updated_at",
    "deleted_at",
];

const CONFIG_BASENAME: &str = "settings";
const ENV_PREFIX: &str = "SETTINGS";

/// Names used by the persisted schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaNames {
    pub table: String,
    pub name_column: String,
    pub value_column: String,
    /// Group written when none is selected; also the column default.
    pub default_group: String,
}

impl Default for SchemaNames {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            name_column: DEFAULT_NAME_COLUMN.to_string(),
            value_column: DEFAULT_VALUE_COLUMN.to_string(),
            default_group: DEFAULT_GROUP.to_string(),
        }
    }
}

/// Cache policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// When false every read goes to the store and `flush` is a no-op.
    pub enabled: bool,
    /// Prefix of every cache key.
    pub key: String,
    pub ttl: Duration,
    /// Upper bound on cached scopes for the in-memory cache.
    pub capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key: DEFAULT_CACHE_KEY.to_string(),
            ttl: DEFAULT_CACHE_TTL,
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Complete, validated settings configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsConfig {
    pub schema: SchemaNames,
    pub cache: CacheConfig,
    /// Replaces the principal's kind when scoping to the current user.
    pub user_owner_type: Option<String>,
    /// Emits warnings for degraded reads (missing table).
    pub debug: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    Build(config::ConfigError),
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Build(err) => write!(f, "failed to build configuration: {err}"),
            Self::Invalid { key, reason } => {
                write!(f, "invalid configuration for `{key}`: {reason}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Build(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(value: config::ConfigError) -> Self {
        Self::Build(value)
    }
}

/// Loads configuration from the default file, `file` and the environment.
///
/// Later sources win. Environment keys use `__` as separator, e.g.
/// `SETTINGS__CACHE__TTL_SECS=60`.
pub fn load(file: Option<&Path>) -> Result<SettingsConfig, ConfigError> {
    let mut builder =
        Config::builder().add_source(File::with_name(CONFIG_BASENAME).required(false));

    if let Some(path) = file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let raw: RawSettingsConfig = builder.build()?.try_deserialize()?;
    SettingsConfig::from_raw(raw)
}

/// Loads configuration from one file only, ignoring environment and the
/// default file.
pub fn load_file(path: &Path) -> Result<SettingsConfig, ConfigError> {
    let raw: RawSettingsConfig = Config::builder()
        .add_source(File::from(path).required(true))
        .build()?
        .try_deserialize()?;
    SettingsConfig::from_raw(raw)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSettingsConfig {
    pub table: Option<String>,
    pub columns: RawColumns,
    pub cache: RawCache,
    pub group: RawGroup,
    pub user: RawUser,
    pub debug: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawColumns {
    pub name: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCache {
    pub enabled: Option<bool>,
    pub key: Option<String>,
    pub ttl_secs: Option<u64>,
    pub capacity: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawGroup {
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawUser {
    pub owner_type: Option<String>,
}

impl SettingsConfig {
    /// Validates raw values and fills in defaults.
    pub fn from_raw(raw: RawSettingsConfig) -> Result<Self, ConfigError> {
        let schema = SchemaNames {
            table: identifier("table", raw.table, DEFAULT_TABLE)?,
            name_column: identifier("columns.name", raw.columns.name, DEFAULT_NAME_COLUMN)?,
            value_column: identifier("columns.value", raw.columns.value, DEFAULT_VALUE_COLUMN)?,
            default_group: non_empty("group.default", raw.group.default, DEFAULT_GROUP)?,
        };
        column_is_free("columns.name", &schema.name_column)?;
        column_is_free("columns.value", &schema.value_column)?;
        // SQLite column names are case-insensitive.
        if schema.name_column.eq_ignore_ascii_case(&schema.value_column) {
            return Err(ConfigError::invalid(
                "columns.value",
                "must differ from columns.name",
            ));
        }

        let capacity = raw.cache.capacity.unwrap_or(DEFAULT_CACHE_CAPACITY);
        if capacity == 0 {
            return Err(ConfigError::invalid("cache.capacity", "must be positive"));
        }
        let cache = CacheConfig {
            enabled: raw.cache.enabled.unwrap_or(true),
            key: non_empty("cache.key", raw.cache.key, DEFAULT_CACHE_KEY)?,
            ttl: raw
                .cache
                .ttl_secs
                .map_or(DEFAULT_CACHE_TTL, Duration::from_secs),
            capacity,
        };

        let user_owner_type = match raw.user.owner_type {
            Some(kind) if kind.trim().is_empty() => {
                return Err(ConfigError::invalid("user.owner_type", "cannot be empty"));
            }
            Some(kind) => Some(kind.trim().to_string()),
            None => None,
        };

        Ok(Self {
            schema,
            cache,
            user_owner_type,
            debug: raw.debug.unwrap_or(false),
        })
    }
}

fn identifier(
    key: &'static str,
    value: Option<String>,
    default: &str,
) -> Result<String, ConfigError> {
    let value = value.unwrap_or_else(|| default.to_string());
    if !is_valid_identifier(&value) {
        return Err(ConfigError::invalid(
            key,
            format!("`{value}` is not a valid SQL identifier"),
        ));
    }
    Ok(value)
}

fn column_is_free(key: &'static str, column: &str) -> Result<(), ConfigError> {
    match FIXED_COLUMNS
        .iter()
        .find(|fixed| fixed.eq_ignore_ascii_case(column))
    {
        Some(fixed) => Err(ConfigError::invalid(
            key,
            format!("`{column}` clashes with the built-in `{fixed}` column"),
        )),
        None => Ok(()),
    }
}

fn non_empty(
    key: &'static str,
    value: Option<String>,
    default: &str,
) -> Result<String, ConfigError> {
    match value {
        Some(value) if value.trim().is_empty() => Err(ConfigError::invalid(key, "cannot be empty")),
        Some(value) => Ok(value.trim().to_string()),
        None => Ok(default.to_string()),
    }
}
