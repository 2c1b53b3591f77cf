//! Settings entry record.
//!
//! # Invariants
//! - `id` is assigned once at insert and never reused.
//! - (`name`, `group`, `owner`) is unique among rows that still exist,
//!   trashed rows included.
//! - `deleted_at` is the source of truth for trash state.

use crate::model::owner::Owner;
use crate::model::value::SettingValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a persisted entry.
pub type EntryId = Uuid;

/// One persisted settings row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub name: String,
    /// `Value::Null` when the stored payload is SQL `NULL`.
    pub value: SettingValue,
    pub group: String,
    /// `None` for global entries.
    pub owner: Option<Owner>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
    /// Unix epoch milliseconds; set while the entry is trashed.
    pub deleted_at: Option<i64>,
}

impl Entry {
    /// Returns whether the entry is soft-deleted.
    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Unique tuple addressing one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub name: String,
    pub group: String,
    pub owner: Option<Owner>,
}

impl EntryKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>, owner: Option<Owner>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            owner,
        }
    }
}
