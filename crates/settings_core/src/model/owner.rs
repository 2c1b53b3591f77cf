//! Owner ("settable") references.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// External entity instance an entry is scoped to.
///
/// Global entries carry no owner; use `Option<Owner>` for that case so kind
/// and id can never be set independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    /// Type discriminator, e.g. `"user"`.
    pub kind: String,
    /// Identity of the instance within `kind`.
    pub id: String,
}

impl Owner {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Derives the owner reference from an entity instance.
    pub fn of<S: Settable + ?Sized>(entity: &S) -> Self {
        Self::new(entity.settable_type(), entity.settable_id())
    }

    /// Parses the `TYPE:ID` form used on command lines.
    ///
    /// Splits on the first `:`; both halves must be non-empty.
    pub fn parse(value: &str) -> Option<Self> {
        let (kind, id) = value.split_once(':')?;
        let kind = kind.trim();
        let id = id.trim();
        if kind.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self::new(kind, id))
    }
}

impl Display for Owner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Entities that can own settings.
pub trait Settable {
    /// Concrete kind of the entity.
    fn settable_type(&self) -> String;
    /// Identity field of the entity.
    fn settable_id(&self) -> String;
}
