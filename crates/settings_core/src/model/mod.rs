//! Settings domain model.
//!
//! # Responsibility
//! - Define the persisted entry shape and the owner reference it is scoped to.
//! - Define the value type and its truthiness rules used by `remember`.
//!
//! # Invariants
//! - An owner reference is either fully present (kind + id) or absent.
//! - Deletion is a soft-delete marker first; permanent removal is explicit.

pub mod entry;
pub mod owner;
pub mod value;
