//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the store contract the settings service resolves against.
//! - Isolate SQLite query details from resolution/caching orchestration.
//!
//! # Invariants
//! - Reads never return trashed entries unless a trashed filter asks for them.
//! - Permanent deletion only ever touches trashed entries.

pub mod entry_repo;
