//! Settings use-case services.
//!
//! # Responsibility
//! - Resolve scoped lookups against the store through the cache.
//! - Offer the error-swallowing convenience accessors used at composition
//!   roots.

pub mod accessor;
pub mod settings_service;
