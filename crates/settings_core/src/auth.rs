//! Caller identity used for user-scoped settings.

use crate::model::owner::Owner;

/// Supplies the currently authenticated principal, if any.
pub trait PrincipalProvider {
    fn current_principal(&self) -> Option<Owner>;
}

impl<F> PrincipalProvider for F
where
    F: Fn() -> Option<Owner>,
{
    fn current_principal(&self) -> Option<Owner> {
        self()
    }
}

/// Provider returning the same principal on every call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedPrincipal(pub Option<Owner>);

impl FixedPrincipal {
    pub fn authenticated(owner: Owner) -> Self {
        Self(Some(owner))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl PrincipalProvider for FixedPrincipal {
    fn current_principal(&self) -> Option<Owner> {
        self.0.clone()
    }
}
