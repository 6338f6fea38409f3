//! Acting principal resolution.

use crate::model::change::PrincipalId;

/// Resolves who is performing the change being opened.
///
/// Called once per `begin`/`run_in_session`.
pub trait PrincipalResolver {
    fn resolve_principal(&self) -> Option<PrincipalId>;
}

/// Resolver used when no principal source is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrincipal;

impl PrincipalResolver for NoPrincipal {
    fn resolve_principal(&self) -> Option<PrincipalId> {
        None
    }
}

impl<F> PrincipalResolver for F
where
    F: Fn() -> Option<PrincipalId>,
{
    fn resolve_principal(&self) -> Option<PrincipalId> {
        self()
    }
}
