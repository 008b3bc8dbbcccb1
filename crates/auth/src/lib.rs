//! `dossierflow-auth` — actor identity and privilege policy.
//!
//! The workflow engine never talks to an identity provider directly: callers
//! resolve a fully-formed [`Actor`] (principal + organization + kind) and the
//! domain layer applies pure policy checks against it.

pub mod actor;
pub mod authorize;
pub mod principal;

pub use actor::{Actor, OrgKind};
pub use authorize::{
    require_family_or_admin, require_insurer_or_admin, require_org, require_platform_admin,
};
pub use principal::PrincipalId;
