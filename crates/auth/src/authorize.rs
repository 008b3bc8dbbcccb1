//! Pure privilege checks.
//!
//! - No IO
//! - No panics
//! - No business logic beyond the policy itself
//!
//! Each check returns `WorkflowError::Forbidden` naming the action so the
//! operator sees exactly which privilege was missing.

use dossierflow_core::{OrganizationId, WorkflowError, WorkflowResult};

use crate::{Actor, OrgKind};

/// Platform-admin-only actions (e.g. legal holds).
pub fn require_platform_admin(actor: &Actor, action: &str) -> WorkflowResult<()> {
    if actor.is_platform_admin() {
        Ok(())
    } else {
        Err(WorkflowError::forbidden(format!(
            "{action} requires platform admin privilege (actor is {})",
            actor.kind
        )))
    }
}

/// Insurer-or-admin actions (e.g. insurer holds).
pub fn require_insurer_or_admin(actor: &Actor, action: &str) -> WorkflowResult<()> {
    match actor.kind {
        OrgKind::Insurer | OrgKind::PlatformAdmin => Ok(()),
        other => Err(WorkflowError::forbidden(format!(
            "{action} requires insurer or platform admin privilege (actor is {other})"
        ))),
    }
}

/// Actions reserved to a specific organization (or a platform admin).
pub fn require_org(actor: &Actor, org: OrganizationId, action: &str) -> WorkflowResult<()> {
    if actor.is_platform_admin() || actor.acts_for(org) {
        Ok(())
    } else {
        Err(WorkflowError::forbidden(format!(
            "{action} is reserved to the owning organization"
        )))
    }
}

/// Family-side actions (or a platform admin acting on the family's behalf).
pub fn require_family_or_admin(actor: &Actor, action: &str) -> WorkflowResult<()> {
    match actor.kind {
        OrgKind::Family | OrgKind::PlatformAdmin => Ok(()),
        other => Err(WorkflowError::forbidden(format!(
            "{action} requires a family-side actor (actor is {other})"
        ))),
    }
}
