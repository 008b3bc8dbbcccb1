use serde::{Deserialize, Serialize};

use dossierflow_core::{OrganizationId, TenantId};

use crate::PrincipalId;

/// The kind of organization an actor acts for.
///
/// Privilege in this domain is coarse-grained by organization type rather
/// than fine-grained permissions: a platform admin can do everything, an
/// insurer can manage insurer holds, a family contact can release a dossier
/// on the family side, and so on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgKind {
    PlatformAdmin,
    FuneralDirector,
    Mosque,
    Mortuary,
    Insurer,
    Family,
}

impl core::fmt::Display for OrgKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            OrgKind::PlatformAdmin => "platform_admin",
            OrgKind::FuneralDirector => "funeral_director",
            OrgKind::Mosque => "mosque",
            OrgKind::Mortuary => "mortuary",
            OrgKind::Insurer => "insurer",
            OrgKind::Family => "family",
        };
        f.write_str(name)
    }
}

/// A fully resolved actor for authorization decisions.
///
/// Construction is decoupled from storage and transport: callers derive this
/// from their session/claims source before invoking the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub principal_id: PrincipalId,
    pub tenant_id: TenantId,
    /// Organization the actor acts for; platform admins and family contacts
    /// may act without one.
    pub organization_id: Option<OrganizationId>,
    pub kind: OrgKind,
}

impl Actor {
    pub fn new(
        principal_id: PrincipalId,
        tenant_id: TenantId,
        organization_id: Option<OrganizationId>,
        kind: OrgKind,
    ) -> Self {
        Self {
            principal_id,
            tenant_id,
            organization_id,
            kind,
        }
    }

    pub fn is_platform_admin(&self) -> bool {
        self.kind == OrgKind::PlatformAdmin
    }

    /// True when this actor acts on behalf of `org`.
    pub fn acts_for(&self, org: OrganizationId) -> bool {
        self.organization_id == Some(org)
    }
}
