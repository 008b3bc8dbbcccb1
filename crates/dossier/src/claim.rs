//! Ownership claims on a dossier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dossierflow_auth::PrincipalId;
use dossierflow_core::{Entity, OrganizationId, Reason};

/// Claim identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(Uuid);

impl ClaimId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl core::fmt::Display for ClaimId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
}

/// How a claim request was recorded.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimRequestOutcome {
    /// Awaiting a decision by the owner, the family, or an arbiter.
    Pending,
    /// The dossier was unassigned and family approval was not required, so
    /// the claim approved and reassigned immediately.
    AutoApproved,
}

/// Which side initiated a release of the dossier's assignment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseAction {
    FamilyRelease,
    FdRelease,
}

impl core::fmt::Display for ReleaseAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ReleaseAction::FamilyRelease => f.write_str("family release"),
            ReleaseAction::FdRelease => f.write_str("funeral director release"),
        }
    }
}

/// A request by an organization to take ownership of a dossier.
///
/// At most one pending claim may exist per dossier; resolved claims stay in
/// the dossier's claim history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub organization_id: OrganizationId,
    pub reason: Reason,
    pub status: ClaimStatus,
    pub requested_by: PrincipalId,
    pub requested_at: DateTime<Utc>,
    pub decided_by: Option<PrincipalId>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Claim {
    pub fn is_pending(&self) -> bool {
        self.status == ClaimStatus::Pending
    }
}

impl Entity for Claim {
    type Id = ClaimId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
