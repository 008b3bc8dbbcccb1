use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dossierflow_auth::PrincipalId;
use dossierflow_core::{Entity, Reason};

/// Hold identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HoldId(Uuid);

impl HoldId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl core::fmt::Display for HoldId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The kind of authority a hold derives from.
///
/// At most one *active* hold per kind may exist on a dossier. Legal holds
/// set the dossier's `legal_hold` flag; insurer holds block progression but
/// leave that flag untouched.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldKind {
    Legal,
    Insurer,
}

impl core::fmt::Display for HoldKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HoldKind::Legal => f.write_str("legal"),
            HoldKind::Insurer => f.write_str("insurer"),
        }
    }
}

/// Record of a hold being lifted. Kept on the hold, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldLift {
    pub reason: Reason,
    pub lifted_by: PrincipalId,
    pub lifted_at: DateTime<Utc>,
}

/// A block placed on a dossier by an authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    pub id: HoldId,
    pub kind: HoldKind,
    pub reason: Reason,
    /// Placing authority or contact (prosecutor's office, insurer desk, ...).
    pub authority: String,
    /// External reference / case number, when the authority supplied one.
    pub reference: Option<String>,
    pub placed_by: PrincipalId,
    pub placed_at: DateTime<Utc>,
    pub lift: Option<HoldLift>,
}

impl Hold {
    pub fn is_active(&self) -> bool {
        self.lift.is_none()
    }
}

impl Entity for Hold {
    type Id = HoldId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
