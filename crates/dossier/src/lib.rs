//! `dossierflow-dossier` — the dossier lifecycle state machine and claim
//! arbiter, modeled as one event-sourced aggregate.
//!
//! The dossier is the central case record of the platform: it owns its hold
//! ledger, its pending ownership claim, and its phase progression. All
//! decisions are pure (`handle`), all state evolution happens through applied
//! events, and the surrounding engine provides the per-dossier concurrency
//! boundary.

pub mod claim;
pub mod dossier;
pub mod lifecycle;

pub use claim::{Claim, ClaimId, ClaimRequestOutcome, ClaimStatus, ReleaseAction};
pub use dossier::{
    Activate, AutoProgress, BeginIntake, DecideClaim, Dossier, DossierCommand, DossierEvent,
    DossierId, LiftHold, OpenDossier, PlaceHold, Release, RequestClaim, RequestDelete, SetFlow,
    SoftDelete,
};
pub use lifecycle::{DossierStatus, Flow, Phase, ProgressOutcome};
