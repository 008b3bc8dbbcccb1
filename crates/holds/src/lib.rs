//! `dossierflow-holds` — the hold ledger.
//!
//! Tracks legal and insurer holds per dossier. A hold blocks lifecycle
//! progression while active; lifted holds stay in history forever.

pub mod hold;
pub mod ledger;

pub use hold::{Hold, HoldId, HoldKind, HoldLift};
pub use ledger::{BlockStatus, HoldLedger, ensure_hold_privilege};
