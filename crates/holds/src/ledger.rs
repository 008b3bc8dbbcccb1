//! Per-dossier hold ledger.
//!
//! The ledger lives inside the dossier aggregate's state: guard checks are
//! pure (`ensure_*`, `block_status`) and mutations (`place`, `lift`) are
//! driven by applied events, so the check-then-act pair commits atomically
//! under the aggregate's optimistic concurrency boundary.

use serde::{Deserialize, Serialize};

use dossierflow_auth::{Actor, require_insurer_or_admin, require_platform_admin};
use dossierflow_core::{WorkflowError, WorkflowResult};

use crate::hold::{Hold, HoldKind, HoldLift};

/// Result of the `is_blocked` read: whether any active hold exists, and which.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStatus {
    pub blocked: bool,
    pub kind: Option<HoldKind>,
    pub message: Option<String>,
}

impl BlockStatus {
    pub fn clear() -> Self {
        Self {
            blocked: false,
            kind: None,
            message: None,
        }
    }
}

/// Privilege rule per hold kind: legal holds are platform-admin only,
/// insurer holds take an insurer or an admin. Lifting follows the same rule.
pub fn ensure_hold_privilege(actor: &Actor, kind: HoldKind, action: &str) -> WorkflowResult<()> {
    match kind {
        HoldKind::Legal => require_platform_admin(actor, action),
        HoldKind::Insurer => require_insurer_or_admin(actor, action),
    }
}

/// Append-only collection of holds for one dossier.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HoldLedger {
    holds: Vec<Hold>,
}

impl HoldLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active hold of `kind`, if any.
    pub fn active(&self, kind: HoldKind) -> Option<&Hold> {
        self.holds.iter().find(|h| h.kind == kind && h.is_active())
    }

    /// Full history, lifted holds included.
    pub fn history(&self) -> &[Hold] {
        &self.holds
    }

    /// Guard: placing a second active hold of the same kind is a conflict.
    pub fn ensure_can_place(&self, kind: HoldKind) -> WorkflowResult<()> {
        if self.active(kind).is_some() {
            Err(WorkflowError::already_held(format!(
                "an active {kind} hold already exists on this dossier"
            )))
        } else {
            Ok(())
        }
    }

    /// Guard: lifting requires an active hold of that kind.
    pub fn ensure_can_lift(&self, kind: HoldKind) -> WorkflowResult<()> {
        if self.active(kind).is_none() {
            Err(WorkflowError::not_held(format!(
                "no active {kind} hold exists on this dossier"
            )))
        } else {
            Ok(())
        }
    }

    /// Record a placed hold. Callers must have run `ensure_can_place` first
    /// (event application trusts the decision that produced the event).
    pub fn place(&mut self, hold: Hold) {
        self.holds.push(hold);
    }

    /// Mark the active hold of `kind` as lifted. No-op if none is active.
    pub fn lift(&mut self, kind: HoldKind, lift: HoldLift) {
        if let Some(hold) = self
            .holds
            .iter_mut()
            .find(|h| h.kind == kind && h.is_active())
        {
            hold.lift = Some(lift);
        }
    }

    /// True iff any active legal hold exists. Insurer holds block
    /// progression but do not raise this flag.
    pub fn legal_hold(&self) -> bool {
        self.active(HoldKind::Legal).is_some()
    }

    /// Pure read used as a progression guard.
    pub fn block_status(&self) -> BlockStatus {
        // Legal holds take precedence in reporting.
        for kind in [HoldKind::Legal, HoldKind::Insurer] {
            if let Some(hold) = self.active(kind) {
                return BlockStatus {
                    blocked: true,
                    kind: Some(kind),
                    message: Some(format!("active {kind} hold: {}", hold.reason)),
                };
            }
        }
        BlockStatus::clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hold::HoldId;
    use chrono::Utc;
    use dossierflow_auth::PrincipalId;
    use dossierflow_core::Reason;
    use proptest::prelude::*;

    fn test_hold(kind: HoldKind, reason: &str) -> Hold {
        Hold {
            id: HoldId::new(),
            kind,
            reason: Reason::new("hold", reason).unwrap(),
            authority: "test authority".to_string(),
            reference: None,
            placed_by: PrincipalId::new(),
            placed_at: Utc::now(),
            lift: None,
        }
    }

    fn test_lift(reason: &str) -> HoldLift {
        HoldLift {
            reason: Reason::new("lift", reason).unwrap(),
            lifted_by: PrincipalId::new(),
            lifted_at: Utc::now(),
        }
    }

    #[test]
    fn placed_hold_blocks_until_lifted() {
        let mut ledger = HoldLedger::new();
        assert!(!ledger.block_status().blocked);

        ledger.place(test_hold(HoldKind::Insurer, "claim dispute"));
        let status = ledger.block_status();
        assert!(status.blocked);
        assert_eq!(status.kind, Some(HoldKind::Insurer));
        assert!(status.message.unwrap().contains("claim dispute"));

        ledger.lift(HoldKind::Insurer, test_lift("dispute resolved"));
        assert!(!ledger.block_status().blocked);
    }

    #[test]
    fn second_active_hold_of_same_kind_is_rejected() {
        let mut ledger = HoldLedger::new();
        ledger.place(test_hold(HoldKind::Legal, "investigation"));

        let err = ledger.ensure_can_place(HoldKind::Legal).unwrap_err();
        match err {
            WorkflowError::AlreadyHeld(msg) => assert!(msg.contains("legal")),
            _ => panic!("expected AlreadyHeld"),
        }

        // A different kind is still placeable.
        assert!(ledger.ensure_can_place(HoldKind::Insurer).is_ok());
    }

    #[test]
    fn lifting_without_active_hold_is_not_held() {
        let ledger = HoldLedger::new();
        let err = ledger.ensure_can_lift(HoldKind::Insurer).unwrap_err();
        match err {
            WorkflowError::NotHeld(msg) => assert!(msg.contains("insurer")),
            _ => panic!("expected NotHeld"),
        }
    }

    #[test]
    fn legal_hold_flag_ignores_insurer_holds() {
        let mut ledger = HoldLedger::new();
        ledger.place(test_hold(HoldKind::Insurer, "payout pending"));
        assert!(!ledger.legal_hold());
        assert!(ledger.block_status().blocked);

        ledger.place(test_hold(HoldKind::Legal, "court order"));
        assert!(ledger.legal_hold());

        ledger.lift(HoldKind::Legal, test_lift("order withdrawn"));
        assert!(!ledger.legal_hold());
        // Insurer hold still blocks.
        assert!(ledger.block_status().blocked);
    }

    #[test]
    fn lifted_holds_stay_in_history() {
        let mut ledger = HoldLedger::new();
        ledger.place(test_hold(HoldKind::Legal, "investigation"));
        ledger.lift(HoldKind::Legal, test_lift("closed"));
        ledger.place(test_hold(HoldKind::Legal, "reopened"));

        assert_eq!(ledger.history().len(), 2);
        assert!(ledger.history()[0].lift.is_some());
        assert!(ledger.history()[1].is_active());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: for any interleaving of guarded place/lift operations,
        /// the ledger never holds two active holds of the same kind and
        /// never loses history entries.
        #[test]
        fn at_most_one_active_hold_per_kind(
            ops in prop::collection::vec((any::<bool>(), any::<bool>()), 1..40)
        ) {
            let mut ledger = HoldLedger::new();
            let mut placed = 0usize;

            for (is_place, is_legal) in ops {
                let kind = if is_legal { HoldKind::Legal } else { HoldKind::Insurer };
                if is_place {
                    if ledger.ensure_can_place(kind).is_ok() {
                        ledger.place(test_hold(kind, "prop"));
                        placed += 1;
                    }
                } else if ledger.ensure_can_lift(kind).is_ok() {
                    ledger.lift(kind, test_lift("prop"));
                }

                for k in [HoldKind::Legal, HoldKind::Insurer] {
                    let active = ledger.history().iter()
                        .filter(|h| h.kind == k && h.is_active())
                        .count();
                    prop_assert!(active <= 1);
                }
            }

            prop_assert_eq!(ledger.history().len(), placed);
        }
    }
}
