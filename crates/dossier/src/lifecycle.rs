//! Flow, phase and status types for the dossier lifecycle.
//!
//! The status graph is forward-only:
//!
//! ```text
//! Created → Intake → Operational(phase…) → Completed → Closed
//! ```
//!
//! The flow selects which phase sequence applies once operational:
//! local burial runs washing → prayer → burial, repatriation runs
//! washing → prayer → repatriation. Administrative exits (soft delete)
//! never move the status backwards.

use serde::{Deserialize, Serialize};

use dossierflow_holds::HoldKind;

/// Which funeral process applies to a dossier.
///
/// A dossier's flow starts unset (`Option<Flow>::None`) and must be chosen
/// before the dossier can leave intake.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// Local burial.
    Local,
    /// Repatriation to the country of origin.
    Repatriation,
}

impl Flow {
    /// Ordered operational phases for this flow.
    pub fn phases(self) -> [Phase; 3] {
        match self {
            Flow::Local => [Phase::Washing, Phase::Prayer, Phase::Burial],
            Flow::Repatriation => [Phase::Washing, Phase::Prayer, Phase::Repatriation],
        }
    }

    /// First phase entered on activation.
    pub fn first_phase(self) -> Phase {
        Phase::Washing
    }

    /// The phase after `current`, or `None` when `current` is the last.
    pub fn next_phase(self, current: Phase) -> Option<Phase> {
        let phases = self.phases();
        let idx = phases.iter().position(|p| *p == current)?;
        phases.get(idx + 1).copied()
    }
}

impl core::fmt::Display for Flow {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Flow::Local => f.write_str("local"),
            Flow::Repatriation => f.write_str("repatriation"),
        }
    }
}

/// An operational phase. Tasks are seeded and gated per phase.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Washing,
    Prayer,
    Burial,
    Repatriation,
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Phase::Washing => "washing",
            Phase::Prayer => "prayer",
            Phase::Burial => "burial",
            Phase::Repatriation => "repatriation",
        };
        f.write_str(name)
    }
}

/// Dossier status lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DossierStatus {
    Created,
    Intake,
    Operational(Phase),
    Completed,
    Closed,
}

impl DossierStatus {
    /// Closed dossiers never progress again.
    pub fn is_terminal(self) -> bool {
        matches!(self, DossierStatus::Closed)
    }

    /// Soft delete is only allowed in the early phases.
    pub fn is_deletable(self) -> bool {
        matches!(self, DossierStatus::Created | DossierStatus::Intake)
    }

    /// The current operational phase, if any.
    pub fn phase(self) -> Option<Phase> {
        match self {
            DossierStatus::Operational(p) => Some(p),
            _ => None,
        }
    }
}

impl core::fmt::Display for DossierStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DossierStatus::Created => f.write_str("created"),
            DossierStatus::Intake => f.write_str("intake"),
            DossierStatus::Operational(p) => write!(f, "operational:{p}"),
            DossierStatus::Completed => f.write_str("completed"),
            DossierStatus::Closed => f.write_str("closed"),
        }
    }
}

/// Typed outcome of a progression check.
///
/// Only `Progressed` corresponds to a committed state change; every other
/// arm explains exactly why the dossier stayed where it was, so the caller
/// can surface a precise cause to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressOutcome {
    /// The dossier advanced one step in its flow-specific sequence.
    Progressed {
        from: DossierStatus,
        to: DossierStatus,
    },
    /// An active hold blocks progression. Holds are checked before tasks.
    Blocked { kind: HoldKind, message: String },
    /// Open tasks for the current phase block progression.
    OpenTasks { phase: Phase, open: u64 },
    /// The dossier has not been activated yet; only an explicit `activate`
    /// moves it out of intake.
    AwaitingActivation,
    /// The dossier was soft-deleted; it stays readable but never progresses.
    Deleted,
    /// The dossier is closed.
    Terminal,
}

impl ProgressOutcome {
    pub fn progressed(&self) -> bool {
        matches!(self, ProgressOutcome::Progressed { .. })
    }

    /// Human-readable cause for a non-progressing outcome.
    pub fn reason(&self) -> Option<String> {
        match self {
            ProgressOutcome::Progressed { .. } => None,
            ProgressOutcome::Blocked { message, .. } => Some(message.clone()),
            ProgressOutcome::OpenTasks { phase, open } => {
                Some(format!("{open} open task(s) for phase {phase}"))
            }
            ProgressOutcome::AwaitingActivation => {
                Some("dossier has not been activated".to_string())
            }
            ProgressOutcome::Deleted => Some("dossier has been deleted".to_string()),
            ProgressOutcome::Terminal => Some("dossier is closed".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_flow_phase_order() {
        let flow = Flow::Local;
        assert_eq!(flow.first_phase(), Phase::Washing);
        assert_eq!(flow.next_phase(Phase::Washing), Some(Phase::Prayer));
        assert_eq!(flow.next_phase(Phase::Prayer), Some(Phase::Burial));
        assert_eq!(flow.next_phase(Phase::Burial), None);
    }

    #[test]
    fn repatriation_flow_ends_in_repatriation() {
        let flow = Flow::Repatriation;
        assert_eq!(flow.next_phase(Phase::Prayer), Some(Phase::Repatriation));
        assert_eq!(flow.next_phase(Phase::Repatriation), None);
        // Burial is not part of the repatriation sequence.
        assert_eq!(flow.next_phase(Phase::Burial), None);
    }

    #[test]
    fn deletable_statuses_are_the_early_ones() {
        assert!(DossierStatus::Created.is_deletable());
        assert!(DossierStatus::Intake.is_deletable());
        assert!(!DossierStatus::Operational(Phase::Washing).is_deletable());
        assert!(!DossierStatus::Completed.is_deletable());
        assert!(!DossierStatus::Closed.is_deletable());
    }

    #[test]
    fn only_closed_is_terminal() {
        assert!(DossierStatus::Closed.is_terminal());
        assert!(!DossierStatus::Completed.is_terminal());
    }
}
