use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dossierflow_auth::{
    Actor, PrincipalId, require_family_or_admin, require_org, require_platform_admin,
};
use dossierflow_core::{
    Aggregate, AggregateId, AggregateRoot, OrganizationId, Reason, TenantId, WorkflowError,
};
use dossierflow_events::Event;
use dossierflow_holds::{Hold, HoldId, HoldKind, HoldLedger, HoldLift, ensure_hold_privilege};

use crate::claim::{Claim, ClaimId, ClaimRequestOutcome, ClaimStatus, ReleaseAction};
use crate::lifecycle::{DossierStatus, Flow, Phase, ProgressOutcome};

/// Dossier identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DossierId(pub AggregateId);

impl DossierId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DossierId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Soft delete marker. The dossier stays queryable for audit; active list
/// exclusion is the query layer's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDelete {
    pub reason: Reason,
    pub deleted_by: PrincipalId,
    pub deleted_at: DateTime<Utc>,
}

/// Aggregate root: Dossier.
///
/// Owns the lifecycle status, the hold ledger, the assignment, and the
/// pending ownership claim for one case record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dossier {
    id: DossierId,
    tenant_id: Option<TenantId>,
    reference: String,
    flow: Option<Flow>,
    status: DossierStatus,
    assigned_org: Option<OrganizationId>,
    holds: HoldLedger,
    pending_claim: Option<Claim>,
    claim_history: Vec<Claim>,
    deleted: Option<SoftDelete>,
    created_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Dossier {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: DossierId) -> Self {
        Self {
            id,
            tenant_id: None,
            reference: String::new(),
            flow: None,
            status: DossierStatus::Created,
            assigned_org: None,
            holds: HoldLedger::new(),
            pending_claim: None,
            claim_history: Vec::new(),
            deleted: None,
            created_at: None,
            closed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DossierId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn flow(&self) -> Option<Flow> {
        self.flow
    }

    pub fn status(&self) -> DossierStatus {
        self.status
    }

    pub fn assigned_org(&self) -> Option<OrganizationId> {
        self.assigned_org
    }

    pub fn holds(&self) -> &HoldLedger {
        &self.holds
    }

    pub fn pending_claim(&self) -> Option<&Claim> {
        self.pending_claim.as_ref()
    }

    pub fn claim_history(&self) -> &[Claim] {
        &self.claim_history
    }

    pub fn deleted(&self) -> Option<&SoftDelete> {
        self.deleted.as_ref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    /// Derived flag: true iff an active legal hold exists.
    pub fn legal_hold(&self) -> bool {
        self.holds.legal_hold()
    }

    /// Decide whether the dossier can advance one step, given the number of
    /// open tasks for the current phase (read-only input from the task
    /// board). Holds are checked before tasks: a held dossier never
    /// progresses even with zero open tasks.
    pub fn progress_decision(&self, open_tasks: u64) -> ProgressOutcome {
        if self.deleted.is_some() {
            return ProgressOutcome::Deleted;
        }

        match self.status {
            DossierStatus::Closed => ProgressOutcome::Terminal,
            DossierStatus::Created | DossierStatus::Intake => ProgressOutcome::AwaitingActivation,
            DossierStatus::Operational(phase) => {
                let block = self.holds.block_status();
                if let Some(kind) = block.kind.filter(|_| block.blocked) {
                    return ProgressOutcome::Blocked {
                        kind,
                        message: block
                            .message
                            .unwrap_or_else(|| format!("active {kind} hold")),
                    };
                }

                if open_tasks > 0 {
                    return ProgressOutcome::OpenTasks {
                        phase,
                        open: open_tasks,
                    };
                }

                let Some(flow) = self.flow else {
                    // Unreachable by construction: activation requires a flow.
                    return ProgressOutcome::AwaitingActivation;
                };

                let to = flow
                    .next_phase(phase)
                    .map(DossierStatus::Operational)
                    .unwrap_or(DossierStatus::Completed);

                ProgressOutcome::Progressed {
                    from: self.status,
                    to,
                }
            }
            DossierStatus::Completed => {
                let block = self.holds.block_status();
                if let Some(kind) = block.kind.filter(|_| block.blocked) {
                    return ProgressOutcome::Blocked {
                        kind,
                        message: block
                            .message
                            .unwrap_or_else(|| format!("active {kind} hold")),
                    };
                }

                ProgressOutcome::Progressed {
                    from: self.status,
                    to: DossierStatus::Closed,
                }
            }
        }
    }
}

impl AggregateRoot for Dossier {
    type Id = DossierId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenDossier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDossier {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub reference: String,
    pub flow: Option<Flow>,
    pub assigned_org: Option<OrganizationId>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetFlow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetFlow {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub flow: Flow,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: BeginIntake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginIntake {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Activate (intake complete, start operational work).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activate {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub reason: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PlaceHold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceHold {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub hold_id: HoldId,
    pub kind: HoldKind,
    pub reason: String,
    pub authority: String,
    pub reference: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: LiftHold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiftHold {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub kind: HoldKind,
    pub reason: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RequestClaim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestClaim {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub claim_id: ClaimId,
    pub organization_id: OrganizationId,
    pub reason: String,
    pub require_family_approval: bool,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DecideClaim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecideClaim {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub claim_id: ClaimId,
    pub approve: bool,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Release the dossier's assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub action: ReleaseAction,
    pub reason: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AutoProgress (progression check with the open-task count for the
/// current phase, read from the task board by the caller).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoProgress {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub open_tasks: u64,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RequestDelete (soft delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDelete {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub reason: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DossierCommand {
    OpenDossier(OpenDossier),
    SetFlow(SetFlow),
    BeginIntake(BeginIntake),
    Activate(Activate),
    PlaceHold(PlaceHold),
    LiftHold(LiftHold),
    RequestClaim(RequestClaim),
    DecideClaim(DecideClaim),
    Release(Release),
    AutoProgress(AutoProgress),
    RequestDelete(RequestDelete),
}

/// Event: DossierOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DossierOpened {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub reference: String,
    pub flow: Option<Flow>,
    pub assigned_org: Option<OrganizationId>,
    pub actor: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FlowSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSet {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub flow: Flow,
    pub actor: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: IntakeStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeStarted {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub actor: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DossierActivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DossierActivated {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub reason: Reason,
    pub first_phase: Phase,
    pub actor: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: HoldPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldPlaced {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub hold: Hold,
    pub actor: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: HoldLifted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldLifted {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub kind: HoldKind,
    pub lift: HoldLift,
    pub actor: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClaimRequested (covers both pending and auto-approved requests so
/// one request always yields exactly one audit record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequested {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub claim: Claim,
    pub outcome: ClaimRequestOutcome,
    pub actor: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClaimApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimApproved {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub claim_id: ClaimId,
    pub organization_id: OrganizationId,
    pub actor: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClaimRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRejected {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub claim_id: ClaimId,
    pub actor: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DossierReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DossierReleased {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub action: ReleaseAction,
    pub reason: Reason,
    pub previous_org: OrganizationId,
    pub actor: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusAutoChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusAutoChanged {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub from: DossierStatus,
    pub to: DossierStatus,
    pub actor: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DeleteRequested (soft delete applied).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequested {
    pub tenant_id: TenantId,
    pub dossier_id: DossierId,
    pub reason: Reason,
    pub actor: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DossierEvent {
    DossierOpened(DossierOpened),
    FlowSet(FlowSet),
    IntakeStarted(IntakeStarted),
    DossierActivated(DossierActivated),
    HoldPlaced(HoldPlaced),
    HoldLifted(HoldLifted),
    ClaimRequested(ClaimRequested),
    ClaimApproved(ClaimApproved),
    ClaimRejected(ClaimRejected),
    DossierReleased(DossierReleased),
    StatusAutoChanged(StatusAutoChanged),
    DeleteRequested(DeleteRequested),
}

impl Event for DossierEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DossierEvent::DossierOpened(_) => "dossier.opened",
            DossierEvent::FlowSet(_) => "dossier.flow.set",
            DossierEvent::IntakeStarted(_) => "dossier.intake.started",
            DossierEvent::DossierActivated(_) => "dossier.activated",
            DossierEvent::HoldPlaced(_) => "dossier.hold.placed",
            DossierEvent::HoldLifted(_) => "dossier.hold.lifted",
            DossierEvent::ClaimRequested(_) => "dossier.claim.requested",
            DossierEvent::ClaimApproved(_) => "dossier.claim.approved",
            DossierEvent::ClaimRejected(_) => "dossier.claim.rejected",
            DossierEvent::DossierReleased(_) => "dossier.released",
            DossierEvent::StatusAutoChanged(_) => "dossier.status.auto_changed",
            DossierEvent::DeleteRequested(_) => "dossier.delete.requested",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DossierEvent::DossierOpened(e) => e.occurred_at,
            DossierEvent::FlowSet(e) => e.occurred_at,
            DossierEvent::IntakeStarted(e) => e.occurred_at,
            DossierEvent::DossierActivated(e) => e.occurred_at,
            DossierEvent::HoldPlaced(e) => e.occurred_at,
            DossierEvent::HoldLifted(e) => e.occurred_at,
            DossierEvent::ClaimRequested(e) => e.occurred_at,
            DossierEvent::ClaimApproved(e) => e.occurred_at,
            DossierEvent::ClaimRejected(e) => e.occurred_at,
            DossierEvent::DossierReleased(e) => e.occurred_at,
            DossierEvent::StatusAutoChanged(e) => e.occurred_at,
            DossierEvent::DeleteRequested(e) => e.occurred_at,
        }
    }

    fn describe(&self) -> String {
        match self {
            DossierEvent::DossierOpened(e) => {
                format!("dossier {} opened", e.reference)
            }
            DossierEvent::FlowSet(e) => format!("flow set to {}", e.flow),
            DossierEvent::IntakeStarted(_) => "intake started".to_string(),
            DossierEvent::DossierActivated(e) => format!(
                "dossier activated ({}), entering phase {}",
                e.reason, e.first_phase
            ),
            DossierEvent::HoldPlaced(e) => format!(
                "{} hold placed by {}: {}",
                e.hold.kind, e.hold.authority, e.hold.reason
            ),
            DossierEvent::HoldLifted(e) => {
                format!("{} hold lifted: {}", e.kind, e.lift.reason)
            }
            DossierEvent::ClaimRequested(e) => match e.outcome {
                ClaimRequestOutcome::Pending => format!(
                    "organization {} requested ownership: {}",
                    e.claim.organization_id, e.claim.reason
                ),
                ClaimRequestOutcome::AutoApproved => format!(
                    "organization {} claimed unassigned dossier (auto-approved): {}",
                    e.claim.organization_id, e.claim.reason
                ),
            },
            DossierEvent::ClaimApproved(e) => format!(
                "claim approved, dossier reassigned to organization {}",
                e.organization_id
            ),
            DossierEvent::ClaimRejected(_) => {
                "claim rejected, assignment unchanged".to_string()
            }
            DossierEvent::DossierReleased(e) => format!(
                "{} of organization {}: {}",
                e.action, e.previous_org, e.reason
            ),
            DossierEvent::StatusAutoChanged(e) => {
                format!("status advanced from {} to {}", e.from, e.to)
            }
            DossierEvent::DeleteRequested(e) => {
                format!("dossier soft-deleted: {}", e.reason)
            }
        }
    }
}

impl Aggregate for Dossier {
    type Command = DossierCommand;
    type Event = DossierEvent;
    type Error = WorkflowError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DossierEvent::DossierOpened(e) => {
                self.id = e.dossier_id;
                self.tenant_id = Some(e.tenant_id);
                self.reference = e.reference.clone();
                self.flow = e.flow;
                self.status = DossierStatus::Created;
                self.assigned_org = e.assigned_org;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            DossierEvent::FlowSet(e) => {
                self.flow = Some(e.flow);
            }
            DossierEvent::IntakeStarted(_) => {
                self.status = DossierStatus::Intake;
            }
            DossierEvent::DossierActivated(e) => {
                self.status = DossierStatus::Operational(e.first_phase);
            }
            DossierEvent::HoldPlaced(e) => {
                self.holds.place(e.hold.clone());
            }
            DossierEvent::HoldLifted(e) => {
                self.holds.lift(e.kind, e.lift.clone());
            }
            DossierEvent::ClaimRequested(e) => match e.outcome {
                ClaimRequestOutcome::Pending => {
                    self.pending_claim = Some(e.claim.clone());
                }
                ClaimRequestOutcome::AutoApproved => {
                    let mut claim = e.claim.clone();
                    claim.status = ClaimStatus::Approved;
                    claim.decided_by = Some(e.actor);
                    claim.decided_at = Some(e.occurred_at);
                    self.assigned_org = Some(claim.organization_id);
                    self.claim_history.push(claim);
                }
            },
            DossierEvent::ClaimApproved(e) => {
                if let Some(mut claim) = self.pending_claim.take() {
                    claim.status = ClaimStatus::Approved;
                    claim.decided_by = Some(e.actor);
                    claim.decided_at = Some(e.occurred_at);
                    self.claim_history.push(claim);
                }
                self.assigned_org = Some(e.organization_id);
            }
            DossierEvent::ClaimRejected(e) => {
                if let Some(mut claim) = self.pending_claim.take() {
                    claim.status = ClaimStatus::Rejected;
                    claim.decided_by = Some(e.actor);
                    claim.decided_at = Some(e.occurred_at);
                    self.claim_history.push(claim);
                }
            }
            DossierEvent::DossierReleased(_) => {
                self.assigned_org = None;
            }
            DossierEvent::StatusAutoChanged(e) => {
                self.status = e.to;
                if e.to == DossierStatus::Closed {
                    self.closed_at = Some(e.occurred_at);
                }
            }
            DossierEvent::DeleteRequested(e) => {
                self.deleted = Some(SoftDelete {
                    reason: e.reason.clone(),
                    deleted_by: e.actor,
                    deleted_at: e.occurred_at,
                });
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DossierCommand::OpenDossier(cmd) => self.handle_open(cmd),
            DossierCommand::SetFlow(cmd) => self.handle_set_flow(cmd),
            DossierCommand::BeginIntake(cmd) => self.handle_begin_intake(cmd),
            DossierCommand::Activate(cmd) => self.handle_activate(cmd),
            DossierCommand::PlaceHold(cmd) => self.handle_place_hold(cmd),
            DossierCommand::LiftHold(cmd) => self.handle_lift_hold(cmd),
            DossierCommand::RequestClaim(cmd) => self.handle_request_claim(cmd),
            DossierCommand::DecideClaim(cmd) => self.handle_decide_claim(cmd),
            DossierCommand::Release(cmd) => self.handle_release(cmd),
            DossierCommand::AutoProgress(cmd) => self.handle_auto_progress(cmd),
            DossierCommand::RequestDelete(cmd) => self.handle_request_delete(cmd),
        }
    }
}

impl Dossier {
    fn ensure_exists(&self) -> Result<(), WorkflowError> {
        if self.created {
            Ok(())
        } else {
            Err(WorkflowError::not_found())
        }
    }

    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), WorkflowError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(WorkflowError::conflict("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_dossier_id(&self, dossier_id: DossierId) -> Result<(), WorkflowError> {
        if self.id != dossier_id {
            return Err(WorkflowError::conflict("dossier_id mismatch"));
        }
        Ok(())
    }

    fn ensure_not_deleted(&self) -> Result<(), WorkflowError> {
        if self.deleted.is_some() {
            return Err(WorkflowError::invalid_transition(
                "dossier has been deleted and accepts no further changes",
            ));
        }
        Ok(())
    }

    fn guard(&self, tenant_id: TenantId, dossier_id: DossierId) -> Result<(), WorkflowError> {
        self.ensure_exists()?;
        self.ensure_tenant(tenant_id)?;
        self.ensure_dossier_id(dossier_id)?;
        self.ensure_not_deleted()
    }

    fn handle_open(&self, cmd: &OpenDossier) -> Result<Vec<DossierEvent>, WorkflowError> {
        if self.created {
            return Err(WorkflowError::conflict("dossier already exists"));
        }
        if cmd.reference.trim().is_empty() {
            return Err(WorkflowError::validation("reference must not be empty"));
        }

        Ok(vec![DossierEvent::DossierOpened(DossierOpened {
            tenant_id: cmd.tenant_id,
            dossier_id: cmd.dossier_id,
            reference: cmd.reference.trim().to_string(),
            flow: cmd.flow,
            assigned_org: cmd.assigned_org,
            actor: cmd.actor.principal_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_flow(&self, cmd: &SetFlow) -> Result<Vec<DossierEvent>, WorkflowError> {
        self.guard(cmd.tenant_id, cmd.dossier_id)?;

        if !matches!(self.status, DossierStatus::Created | DossierStatus::Intake) {
            return Err(WorkflowError::invalid_transition(format!(
                "flow can only change before activation (status is {})",
                self.status
            )));
        }

        // Setting the same flow again is a no-op, not a new fact.
        if self.flow == Some(cmd.flow) {
            return Ok(vec![]);
        }

        Ok(vec![DossierEvent::FlowSet(FlowSet {
            tenant_id: cmd.tenant_id,
            dossier_id: cmd.dossier_id,
            flow: cmd.flow,
            actor: cmd.actor.principal_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_begin_intake(&self, cmd: &BeginIntake) -> Result<Vec<DossierEvent>, WorkflowError> {
        self.guard(cmd.tenant_id, cmd.dossier_id)?;

        if self.status != DossierStatus::Created {
            return Err(WorkflowError::invalid_transition(format!(
                "intake can only start from created (status is {})",
                self.status
            )));
        }

        Ok(vec![DossierEvent::IntakeStarted(IntakeStarted {
            tenant_id: cmd.tenant_id,
            dossier_id: cmd.dossier_id,
            actor: cmd.actor.principal_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &Activate) -> Result<Vec<DossierEvent>, WorkflowError> {
        self.guard(cmd.tenant_id, cmd.dossier_id)?;

        if self.status != DossierStatus::Intake {
            return Err(WorkflowError::invalid_transition(format!(
                "activate is only valid from intake (status is {})",
                self.status
            )));
        }

        let reason = Reason::new("activate", &cmd.reason)?;

        let Some(flow) = self.flow else {
            return Err(WorkflowError::FlowRequired);
        };

        Ok(vec![DossierEvent::DossierActivated(DossierActivated {
            tenant_id: cmd.tenant_id,
            dossier_id: cmd.dossier_id,
            reason,
            first_phase: flow.first_phase(),
            actor: cmd.actor.principal_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_place_hold(&self, cmd: &PlaceHold) -> Result<Vec<DossierEvent>, WorkflowError> {
        self.guard(cmd.tenant_id, cmd.dossier_id)?;

        ensure_hold_privilege(&cmd.actor, cmd.kind, "place hold")?;
        let reason = Reason::new("place hold", &cmd.reason)?;
        if cmd.authority.trim().is_empty() {
            return Err(WorkflowError::validation(
                "placing authority or contact must not be empty",
            ));
        }
        self.holds.ensure_can_place(cmd.kind)?;

        let hold = Hold {
            id: cmd.hold_id,
            kind: cmd.kind,
            reason,
            authority: cmd.authority.trim().to_string(),
            reference: cmd.reference.clone(),
            placed_by: cmd.actor.principal_id,
            placed_at: cmd.occurred_at,
            lift: None,
        };

        Ok(vec![DossierEvent::HoldPlaced(HoldPlaced {
            tenant_id: cmd.tenant_id,
            dossier_id: cmd.dossier_id,
            hold,
            actor: cmd.actor.principal_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_lift_hold(&self, cmd: &LiftHold) -> Result<Vec<DossierEvent>, WorkflowError> {
        self.guard(cmd.tenant_id, cmd.dossier_id)?;

        ensure_hold_privilege(&cmd.actor, cmd.kind, "lift hold")?;
        let reason = Reason::new("lift hold", &cmd.reason)?;
        self.holds.ensure_can_lift(cmd.kind)?;

        Ok(vec![DossierEvent::HoldLifted(HoldLifted {
            tenant_id: cmd.tenant_id,
            dossier_id: cmd.dossier_id,
            kind: cmd.kind,
            lift: HoldLift {
                reason,
                lifted_by: cmd.actor.principal_id,
                lifted_at: cmd.occurred_at,
            },
            actor: cmd.actor.principal_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_request_claim(&self, cmd: &RequestClaim) -> Result<Vec<DossierEvent>, WorkflowError> {
        self.guard(cmd.tenant_id, cmd.dossier_id)?;

        let reason = Reason::new("claim", &cmd.reason)?;

        // A claim is filed on behalf of the requester's own organization; only
        // a platform admin may file for another one.
        if !cmd.actor.is_platform_admin() && !cmd.actor.acts_for(cmd.organization_id) {
            return Err(WorkflowError::forbidden(
                "claims can only be filed for the actor's own organization",
            ));
        }

        if self.pending_claim.is_some() {
            return Err(WorkflowError::conflict(
                "a pending claim already exists for this dossier",
            ));
        }
        if self.assigned_org == Some(cmd.organization_id) {
            return Err(WorkflowError::conflict(
                "organization already owns this dossier",
            ));
        }

        let outcome = if self.assigned_org.is_none() && !cmd.require_family_approval {
            ClaimRequestOutcome::AutoApproved
        } else {
            ClaimRequestOutcome::Pending
        };

        let claim = Claim {
            id: cmd.claim_id,
            organization_id: cmd.organization_id,
            reason,
            status: ClaimStatus::Pending,
            requested_by: cmd.actor.principal_id,
            requested_at: cmd.occurred_at,
            decided_by: None,
            decided_at: None,
        };

        Ok(vec![DossierEvent::ClaimRequested(ClaimRequested {
            tenant_id: cmd.tenant_id,
            dossier_id: cmd.dossier_id,
            claim,
            outcome,
            actor: cmd.actor.principal_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_decide_claim(&self, cmd: &DecideClaim) -> Result<Vec<DossierEvent>, WorkflowError> {
        self.guard(cmd.tenant_id, cmd.dossier_id)?;

        let claim = match &self.pending_claim {
            Some(claim) if claim.id == cmd.claim_id => claim,
            _ => return Err(WorkflowError::not_found()),
        };

        // The current owner decides; an unassigned dossier's pending claim
        // (family approval path) falls to the family or a platform admin.
        match self.assigned_org {
            Some(owner) => require_org(&cmd.actor, owner, "decide claim")?,
            None => require_family_or_admin(&cmd.actor, "decide claim on unassigned dossier")?,
        }

        let event = if cmd.approve {
            DossierEvent::ClaimApproved(ClaimApproved {
                tenant_id: cmd.tenant_id,
                dossier_id: cmd.dossier_id,
                claim_id: claim.id,
                organization_id: claim.organization_id,
                actor: cmd.actor.principal_id,
                occurred_at: cmd.occurred_at,
            })
        } else {
            DossierEvent::ClaimRejected(ClaimRejected {
                tenant_id: cmd.tenant_id,
                dossier_id: cmd.dossier_id,
                claim_id: claim.id,
                actor: cmd.actor.principal_id,
                occurred_at: cmd.occurred_at,
            })
        };

        Ok(vec![event])
    }

    fn handle_release(&self, cmd: &Release) -> Result<Vec<DossierEvent>, WorkflowError> {
        self.guard(cmd.tenant_id, cmd.dossier_id)?;

        let reason = Reason::new("release", &cmd.reason)?;

        let Some(owner) = self.assigned_org else {
            return Err(WorkflowError::invalid_transition(
                "dossier has no assigned organization to release",
            ));
        };

        match cmd.action {
            ReleaseAction::FdRelease => require_org(&cmd.actor, owner, "funeral director release")?,
            ReleaseAction::FamilyRelease => {
                require_family_or_admin(&cmd.actor, "family release")?
            }
        }

        Ok(vec![DossierEvent::DossierReleased(DossierReleased {
            tenant_id: cmd.tenant_id,
            dossier_id: cmd.dossier_id,
            action: cmd.action,
            reason,
            previous_org: owner,
            actor: cmd.actor.principal_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_auto_progress(&self, cmd: &AutoProgress) -> Result<Vec<DossierEvent>, WorkflowError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_dossier_id(cmd.dossier_id)?;

        // Non-advancing outcomes are not errors: the caller reports the
        // typed outcome, nothing is committed.
        match self.progress_decision(cmd.open_tasks) {
            ProgressOutcome::Progressed { from, to } => {
                Ok(vec![DossierEvent::StatusAutoChanged(StatusAutoChanged {
                    tenant_id: cmd.tenant_id,
                    dossier_id: cmd.dossier_id,
                    from,
                    to,
                    actor: cmd.actor.principal_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            _ => Ok(vec![]),
        }
    }

    fn handle_request_delete(
        &self,
        cmd: &RequestDelete,
    ) -> Result<Vec<DossierEvent>, WorkflowError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_dossier_id(cmd.dossier_id)?;

        if self.deleted.is_some() {
            return Err(WorkflowError::invalid_transition(
                "dossier has already been deleted",
            ));
        }
        if !self.status.is_deletable() {
            return Err(WorkflowError::invalid_transition(format!(
                "dossier can only be deleted before activation (status is {})",
                self.status
            )));
        }

        match self.assigned_org {
            Some(owner) => require_org(&cmd.actor, owner, "delete dossier")?,
            None => require_platform_admin(&cmd.actor, "delete unassigned dossier")?,
        }

        let reason = Reason::new("delete", &cmd.reason)?;

        Ok(vec![DossierEvent::DeleteRequested(DeleteRequested {
            tenant_id: cmd.tenant_id,
            dossier_id: cmd.dossier_id,
            reason,
            actor: cmd.actor.principal_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
