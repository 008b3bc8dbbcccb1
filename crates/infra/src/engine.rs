//! Workflow engine facade (application-level orchestration).
//!
//! One synchronous entry point per workflow operation. Every mutating
//! operation runs the same pipeline:
//!
//! ```text
//! 1. Load the dossier's event stream (tenant-scoped)
//! 2. Rehydrate the aggregate from history
//! 3. Handle the command (pure decision logic, produces events)
//! 4. Append to the audit store (optimistic concurrency, append-only)
//! 5. Publish committed events to the bus (best-effort, logged)
//! ```
//!
//! The append in step 4 is the linearization point: per-dossier operations
//! are serialized by the optimistic version check, and audit durability is a
//! precondition for success — if the append fails, the operation fails.
//! Publication and task seeding happen after the commit and never undo it.

use chrono::Utc;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use dossierflow_auth::Actor;
use dossierflow_core::{
    Aggregate, AggregateId, AggregateRoot, ExpectedVersion, OrganizationId, TenantId,
    WorkflowError,
};
use dossierflow_dossier::{
    Activate, AutoProgress, BeginIntake, ClaimId, ClaimRequestOutcome, DecideClaim, Dossier,
    DossierCommand, DossierEvent, DossierId, DossierStatus, Flow, LiftHold, OpenDossier, Phase,
    PlaceHold, ProgressOutcome, Release, ReleaseAction, RequestClaim, RequestDelete, SetFlow,
};
use dossierflow_events::{EventBus, EventEnvelope};
use dossierflow_holds::{BlockStatus, HoldId, HoldKind};
use dossierflow_tasks::{TaskBoard, TaskSeeder};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Stream type identifier for dossier aggregates.
pub const AGGREGATE_TYPE: &str = "dossier";

/// Engine operation error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Domain guard failure (deterministic, safe to surface to the caller).
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// The audit store rejected the operation.
    #[error("event store failure: {0}")]
    Store(EventStoreError),

    /// Historical event payloads no longer deserialize into the current
    /// event type (schema drift).
    #[error("event deserialization failed: {0}")]
    Deserialize(String),
}

impl From<EventStoreError> for EngineError {
    fn from(value: EventStoreError) -> Self {
        match value {
            // A lost optimistic race surfaces as a retryable conflict, same
            // as domain-level conflicts.
            EventStoreError::Concurrency(msg) => {
                EngineError::Workflow(WorkflowError::conflict(msg))
            }
            other => EngineError::Store(other),
        }
    }
}

/// Result of a claim request: the recorded claim and how it resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub claim_id: ClaimId,
    pub outcome: ClaimRequestOutcome,
}

/// Result of a claim decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimDecision {
    pub claim_id: ClaimId,
    pub approved: bool,
    /// Assignment after the decision.
    pub assigned_org: Option<OrganizationId>,
}

/// The dossier workflow engine.
///
/// Composes the audit store, the event bus, and the task board into the
/// operation surface callers use. The engine owns no dossier state: every
/// operation rehydrates from the audit stream, so the store is the single
/// source of truth.
#[derive(Debug)]
pub struct WorkflowEngine<S, B, T> {
    store: S,
    bus: B,
    board: T,
}

impl<S, B, T> WorkflowEngine<S, B, T> {
    pub fn new(store: S, bus: B, board: T) -> Self {
        Self { store, bus, board }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn board(&self) -> &T {
        &self.board
    }
}

impl<S, B, T> WorkflowEngine<S, B, T>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    T: TaskBoard + TaskSeeder,
{
    /// Open a new dossier. Returns its identifier.
    pub fn open_dossier(
        &self,
        tenant_id: TenantId,
        actor: &Actor,
        reference: &str,
        flow: Option<Flow>,
        assigned_org: Option<OrganizationId>,
    ) -> Result<DossierId, EngineError> {
        let dossier_id = DossierId::new(AggregateId::new());
        let command = DossierCommand::OpenDossier(OpenDossier {
            tenant_id,
            dossier_id,
            reference: reference.to_string(),
            flow,
            assigned_org,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.execute(tenant_id, dossier_id, command)?;
        Ok(dossier_id)
    }

    /// Choose or change the flow. Only valid before activation.
    pub fn set_flow(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
        actor: &Actor,
        flow: Flow,
    ) -> Result<(), EngineError> {
        let command = DossierCommand::SetFlow(SetFlow {
            tenant_id,
            dossier_id,
            flow,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.execute(tenant_id, dossier_id, command)?;
        Ok(())
    }

    /// Move the dossier from created into intake.
    pub fn begin_intake(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
        actor: &Actor,
    ) -> Result<(), EngineError> {
        let command = DossierCommand::BeginIntake(BeginIntake {
            tenant_id,
            dossier_id,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.execute(tenant_id, dossier_id, command)?;
        Ok(())
    }

    /// Activate the dossier: intake is complete, operational work starts.
    ///
    /// Seeds the gating tasks for the first phase after the transition has
    /// committed. Returns the phase entered.
    pub fn activate(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
        actor: &Actor,
        reason: &str,
    ) -> Result<Phase, EngineError> {
        let command = DossierCommand::Activate(Activate {
            tenant_id,
            dossier_id,
            reason: reason.to_string(),
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        let (_, decided) = self.execute(tenant_id, dossier_id, command)?;

        let first_phase = decided
            .iter()
            .find_map(|ev| match ev {
                DossierEvent::DossierActivated(e) => Some(e.first_phase),
                _ => None,
            })
            .ok_or_else(|| {
                EngineError::Deserialize("activation produced no activation event".to_string())
            })?;

        self.seed_phase(tenant_id, dossier_id, first_phase);
        Ok(first_phase)
    }

    /// Place a hold on the dossier. Returns the new hold's identifier.
    pub fn set_hold(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
        actor: &Actor,
        kind: HoldKind,
        reason: &str,
        authority: &str,
        reference: Option<String>,
    ) -> Result<HoldId, EngineError> {
        let hold_id = HoldId::new();
        let command = DossierCommand::PlaceHold(PlaceHold {
            tenant_id,
            dossier_id,
            hold_id,
            kind,
            reason: reason.to_string(),
            authority: authority.to_string(),
            reference,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.execute(tenant_id, dossier_id, command)?;
        Ok(hold_id)
    }

    /// Lift the active hold of the given kind.
    pub fn lift_hold(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
        actor: &Actor,
        kind: HoldKind,
        reason: &str,
    ) -> Result<(), EngineError> {
        let command = DossierCommand::LiftHold(LiftHold {
            tenant_id,
            dossier_id,
            kind,
            reason: reason.to_string(),
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.execute(tenant_id, dossier_id, command)?;
        Ok(())
    }

    /// Read-only: is the dossier currently blocked by a hold, and why?
    pub fn is_blocked(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
    ) -> Result<BlockStatus, EngineError> {
        let dossier = self.dossier(tenant_id, dossier_id)?;
        Ok(dossier.holds().block_status())
    }

    /// Request ownership of the dossier for an organization.
    ///
    /// On an unassigned dossier with no family-approval requirement the
    /// claim auto-approves and the dossier is reassigned in the same call.
    pub fn request_claim(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
        actor: &Actor,
        organization_id: OrganizationId,
        reason: &str,
        require_family_approval: bool,
    ) -> Result<ClaimReceipt, EngineError> {
        let claim_id = ClaimId::new();
        let command = DossierCommand::RequestClaim(RequestClaim {
            tenant_id,
            dossier_id,
            claim_id,
            organization_id,
            reason: reason.to_string(),
            require_family_approval,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        let (_, decided) = self.execute(tenant_id, dossier_id, command)?;

        let outcome = decided
            .iter()
            .find_map(|ev| match ev {
                DossierEvent::ClaimRequested(e) => Some(e.outcome),
                _ => None,
            })
            .ok_or_else(|| {
                EngineError::Deserialize("claim request produced no claim event".to_string())
            })?;

        Ok(ClaimReceipt { claim_id, outcome })
    }

    /// Decide a pending claim: approve (reassign) or reject.
    pub fn decide_claim(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
        actor: &Actor,
        claim_id: ClaimId,
        approve: bool,
    ) -> Result<ClaimDecision, EngineError> {
        let command = DossierCommand::DecideClaim(DecideClaim {
            tenant_id,
            dossier_id,
            claim_id,
            approve,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        let (dossier, _) = self.execute(tenant_id, dossier_id, command)?;

        Ok(ClaimDecision {
            claim_id,
            approved: approve,
            assigned_org: dossier.assigned_org(),
        })
    }

    /// Release the dossier's current assignment.
    pub fn release(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
        actor: &Actor,
        action: ReleaseAction,
        reason: &str,
    ) -> Result<(), EngineError> {
        let command = DossierCommand::Release(Release {
            tenant_id,
            dossier_id,
            action,
            reason: reason.to_string(),
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.execute(tenant_id, dossier_id, command)?;
        Ok(())
    }

    /// Check whether the dossier can advance one lifecycle step, and advance
    /// it if so.
    ///
    /// The open-task count for the current phase is read from the task board
    /// and fed into the decision; holds are checked before tasks. Always
    /// returns the typed outcome — a dossier that cannot advance is a
    /// reportable condition, not an error. When a new operational phase is
    /// entered, its gating tasks are seeded after the commit.
    ///
    /// The returned outcome always describes the committed result: the
    /// advance is pinned to the exact state the decision was read from, so a
    /// concurrent write (a hold landing, another progression) between the
    /// read and the append fails the call with a retryable conflict instead
    /// of reporting a `Progressed` that never committed.
    pub fn check_and_progress(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
        actor: &Actor,
    ) -> Result<ProgressOutcome, EngineError> {
        let dossier = self.dossier(tenant_id, dossier_id)?;

        let open_tasks = match dossier.status().phase() {
            Some(phase) => self.board.count_open(tenant_id, dossier_id, Some(phase)),
            None => 0,
        };

        let outcome = dossier.progress_decision(open_tasks);
        if !outcome.progressed() {
            debug!(
                dossier_id = %dossier_id,
                outcome = ?outcome,
                "progression check did not advance"
            );
            return Ok(outcome);
        }

        let command = DossierCommand::AutoProgress(AutoProgress {
            tenant_id,
            dossier_id,
            open_tasks,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        let (updated, _) =
            self.execute_pinned(tenant_id, dossier_id, command, Some(dossier.version()))?;

        if let DossierStatus::Operational(phase) = updated.status() {
            self.seed_phase(tenant_id, dossier_id, phase);
        }

        Ok(outcome)
    }

    /// Soft-delete the dossier. Only valid before activation.
    pub fn request_delete(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
        actor: &Actor,
        reason: &str,
    ) -> Result<(), EngineError> {
        let command = DossierCommand::RequestDelete(RequestDelete {
            tenant_id,
            dossier_id,
            reason: reason.to_string(),
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.execute(tenant_id, dossier_id, command)?;
        Ok(())
    }

    /// One page of the dossier's audit trail, newest first.
    pub fn audit_trail(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, EngineError> {
        Ok(self.store.load_page(tenant_id, dossier_id.0, offset, limit)?)
    }

    /// Read-only: the dossier's current state, rehydrated from its stream.
    pub fn dossier(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
    ) -> Result<Dossier, EngineError> {
        let history = self.store.load_stream(tenant_id, dossier_id.0)?;
        validate_loaded_stream(tenant_id, dossier_id.0, &history)?;

        let mut dossier = Dossier::empty(dossier_id);
        apply_history(&mut dossier, &history)?;
        if !dossier.exists() {
            return Err(EngineError::Workflow(WorkflowError::not_found()));
        }
        Ok(dossier)
    }

    /// Run one command through the load/rehydrate/handle/append/publish
    /// pipeline. Returns the post-commit state and the decided events.
    fn execute(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
        command: DossierCommand,
    ) -> Result<(Dossier, Vec<DossierEvent>), EngineError> {
        self.execute_pinned(tenant_id, dossier_id, command, None)
    }

    /// Like [`Self::execute`], but additionally requires the stream to still
    /// be at `observed_version`. Used by read-then-write operations whose
    /// decision was made against an earlier load: a commit that landed in
    /// between surfaces as a conflict instead of being silently re-decided
    /// against state the caller never saw.
    fn execute_pinned(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
        command: DossierCommand,
        observed_version: Option<u64>,
    ) -> Result<(Dossier, Vec<DossierEvent>), EngineError> {
        let aggregate_id = dossier_id.0;

        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let current = stream_version(&history);
        if let Some(observed) = observed_version {
            if observed != current {
                return Err(EngineError::Workflow(WorkflowError::conflict(format!(
                    "dossier changed since it was read (read version {observed}, now {current})"
                ))));
            }
        }
        let expected = ExpectedVersion::Exact(current);

        let mut dossier = Dossier::empty(dossier_id);
        apply_history(&mut dossier, &history)?;

        let decided = dossier.handle(&command).map_err(EngineError::Workflow)?;
        if decided.is_empty() {
            return Ok((dossier, decided));
        }

        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    aggregate_id,
                    AGGREGATE_TYPE,
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        for ev in &decided {
            dossier.apply(ev);
        }

        // The state change is durable at this point. Publication is
        // best-effort notification; failures are logged for reconciliation.
        for stored in &committed {
            if let Err(e) = self.bus.publish(stored.to_envelope()) {
                warn!(
                    event_id = %stored.event_id,
                    event_type = %stored.event_type,
                    error = ?e,
                    "event publication failed after append"
                );
            }
        }

        Ok((dossier, decided))
    }

    /// Seed the gating tasks for a newly entered phase. Runs after the
    /// transition has committed; failures are logged for reconciliation,
    /// never rolled into the transition.
    fn seed_phase(&self, tenant_id: TenantId, dossier_id: DossierId, phase: Phase) {
        if let Err(e) = self.board.seed_phase(tenant_id, dossier_id, phase) {
            warn!(
                dossier_id = %dossier_id,
                phase = %phase,
                error = ?e,
                "task seeding failed for phase entry"
            );
        }
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), EngineError> {
    // Enforce tenant isolation even if a buggy backend returns cross-tenant
    // data, and require monotonically increasing sequence numbers.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(EngineError::Store(EventStoreError::TenantIsolation(
                format!("loaded stream contains wrong tenant_id at index {idx}"),
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(EngineError::Store(EventStoreError::TenantIsolation(
                format!("loaded stream contains wrong aggregate_id at index {idx}"),
            )));
        }
        if e.sequence_number <= last {
            return Err(EngineError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history(dossier: &mut Dossier, history: &[StoredEvent]) -> Result<(), EngineError> {
    for stored in history {
        let ev: DossierEvent = serde_json::from_value(stored.payload.clone())
            .map_err(|e| EngineError::Deserialize(e.to_string()))?;
        dossier.apply(&ev);
    }
    Ok(())
}
