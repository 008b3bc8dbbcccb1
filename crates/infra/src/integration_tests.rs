//! Engine-level integration tests: full pipeline against the in-memory
//! store, bus, and task board.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use dossierflow_auth::{Actor, OrgKind, PrincipalId};
use dossierflow_core::{
    AggregateId, ExpectedVersion, OrganizationId, Reason, TenantId, WorkflowError,
};
use dossierflow_dossier::dossier::HoldPlaced;
use dossierflow_dossier::{
    ClaimRequestOutcome, DossierEvent, DossierId, DossierStatus, Flow, Phase, ProgressOutcome,
    ReleaseAction,
};
use dossierflow_events::{EventBus, EventEnvelope, InMemoryEventBus};
use dossierflow_holds::{Hold, HoldId, HoldKind};
use dossierflow_tasks::{InMemoryTaskBoard, TaskBoard};

use crate::engine::{EngineError, WorkflowEngine};
use crate::event_store::{
    EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent,
};

type TestEngine =
    WorkflowEngine<InMemoryEventStore, InMemoryEventBus<EventEnvelope<JsonValue>>, InMemoryTaskBoard>;

fn engine() -> TestEngine {
    WorkflowEngine::new(
        InMemoryEventStore::new(),
        InMemoryEventBus::new(),
        InMemoryTaskBoard::new(),
    )
}

fn admin_actor(tenant_id: TenantId) -> Actor {
    Actor::new(PrincipalId::new(), tenant_id, None, OrgKind::PlatformAdmin)
}

fn fd_actor(tenant_id: TenantId, org: OrganizationId) -> Actor {
    Actor::new(
        PrincipalId::new(),
        tenant_id,
        Some(org),
        OrgKind::FuneralDirector,
    )
}

fn insurer_actor(tenant_id: TenantId) -> Actor {
    Actor::new(
        PrincipalId::new(),
        tenant_id,
        Some(OrganizationId::new()),
        OrgKind::Insurer,
    )
}

fn family_actor(tenant_id: TenantId) -> Actor {
    Actor::new(PrincipalId::new(), tenant_id, None, OrgKind::Family)
}

fn dossier_in_intake(engine: &TestEngine, tenant_id: TenantId, actor: &Actor) -> DossierId {
    let dossier_id = engine
        .open_dossier(tenant_id, actor, "D-2024-0042", None, None)
        .unwrap();
    engine
        .set_flow(tenant_id, dossier_id, actor, Flow::Local)
        .unwrap();
    engine.begin_intake(tenant_id, dossier_id, actor).unwrap();
    dossier_id
}

fn operational_dossier(engine: &TestEngine, tenant_id: TenantId, actor: &Actor) -> DossierId {
    let dossier_id = dossier_in_intake(engine, tenant_id, actor);
    engine
        .activate(tenant_id, dossier_id, actor, "intake complete")
        .unwrap();
    dossier_id
}

#[test]
fn activation_enters_first_phase_and_seeds_tasks() {
    let engine = engine();
    let tenant_id = TenantId::new();
    let actor = admin_actor(tenant_id);

    let dossier_id = dossier_in_intake(&engine, tenant_id, &actor);
    let phase = engine
        .activate(tenant_id, dossier_id, &actor, "intake complete")
        .unwrap();

    assert_eq!(phase, Phase::Washing);
    let dossier = engine.dossier(tenant_id, dossier_id).unwrap();
    assert_eq!(dossier.status(), DossierStatus::Operational(Phase::Washing));
    assert_eq!(
        engine
            .board()
            .count_open(tenant_id, dossier_id, Some(Phase::Washing)),
        2
    );
}

#[test]
fn open_tasks_block_progression() {
    let engine = engine();
    let tenant_id = TenantId::new();
    let actor = admin_actor(tenant_id);
    let dossier_id = operational_dossier(&engine, tenant_id, &actor);

    let outcome = engine
        .check_and_progress(tenant_id, dossier_id, &actor)
        .unwrap();

    assert_eq!(
        outcome,
        ProgressOutcome::OpenTasks {
            phase: Phase::Washing,
            open: 2,
        }
    );
    let reason = outcome.reason().unwrap();
    assert!(reason.contains("2 open task"), "reason was: {reason}");

    // Nothing was committed.
    let dossier = engine.dossier(tenant_id, dossier_id).unwrap();
    assert_eq!(dossier.status(), DossierStatus::Operational(Phase::Washing));
}

#[test]
fn completing_tasks_unlocks_the_next_phase() {
    let engine = engine();
    let tenant_id = TenantId::new();
    let actor = admin_actor(tenant_id);
    let dossier_id = operational_dossier(&engine, tenant_id, &actor);

    engine
        .board()
        .complete_phase(tenant_id, dossier_id, Phase::Washing);
    let outcome = engine
        .check_and_progress(tenant_id, dossier_id, &actor)
        .unwrap();

    assert_eq!(
        outcome,
        ProgressOutcome::Progressed {
            from: DossierStatus::Operational(Phase::Washing),
            to: DossierStatus::Operational(Phase::Prayer),
        }
    );

    // Entering the new phase seeded its gating tasks.
    assert_eq!(
        engine
            .board()
            .count_open(tenant_id, dossier_id, Some(Phase::Prayer)),
        2
    );
}

#[test]
fn local_flow_runs_to_closure() {
    let engine = engine();
    let tenant_id = TenantId::new();
    let actor = admin_actor(tenant_id);
    let dossier_id = operational_dossier(&engine, tenant_id, &actor);

    for phase in [Phase::Washing, Phase::Prayer, Phase::Burial] {
        engine.board().complete_phase(tenant_id, dossier_id, phase);
        let outcome = engine
            .check_and_progress(tenant_id, dossier_id, &actor)
            .unwrap();
        assert!(outcome.progressed(), "stuck at {phase}: {outcome:?}");
    }

    let dossier = engine.dossier(tenant_id, dossier_id).unwrap();
    assert_eq!(dossier.status(), DossierStatus::Completed);

    // Completed closes on the next check, then stays closed.
    let outcome = engine
        .check_and_progress(tenant_id, dossier_id, &actor)
        .unwrap();
    assert_eq!(
        outcome,
        ProgressOutcome::Progressed {
            from: DossierStatus::Completed,
            to: DossierStatus::Closed,
        }
    );
    let dossier = engine.dossier(tenant_id, dossier_id).unwrap();
    assert_eq!(dossier.status(), DossierStatus::Closed);
    assert!(dossier.closed_at().is_some());

    let outcome = engine
        .check_and_progress(tenant_id, dossier_id, &actor)
        .unwrap();
    assert_eq!(outcome, ProgressOutcome::Terminal);
}

#[test]
fn holds_block_before_tasks_are_even_consulted() {
    let engine = engine();
    let tenant_id = TenantId::new();
    let actor = admin_actor(tenant_id);
    let dossier_id = operational_dossier(&engine, tenant_id, &actor);

    engine
        .set_hold(
            tenant_id,
            dossier_id,
            &actor,
            HoldKind::Legal,
            "autopsy ordered",
            "prosecutor's office",
            Some("PX-2024-117".to_string()),
        )
        .unwrap();

    // Washing tasks are still open, but the hold is reported, not the tasks.
    let outcome = engine
        .check_and_progress(tenant_id, dossier_id, &actor)
        .unwrap();
    assert!(
        matches!(
            outcome,
            ProgressOutcome::Blocked {
                kind: HoldKind::Legal,
                ..
            }
        ),
        "outcome was: {outcome:?}"
    );

    let dossier = engine.dossier(tenant_id, dossier_id).unwrap();
    assert!(dossier.legal_hold());

    engine
        .lift_hold(
            tenant_id,
            dossier_id,
            &actor,
            HoldKind::Legal,
            "autopsy complete",
        )
        .unwrap();

    let outcome = engine
        .check_and_progress(tenant_id, dossier_id, &actor)
        .unwrap();
    assert_eq!(
        outcome,
        ProgressOutcome::OpenTasks {
            phase: Phase::Washing,
            open: 2,
        }
    );
}

#[test]
fn is_blocked_reports_the_active_hold() {
    let engine = engine();
    let tenant_id = TenantId::new();
    let admin = admin_actor(tenant_id);
    let insurer = insurer_actor(tenant_id);
    let dossier_id = operational_dossier(&engine, tenant_id, &admin);

    let status = engine.is_blocked(tenant_id, dossier_id).unwrap();
    assert!(!status.blocked);

    engine
        .set_hold(
            tenant_id,
            dossier_id,
            &insurer,
            HoldKind::Insurer,
            "coverage under review",
            "claims desk",
            None,
        )
        .unwrap();

    let status = engine.is_blocked(tenant_id, dossier_id).unwrap();
    assert!(status.blocked);
    assert_eq!(status.kind, Some(HoldKind::Insurer));

    // Insurer holds block but never set the legal-hold flag.
    let dossier = engine.dossier(tenant_id, dossier_id).unwrap();
    assert!(!dossier.legal_hold());
}

#[test]
fn lifting_an_absent_hold_is_rejected() {
    let engine = engine();
    let tenant_id = TenantId::new();
    let actor = admin_actor(tenant_id);
    let dossier_id = operational_dossier(&engine, tenant_id, &actor);

    let err = engine
        .lift_hold(tenant_id, dossier_id, &actor, HoldKind::Legal, "oops")
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Workflow(WorkflowError::NotHeld(_))
    ));
}

#[test]
fn claim_on_unassigned_dossier_auto_approves() {
    let engine = engine();
    let tenant_id = TenantId::new();
    let admin = admin_actor(tenant_id);
    let org = OrganizationId::new();
    let director = fd_actor(tenant_id, org);
    let dossier_id = dossier_in_intake(&engine, tenant_id, &admin);

    let receipt = engine
        .request_claim(
            tenant_id,
            dossier_id,
            &director,
            org,
            "family contacted us directly",
            false,
        )
        .unwrap();

    assert_eq!(receipt.outcome, ClaimRequestOutcome::AutoApproved);
    let dossier = engine.dossier(tenant_id, dossier_id).unwrap();
    assert_eq!(dossier.assigned_org(), Some(org));
    assert!(dossier.pending_claim().is_none());
    assert_eq!(dossier.claim_history().len(), 1);
}

#[test]
fn claim_on_assigned_dossier_stays_pending_until_decided() {
    let engine = engine();
    let tenant_id = TenantId::new();
    let admin = admin_actor(tenant_id);
    let org1 = OrganizationId::new();
    let org2 = OrganizationId::new();
    let owner = fd_actor(tenant_id, org1);
    let challenger = fd_actor(tenant_id, org2);

    let dossier_id = engine
        .open_dossier(tenant_id, &admin, "D-2024-0043", Some(Flow::Local), Some(org1))
        .unwrap();

    let receipt = engine
        .request_claim(
            tenant_id,
            dossier_id,
            &challenger,
            org2,
            "family asked us to take over",
            false,
        )
        .unwrap();
    assert_eq!(receipt.outcome, ClaimRequestOutcome::Pending);

    // Only the current owner decides.
    let decision = engine
        .decide_claim(tenant_id, dossier_id, &owner, receipt.claim_id, true)
        .unwrap();
    assert!(decision.approved);
    assert_eq!(decision.assigned_org, Some(org2));

    let dossier = engine.dossier(tenant_id, dossier_id).unwrap();
    assert_eq!(dossier.assigned_org(), Some(org2));
    assert!(dossier.pending_claim().is_none());
}

#[test]
fn rejected_claim_keeps_the_current_assignment() {
    let engine = engine();
    let tenant_id = TenantId::new();
    let admin = admin_actor(tenant_id);
    let org1 = OrganizationId::new();
    let org2 = OrganizationId::new();
    let owner = fd_actor(tenant_id, org1);
    let challenger = fd_actor(tenant_id, org2);

    let dossier_id = engine
        .open_dossier(tenant_id, &admin, "D-2024-0044", Some(Flow::Local), Some(org1))
        .unwrap();
    let receipt = engine
        .request_claim(tenant_id, dossier_id, &challenger, org2, "takeover", false)
        .unwrap();

    let decision = engine
        .decide_claim(tenant_id, dossier_id, &owner, receipt.claim_id, false)
        .unwrap();
    assert!(!decision.approved);
    assert_eq!(decision.assigned_org, Some(org1));

    let dossier = engine.dossier(tenant_id, dossier_id).unwrap();
    assert!(dossier.pending_claim().is_none());
    assert_eq!(dossier.claim_history().len(), 1);
}

#[test]
fn racing_claim_appends_lose_the_version_check() {
    // Two organizations claim the same unassigned dossier at the same
    // instant: both read the stream at version v, the first append wins,
    // and the second append fails the optimistic version check.
    let engine = engine();
    let tenant_id = TenantId::new();
    let admin = admin_actor(tenant_id);
    let org1 = OrganizationId::new();
    let director1 = fd_actor(tenant_id, org1);

    let dossier_id = engine
        .open_dossier(tenant_id, &admin, "D-2024-0045", Some(Flow::Local), None)
        .unwrap();

    // Version both writers observed before either committed.
    let stale = engine
        .store()
        .load_stream(tenant_id, dossier_id.0)
        .unwrap()
        .last()
        .map(|e| e.sequence_number)
        .unwrap_or(0);

    let first = engine
        .request_claim(tenant_id, dossier_id, &director1, org1, "first caller", false)
        .unwrap();
    assert_eq!(first.outcome, ClaimRequestOutcome::AutoApproved);

    // Second writer appends against the version it read before the winner.
    let second = UncommittedEvent {
        event_id: Uuid::now_v7(),
        tenant_id,
        aggregate_id: dossier_id.0,
        aggregate_type: "dossier".to_string(),
        event_type: "dossier.claim.requested".to_string(),
        event_version: 1,
        occurred_at: chrono::Utc::now(),
        description: "organization requested ownership: second caller".to_string(),
        payload: serde_json::json!({}),
    };
    let err = engine
        .store()
        .append(vec![second], ExpectedVersion::Exact(stale))
        .unwrap_err();
    assert!(matches!(&err, EventStoreError::Concurrency(_)));

    // At the engine surface a lost race is a retryable conflict.
    assert!(matches!(
        EngineError::from(err),
        EngineError::Workflow(WorkflowError::Conflict(_))
    ));
}

/// Store wrapper that commits a prepared append right before one of the
/// engine's stream loads, emulating a writer slipping in between a read and
/// the commit that was decided from it.
struct InterleavingStore {
    inner: InMemoryEventStore,
    loads_before_commit: Mutex<usize>,
    pending: Mutex<Option<Vec<UncommittedEvent>>>,
}

impl InterleavingStore {
    fn new() -> Self {
        Self {
            inner: InMemoryEventStore::new(),
            loads_before_commit: Mutex::new(0),
            pending: Mutex::new(None),
        }
    }

    /// After `loads` further stream loads, `events` land in the stream before
    /// the next load sees it.
    fn arm(&self, loads: usize, events: Vec<UncommittedEvent>) {
        *self.loads_before_commit.lock().unwrap() = loads;
        *self.pending.lock().unwrap() = Some(events);
    }
}

impl EventStore for InterleavingStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.inner.append(events, expected_version)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let mut remaining = self.loads_before_commit.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
        } else if let Some(events) = self.pending.lock().unwrap().take() {
            self.inner.append(events, ExpectedVersion::Any)?;
        }
        self.inner.load_stream(tenant_id, aggregate_id)
    }

    fn load_page(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.inner.load_page(tenant_id, aggregate_id, offset, limit)
    }
}

#[test]
fn hold_landing_during_a_progression_check_is_a_conflict() {
    // check_and_progress decides against the state it read first; a hold
    // committed between that read and the advance must fail the call rather
    // than let a stale `Progressed` outcome through.
    let store = Arc::new(InterleavingStore::new());
    let engine = WorkflowEngine::new(
        Arc::clone(&store),
        InMemoryEventBus::<EventEnvelope<JsonValue>>::new(),
        InMemoryTaskBoard::new(),
    );
    let tenant_id = TenantId::new();
    let actor = admin_actor(tenant_id);

    let dossier_id = engine
        .open_dossier(tenant_id, &actor, "D-2024-0048", Some(Flow::Local), None)
        .unwrap();
    engine.begin_intake(tenant_id, dossier_id, &actor).unwrap();
    engine
        .activate(tenant_id, dossier_id, &actor, "intake complete")
        .unwrap();
    engine
        .board()
        .complete_phase(tenant_id, dossier_id, Phase::Washing);

    // The hold that will land after the decision read but before the commit.
    let hold_event = DossierEvent::HoldPlaced(HoldPlaced {
        tenant_id,
        dossier_id,
        hold: Hold {
            id: HoldId::new(),
            kind: HoldKind::Legal,
            reason: Reason::new("hold", "autopsy ordered").unwrap(),
            authority: "prosecutor's office".to_string(),
            reference: None,
            placed_by: PrincipalId::new(),
            placed_at: Utc::now(),
            lift: None,
        },
        actor: PrincipalId::new(),
        occurred_at: Utc::now(),
    });
    let uncommitted =
        UncommittedEvent::from_typed(tenant_id, dossier_id.0, "dossier", Uuid::now_v7(), &hold_event)
            .unwrap();
    // One load for the decision read, then the hold lands before the commit
    // pipeline re-reads the stream.
    store.arm(1, vec![uncommitted]);

    let err = engine
        .check_and_progress(tenant_id, dossier_id, &actor)
        .unwrap_err();
    assert!(
        matches!(err, EngineError::Workflow(WorkflowError::Conflict(_))),
        "expected a conflict, got: {err:?}"
    );

    // No advance was committed; the dossier is still in Washing, now held.
    let dossier = engine.dossier(tenant_id, dossier_id).unwrap();
    assert_eq!(dossier.status(), DossierStatus::Operational(Phase::Washing));
    assert!(dossier.legal_hold());
    let page = engine.audit_trail(tenant_id, dossier_id, 0, 1).unwrap();
    assert_eq!(page[0].event_type, "dossier.hold.placed");
}

#[test]
fn family_release_unassigns_the_dossier() {
    let engine = engine();
    let tenant_id = TenantId::new();
    let admin = admin_actor(tenant_id);
    let family = family_actor(tenant_id);
    let org = OrganizationId::new();

    let dossier_id = engine
        .open_dossier(tenant_id, &admin, "D-2024-0046", Some(Flow::Local), Some(org))
        .unwrap();

    engine
        .release(
            tenant_id,
            dossier_id,
            &family,
            ReleaseAction::FamilyRelease,
            "family chose another director",
        )
        .unwrap();

    let dossier = engine.dossier(tenant_id, dossier_id).unwrap();
    assert_eq!(dossier.assigned_org(), None);

    // Releasing again has nothing to release.
    let err = engine
        .release(
            tenant_id,
            dossier_id,
            &family,
            ReleaseAction::FamilyRelease,
            "again",
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Workflow(WorkflowError::InvalidTransition(_))
    ));
}

#[test]
fn deleted_dossier_rejects_mutations_but_stays_readable() {
    let engine = engine();
    let tenant_id = TenantId::new();
    let actor = admin_actor(tenant_id);
    let dossier_id = dossier_in_intake(&engine, tenant_id, &actor);

    engine
        .request_delete(tenant_id, dossier_id, &actor, "duplicate entry")
        .unwrap();

    let err = engine
        .set_flow(tenant_id, dossier_id, &actor, Flow::Repatriation)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Workflow(WorkflowError::InvalidTransition(_))
    ));

    let outcome = engine
        .check_and_progress(tenant_id, dossier_id, &actor)
        .unwrap();
    assert_eq!(outcome, ProgressOutcome::Deleted);

    // Still readable for audit.
    let dossier = engine.dossier(tenant_id, dossier_id).unwrap();
    assert!(dossier.deleted().is_some());
}

#[test]
fn audit_trail_pages_newest_first() {
    let engine = engine();
    let tenant_id = TenantId::new();
    let actor = admin_actor(tenant_id);
    let dossier_id = dossier_in_intake(&engine, tenant_id, &actor);

    let page = engine.audit_trail(tenant_id, dossier_id, 0, 10).unwrap();
    assert_eq!(page.len(), 3);
    assert_eq!(page[0].event_type, "dossier.intake.started");
    assert_eq!(page[1].event_type, "dossier.flow.set");
    assert_eq!(page[2].event_type, "dossier.opened");
    assert!(page.iter().all(|e| !e.description.trim().is_empty()));
    assert_eq!(
        page.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
        vec![3, 2, 1]
    );

    // Restartable pagination.
    let middle = engine.audit_trail(tenant_id, dossier_id, 1, 1).unwrap();
    assert_eq!(middle.len(), 1);
    assert_eq!(middle[0].event_type, "dossier.flow.set");
}

#[test]
fn committed_events_reach_bus_subscribers() {
    // Share the bus with the engine so the test can subscribe to it.
    let bus = std::sync::Arc::new(InMemoryEventBus::<EventEnvelope<JsonValue>>::new());
    let engine = WorkflowEngine::new(
        InMemoryEventStore::new(),
        std::sync::Arc::clone(&bus),
        InMemoryTaskBoard::new(),
    );
    let tenant_id = TenantId::new();
    let actor = admin_actor(tenant_id);

    let subscription = bus.subscribe();
    let dossier_id = engine
        .open_dossier(tenant_id, &actor, "D-2024-0047", None, None)
        .unwrap();

    let envelope = subscription.try_recv().unwrap();
    assert_eq!(envelope.tenant_id(), tenant_id);
    assert_eq!(envelope.aggregate_id(), dossier_id.0);
    assert_eq!(envelope.aggregate_type(), "dossier");
    assert_eq!(envelope.sequence_number(), 1);
}

#[test]
fn wrong_tenant_cannot_read_the_dossier() {
    let engine = engine();
    let tenant_id = TenantId::new();
    let other_tenant = TenantId::new();
    let actor = admin_actor(tenant_id);
    let dossier_id = dossier_in_intake(&engine, tenant_id, &actor);

    let err = engine.dossier(other_tenant, dossier_id).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Workflow(WorkflowError::NotFound)
    ));
}

#[test]
fn second_activation_is_an_invalid_transition() {
    let engine = engine();
    let tenant_id = TenantId::new();
    let actor = admin_actor(tenant_id);
    let dossier_id = operational_dossier(&engine, tenant_id, &actor);

    let err = engine
        .activate(tenant_id, dossier_id, &actor, "again")
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Workflow(WorkflowError::InvalidTransition(_))
    ));
}
