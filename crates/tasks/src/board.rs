//! Task board contracts and the in-memory board for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use dossierflow_core::TenantId;
use dossierflow_dossier::{DossierId, Phase};

use crate::task::{Task, TaskId, TaskStatus};

/// Read-only view of task state per dossier and phase.
///
/// The workflow engine consults this as a progression guard; it never
/// mutates tasks through this trait.
pub trait TaskBoard: Send + Sync {
    /// Number of not-done tasks, optionally scoped to one phase.
    fn count_open(&self, tenant_id: TenantId, dossier_id: DossierId, phase: Option<Phase>) -> u64;

    fn all_done_for_phase(&self, tenant_id: TenantId, dossier_id: DossierId, phase: Phase) -> bool {
        self.count_open(tenant_id, dossier_id, Some(phase)) == 0
    }
}

/// Seeding collaborator: creates the gating tasks when a dossier enters a
/// phase. Called by the engine after the state change has committed, so
/// failures are reconciled later, never rolled into the transition.
pub trait TaskSeeder: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn seed_phase(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
        phase: Phase,
    ) -> Result<Vec<TaskId>, Self::Error>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct BoardKey {
    tenant_id: TenantId,
    dossier_id: DossierId,
}

/// In-memory task board.
///
/// Owns task mutation the way the production task-board service would;
/// intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTaskBoard {
    tasks: RwLock<HashMap<BoardKey, Vec<Task>>>,
}

/// Standard gating tasks per phase.
fn phase_templates(phase: Phase) -> &'static [&'static str] {
    match phase {
        Phase::Washing => &["arrange washing appointment", "confirm washing location"],
        Phase::Prayer => &["schedule janazah prayer", "notify mosque"],
        Phase::Burial => &["reserve burial plot", "arrange transport to cemetery"],
        Phase::Repatriation => &[
            "book repatriation flight",
            "obtain consulate clearance",
            "arrange transport to airport",
        ],
    }
}

impl InMemoryTaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// All tasks for a dossier, in creation order.
    pub fn tasks_for(&self, tenant_id: TenantId, dossier_id: DossierId) -> Vec<Task> {
        let key = BoardKey {
            tenant_id,
            dossier_id,
        };
        self.tasks
            .read()
            .map(|map| map.get(&key).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Move a single task to a new status. Returns false if the task is
    /// unknown.
    pub fn set_status(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
        task_id: TaskId,
        status: TaskStatus,
    ) -> bool {
        let key = BoardKey {
            tenant_id,
            dossier_id,
        };
        let Ok(mut map) = self.tasks.write() else {
            return false;
        };
        let Some(tasks) = map.get_mut(&key) else {
            return false;
        };
        match tasks.iter_mut().find(|t| t.id == task_id) {
            Some(task) => {
                task.status = status;
                true
            }
            None => false,
        }
    }

    /// Mark every task of a phase done (test convenience).
    pub fn complete_phase(&self, tenant_id: TenantId, dossier_id: DossierId, phase: Phase) {
        let key = BoardKey {
            tenant_id,
            dossier_id,
        };
        if let Ok(mut map) = self.tasks.write() {
            if let Some(tasks) = map.get_mut(&key) {
                for task in tasks.iter_mut().filter(|t| t.phase == phase) {
                    task.status = TaskStatus::Done;
                }
            }
        }
    }
}

impl TaskBoard for InMemoryTaskBoard {
    fn count_open(&self, tenant_id: TenantId, dossier_id: DossierId, phase: Option<Phase>) -> u64 {
        let key = BoardKey {
            tenant_id,
            dossier_id,
        };
        let Ok(map) = self.tasks.read() else {
            return 0;
        };
        map.get(&key)
            .map(|tasks| {
                tasks
                    .iter()
                    .filter(|t| t.status.is_open())
                    .filter(|t| phase.is_none_or(|p| t.phase == p))
                    .count() as u64
            })
            .unwrap_or(0)
    }
}

impl TaskSeeder for InMemoryTaskBoard {
    type Error = core::convert::Infallible;

    fn seed_phase(
        &self,
        tenant_id: TenantId,
        dossier_id: DossierId,
        phase: Phase,
    ) -> Result<Vec<TaskId>, Self::Error> {
        let key = BoardKey {
            tenant_id,
            dossier_id,
        };
        let mut seeded = Vec::new();
        if let Ok(mut map) = self.tasks.write() {
            let tasks = map.entry(key).or_default();
            // Seeding is idempotent per phase: re-entry does not duplicate.
            if tasks.iter().any(|t| t.phase == phase) {
                return Ok(vec![]);
            }
            for title in phase_templates(phase) {
                let task = Task {
                    id: TaskId::new(),
                    tenant_id,
                    dossier_id,
                    phase,
                    title: (*title).to_string(),
                    status: TaskStatus::Open,
                    created_at: Utc::now(),
                };
                seeded.push(task.id);
                tasks.push(task);
            }
        }
        Ok(seeded)
    }
}
