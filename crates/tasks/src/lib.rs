//! `dossierflow-tasks` — the task gate.
//!
//! Tasks gate phase progression: a dossier cannot auto-progress out of a
//! phase while any task for that phase is still open. Task mutation is owned
//! by the task board (an external collaborator in production); the workflow
//! engine only reads counts and requests seeding on phase entry.

pub mod board;
pub mod task;

pub use board::{InMemoryTaskBoard, TaskBoard, TaskSeeder};
pub use task::{Task, TaskId, TaskStatus};
