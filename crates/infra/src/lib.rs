//! `dossierflow-infra` — audit store and the workflow engine facade.
//!
//! This crate composes the pure dossier aggregate with the append-only audit
//! store, the event bus, and the task board into the synchronous operation
//! surface callers use (UI backend, CLI, batch scheduler).

pub mod engine;
pub mod event_store;

#[cfg(test)]
mod integration_tests;

pub use engine::{ClaimDecision, ClaimReceipt, EngineError, WorkflowEngine};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
