//! `dossierflow-events` — event abstractions shared by the workflow engine.
//!
//! Events are the system of record here: every state change on a dossier is
//! described by an event, stored append-only, and distributed to consumers
//! (notification dispatch, projections) through the bus.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use tenant::TenantScoped;
