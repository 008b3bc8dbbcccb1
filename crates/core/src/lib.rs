//! `dossierflow-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod reason;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{WorkflowError, WorkflowResult};
pub use id::{AggregateId, OrganizationId, TenantId};
pub use reason::Reason;
