use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use dossierflow_core::{AggregateId, ExpectedVersion, TenantId};

/// An audit event ready to be appended to a stream (no sequence number yet).
///
/// Built from a typed domain event via [`UncommittedEvent::from_typed`],
/// which serializes the payload and captures the event metadata — including
/// the human-readable `description` the audit trail surfaces to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub description: String,

    pub payload: JsonValue,
}

/// A stored audit event (assigned a sequence number).
///
/// Sequence numbers are assigned by the store during append and are
/// monotonically increasing per stream `(tenant_id, aggregate_id)`; they are
/// never reassigned, and stored events are never mutated or deleted — this
/// is the system of record for "what happened and why".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub description: String,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into a tenant-scoped envelope for publication.
    pub fn to_envelope(&self) -> dossierflow_events::EventEnvelope<JsonValue> {
        dossierflow_events::EventEnvelope::new(
            self.event_id,
            self.tenant_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.sequence_number,
            self.payload.clone(),
        )
    }
}

/// Event store operation error.
///
/// Infrastructure errors (storage, concurrency, isolation), as opposed to
/// the domain guard failures in `WorkflowError`.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),
}

/// Append-only, tenant-scoped event store.
///
/// Events are organized into streams, one per aggregate instance, keyed
/// `(tenant_id, aggregate_id)`. Implementations must:
/// - enforce tenant isolation on both read and write
/// - enforce optimistic concurrency against the current stream version
/// - assign monotonically increasing sequence numbers (no gaps, no dupes)
/// - persist a batch atomically (all or nothing)
///
/// Audit durability is a precondition, not a best-effort side channel: if an
/// append fails, the triggering workflow operation fails with it.
pub trait EventStore: Send + Sync {
    /// Append events to an aggregate stream (append-only).
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load the full stream for a tenant + aggregate, oldest first.
    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load one page of the stream, **newest first** (audit trail read:
    /// finite and restartable via `offset`/`limit`).
    fn load_page(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(tenant_id, aggregate_id)
    }

    fn load_page(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_page(tenant_id, aggregate_id, offset, limit)
    }
}

impl UncommittedEvent {
    /// Convenience constructor from a typed domain event.
    ///
    /// Keeps infra decoupled from the business crates while still capturing
    /// the metadata needed for deserialization and audit display.
    pub fn from_typed<E>(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: dossierflow_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            description: event.describe(),
            payload,
        })
    }
}
