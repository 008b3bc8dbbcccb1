//! Workflow error model.

use thiserror::Error;

/// Result type used across the workflow domain layer.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Domain-level workflow error.
///
/// Keep this focused on deterministic guard failures (state, privilege,
/// justification, conflicts). Infrastructure concerns belong elsewhere.
/// Every rejected operation surfaces one of these variants to the caller;
/// guard failures are never swallowed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The operation is not legal in the dossier's current state.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// The actor lacks the privilege the operation requires.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A mandatory justification was missing or blank.
    #[error("reason required: {0}")]
    ReasonRequired(String),

    /// An active hold of this kind already exists on the dossier.
    #[error("already held: {0}")]
    AlreadyHeld(String),

    /// No active hold of this kind exists on the dossier.
    #[error("not held: {0}")]
    NotHeld(String),

    /// A conflicting record already exists (duplicate pending claim,
    /// stale version under optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A referenced entity is absent.
    #[error("not found")]
    NotFound,

    /// The dossier's flow must be set before this operation.
    #[error("flow must be set before the dossier leaves intake")]
    FlowRequired,
}

impl WorkflowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn reason_required(msg: impl Into<String>) -> Self {
        Self::ReasonRequired(msg.into())
    }

    pub fn already_held(kind: impl Into<String>) -> Self {
        Self::AlreadyHeld(kind.into())
    }

    pub fn not_held(kind: impl Into<String>) -> Self {
        Self::NotHeld(kind.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
