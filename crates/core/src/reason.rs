//! Mandatory justification value object.
//!
//! Several operations (activate, release, lift hold, delete) require a
//! non-blank, human-supplied reason that ends up in the audit trail.

use serde::{Deserialize, Serialize};

use crate::error::{WorkflowError, WorkflowResult};

/// Non-blank, trimmed justification string.
///
/// Compared by value; construction is the single place the
/// `ReasonRequired` guard lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reason(String);

impl Reason {
    pub fn new(context: &str, raw: impl AsRef<str>) -> WorkflowResult<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(WorkflowError::reason_required(context.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Reason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
