// Error types shared across the workflow service

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for workflow operations
pub type Result<T> = std::result::Result<T, StepflowError>;

/// A single rejected input parameter, as reported back to the caller.
///
/// `provided` is the raw value the caller sent; it is `null` for a missing
/// required parameter. These structs travel to the API boundary verbatim, so
/// the field names are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct InvalidParam {
    pub name: String,
    pub reason: String,
    pub provided: Option<serde_json::Value>,
}

impl InvalidParam {
    pub fn new(
        name: impl Into<String>,
        reason: impl Into<String>,
        provided: Option<serde_json::Value>,
    ) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
            provided,
        }
    }
}

/// Errors that can occur across the workflow service.
///
/// Domain errors are explicit values surfaced to the caller; only `Internal`
/// represents an unexpected failure (storage, serialization) and maps to a
/// generic 500 at the transport boundary.
#[derive(Debug, Error)]
pub enum StepflowError {
    /// Identifier fails the format rules
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),

    /// Document syntax or shape is invalid
    #[error("parse error: {0}")]
    Parse(String),

    /// Domain invariant violated on a revision; all violations aggregated
    #[error("invalid revision: {}", .0.join("; "))]
    InvalidRevision(Vec<String>),

    /// Uniqueness conflict on create
    #[error("workflow {namespace}/{id} already exists")]
    AlreadyExists { namespace: String, id: String },

    /// Workflow, revision, or execution absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Delete or update attempted on an active revision
    #[error("active revision conflict: {0}")]
    ActiveConflict(String),

    /// The presented `updatedAt` token is stale
    #[error("optimistic lock conflict: expected {expected}, found {actual}")]
    OptimisticLockConflict {
        expected: chrono::DateTime<chrono::Utc>,
        actual: chrono::DateTime<chrono::Utc>,
    },

    /// Aggregated per-parameter validation errors
    #[error("parameter validation failed ({} invalid)", .0.len())]
    ParameterValidation(Vec<InvalidParam>),

    /// A step raised during execution; recorded as a FAILED step, never a 5xx
    #[error("step execution failure: {0}")]
    StepExecutionFailure(String),

    /// Unexpected error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl StepflowError {
    /// Short classification name, recorded in step error details.
    pub fn kind(&self) -> &'static str {
        match self {
            StepflowError::MalformedIdentifier(_) => "MalformedIdentifier",
            StepflowError::Parse(_) => "ParseError",
            StepflowError::InvalidRevision(_) => "InvalidRevision",
            StepflowError::AlreadyExists { .. } => "AlreadyExists",
            StepflowError::NotFound(_) => "NotFound",
            StepflowError::ActiveConflict(_) => "ActiveConflict",
            StepflowError::OptimisticLockConflict { .. } => "OptimisticLockConflict",
            StepflowError::ParameterValidation(_) => "ParameterValidation",
            StepflowError::StepExecutionFailure(_) => "StepExecutionFailure",
            StepflowError::Internal(_) => "Internal",
        }
    }

    /// Create a parse error from any displayable cause
    pub fn parse(cause: impl std::fmt::Display) -> Self {
        StepflowError::Parse(cause.to_string())
    }

    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        StepflowError::NotFound(what.into())
    }

    /// Walk the source chain into a single diagnostic string.
    /// Stands in for a stack trace in persisted error details.
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\ncaused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}
