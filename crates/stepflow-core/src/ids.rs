// Workflow identity and identifier format rules

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, StepflowError};

/// Maximum length of a namespace or workflow id segment
pub const MAX_SEGMENT_LEN: usize = 100;

/// Length of an execution id (URL-safe NanoID)
pub const EXECUTION_ID_LEN: usize = 21;

/// True when `value` is non-blank, at most 100 chars, and alphanumeric plus `-`/`_`
pub fn is_valid_segment(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_SEGMENT_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// True when `value` is a 21-char NanoID over `[A-Za-z0-9_-]`
pub fn is_valid_execution_id(value: &str) -> bool {
    value.len() == EXECUTION_ID_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Mint a fresh 21-char execution id
pub fn new_execution_id() -> String {
    nanoid::nanoid!(EXECUTION_ID_LEN)
}

/// Mint a fresh step-result id (same alphabet and length as execution ids)
pub fn new_result_id() -> String {
    nanoid::nanoid!(EXECUTION_ID_LEN)
}

/// A workflow is identified by the pair `(namespace, id)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WorkflowId {
    pub namespace: String,
    pub id: String,
}

impl WorkflowId {
    /// Build a workflow id, rejecting segments that fail the format rules
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let id = id.into();
        if !is_valid_segment(&namespace) {
            return Err(StepflowError::MalformedIdentifier(format!(
                "namespace '{namespace}' must be 1-100 chars of [A-Za-z0-9_-]"
            )));
        }
        if !is_valid_segment(&id) {
            return Err(StepflowError::MalformedIdentifier(format!(
                "workflow id '{id}' must be 1-100 chars of [A-Za-z0-9_-]"
            )));
        }
        Ok(Self { namespace, id })
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.id)
    }
}

/// A single revision of a workflow: `(namespace, id, version)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WorkflowRevisionId {
    pub namespace: String,
    pub id: String,
    pub version: i32,
}

impl WorkflowRevisionId {
    /// Build a revision id, rejecting bad segments and non-positive versions
    pub fn new(namespace: impl Into<String>, id: impl Into<String>, version: i32) -> Result<Self> {
        let workflow = WorkflowId::new(namespace, id)?;
        if version < 1 {
            return Err(StepflowError::MalformedIdentifier(format!(
                "version must be a positive integer, got {version}"
            )));
        }
        Ok(Self {
            namespace: workflow.namespace,
            id: workflow.id,
            version,
        })
    }

    pub fn workflow_id(&self) -> WorkflowId {
        WorkflowId {
            namespace: self.namespace.clone(),
            id: self.id.clone(),
        }
    }
}

impl fmt::Display for WorkflowRevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.id, self.version)
    }
}
