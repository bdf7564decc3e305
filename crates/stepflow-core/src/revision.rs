// Workflow revisions and parameter definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StepflowError};
use crate::ids::{self, WorkflowId, WorkflowRevisionId};
use crate::params::ParameterTypeRegistry;
use crate::step::Step;

/// Maximum length of a revision name
pub const MAX_NAME_LEN: usize = 255;
/// Maximum length of a revision description
pub const MAX_DESCRIPTION_LEN: usize = 1000;
/// Step trees deeper than this are rejected as invalid
pub const MAX_STEP_DEPTH: usize = 32;

/// A typed input parameter declared by a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// One immutable version of a workflow.
///
/// `namespace`, `id`, `version`, and `created_at` never change after insert.
/// `name`, `description`, `parameters`, and `steps` may change only while the
/// revision is inactive; `active` is always mutable. `updated_at` is bumped on
/// every mutation and doubles as the optimistic-lock token. A `version` of 0
/// means the revision was parsed from a document and has not been assigned a
/// version by the store yet.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRevision {
    pub namespace: String,
    pub id: String,
    pub version: i32,
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterDefinition>,
    pub steps: Vec<Step>,
    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowRevision {
    pub fn workflow_id(&self) -> WorkflowId {
        WorkflowId {
            namespace: self.namespace.clone(),
            id: self.id.clone(),
        }
    }

    /// Revision id once a version has been assigned
    pub fn revision_id(&self) -> Option<WorkflowRevisionId> {
        if self.version < 1 {
            return None;
        }
        Some(WorkflowRevisionId {
            namespace: self.namespace.clone(),
            id: self.id.clone(),
            version: self.version,
        })
    }

    /// Check every field-level invariant, collecting all violations into a
    /// single aggregated error rather than failing on the first.
    pub fn validate(&self, types: &ParameterTypeRegistry) -> Result<()> {
        let mut violations = Vec::new();

        if !ids::is_valid_segment(&self.namespace) {
            violations.push(format!(
                "namespace '{}' must be 1-100 chars of [A-Za-z0-9_-]",
                self.namespace
            ));
        }
        if !ids::is_valid_segment(&self.id) {
            violations.push(format!(
                "id '{}' must be 1-100 chars of [A-Za-z0-9_-]",
                self.id
            ));
        }
        if self.version < 0 {
            violations.push(format!("version must not be negative, got {}", self.version));
        }
        if self.name.trim().is_empty() {
            violations.push("name must not be blank".to_string());
        } else if self.name.len() > MAX_NAME_LEN {
            violations.push(format!("name must be at most {MAX_NAME_LEN} chars"));
        }
        if self.description.trim().is_empty() {
            violations.push("description must not be blank".to_string());
        } else if self.description.len() > MAX_DESCRIPTION_LEN {
            violations.push(format!(
                "description must be at most {MAX_DESCRIPTION_LEN} chars"
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for param in &self.parameters {
            if param.name.trim().is_empty() {
                violations.push("parameter name must not be blank".to_string());
            } else if !seen.insert(param.name.as_str()) {
                violations.push(format!("duplicate parameter '{}'", param.name));
            }
            if !types.has(&param.param_type) {
                violations.push(format!(
                    "parameter '{}' has unknown type '{}'",
                    param.name, param.param_type
                ));
            }
        }

        for step in &self.steps {
            validate_step(step, &mut violations);
            if step.depth() > MAX_STEP_DEPTH {
                violations.push(format!(
                    "step tree exceeds the maximum nesting depth of {MAX_STEP_DEPTH}"
                ));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(StepflowError::InvalidRevision(violations))
        }
    }
}

fn validate_step(step: &Step, violations: &mut Vec<String>) {
    if let Some(id) = step.declared_id() {
        if !ids::is_valid_segment(id) {
            violations.push(format!(
                "step id '{id}' must be 1-100 chars of [A-Za-z0-9_-]"
            ));
        }
    }
    match step {
        Step::Sequence(seq) => {
            for child in &seq.steps {
                validate_step(child, violations);
            }
        }
        Step::If(cond) => {
            if cond.condition.trim().is_empty() {
                violations.push("If step condition must not be blank".to_string());
            }
            validate_step(&cond.if_true, violations);
            if let Some(if_false) = &cond.if_false {
                validate_step(if_false, violations);
            }
        }
        Step::Log(log) => {
            if log.message.is_empty() {
                violations.push("LogTask message must not be empty".to_string());
            }
        }
        Step::Custom(_) => {}
    }
}

/// A revision paired with the author's original document text.
///
/// The source is preserved byte-for-byte; only the managed metadata lines
/// (`version`, `createdAt`, `updatedAt`, `active`) are ever rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRevisionWithSource {
    pub revision: WorkflowRevision,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{LogStep, SequenceStep};

    fn revision() -> WorkflowRevision {
        WorkflowRevision {
            namespace: "ops".to_string(),
            id: "daily-report".to_string(),
            version: 1,
            name: "Daily report".to_string(),
            description: "Logs the daily report".to_string(),
            parameters: vec![ParameterDefinition {
                name: "user".to_string(),
                param_type: "STRING".to_string(),
                required: true,
                default: None,
            }],
            steps: vec![Step::Log(LogStep {
                id: None,
                message: "hi".to_string(),
            })],
            active: false,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn valid_revision_passes() {
        let types = ParameterTypeRegistry::with_builtins();
        assert!(revision().validate(&types).is_ok());
    }

    #[test]
    fn violations_are_aggregated() {
        let types = ParameterTypeRegistry::with_builtins();
        let mut rev = revision();
        rev.name = "  ".to_string();
        rev.description = String::new();
        rev.parameters.push(ParameterDefinition {
            name: "user".to_string(),
            param_type: "GEO".to_string(),
            required: false,
            default: None,
        });

        let err = rev.validate(&types).unwrap_err();
        match err {
            StepflowError::InvalidRevision(violations) => {
                assert_eq!(violations.len(), 4);
                assert!(violations.iter().any(|v| v.contains("name")));
                assert!(violations.iter().any(|v| v.contains("description")));
                assert!(violations.iter().any(|v| v.contains("duplicate parameter")));
                assert!(violations.iter().any(|v| v.contains("unknown type 'GEO'")));
            }
            other => panic!("expected InvalidRevision, got {other:?}"),
        }
    }

    #[test]
    fn oversized_fields_are_rejected() {
        let types = ParameterTypeRegistry::with_builtins();
        let mut rev = revision();
        rev.name = "x".repeat(256);
        rev.description = "y".repeat(1001);
        let err = rev.validate(&types).unwrap_err();
        assert!(matches!(err, StepflowError::InvalidRevision(v) if v.len() == 2));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let types = ParameterTypeRegistry::with_builtins();
        let mut step = Step::Log(LogStep {
            id: None,
            message: "leaf".to_string(),
        });
        for _ in 0..MAX_STEP_DEPTH {
            step = Step::Sequence(SequenceStep {
                id: None,
                steps: vec![step],
            });
        }
        let mut rev = revision();
        rev.steps = vec![step];
        let err = rev.validate(&types).unwrap_err();
        assert!(matches!(err, StepflowError::InvalidRevision(v) if v.iter().any(|m| m.contains("nesting"))));
    }

    #[test]
    fn unassigned_version_has_no_revision_id() {
        let mut rev = revision();
        rev.version = 0;
        assert!(rev.revision_id().is_none());
        rev.version = 3;
        assert_eq!(rev.revision_id().unwrap().version, 3);
    }
}
