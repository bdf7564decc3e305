// Database models (internal, converted to domain types at the store boundary)

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;

use stepflow_core::{
    ErrorInfo, ExecutionStepResult, Result, StepTypeRegistry, StepflowError, WorkflowExecution,
    WorkflowRevision, WorkflowRevisionId, WorkflowRevisionWithSource,
};

// ============================================
// Revision rows
// ============================================

/// Revision row from the database, parsed model as JSONB plus source text
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowRevisionRow {
    pub namespace: String,
    pub id: String,
    pub version: i32,
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub steps: Value,
    pub active: bool,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRevisionRow {
    /// Decode the stored model. Stored JSONB always decodes for data written
    /// by this service; a failure here means the row was tampered with.
    pub fn into_revision(self, steps: &StepTypeRegistry) -> Result<WorkflowRevision> {
        let parameters =
            serde_json::from_value(self.parameters).context("decoding stored parameters")?;
        let decoded_steps = steps.decode_steps(&self.steps).map_err(|e| {
            StepflowError::Internal(anyhow::anyhow!(
                "stored steps for {}/{}/{} failed to decode: {e}",
                self.namespace,
                self.id,
                self.version
            ))
        })?;
        Ok(WorkflowRevision {
            namespace: self.namespace,
            id: self.id,
            version: self.version,
            name: self.name,
            description: self.description,
            parameters,
            steps: decoded_steps,
            active: self.active,
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
        })
    }

    pub fn into_revision_with_source(
        self,
        steps: &StepTypeRegistry,
    ) -> Result<WorkflowRevisionWithSource> {
        let source = self.source.clone();
        Ok(WorkflowRevisionWithSource {
            revision: self.into_revision(steps)?,
            source,
        })
    }
}

// ============================================
// Execution rows
// ============================================

/// Execution row from the database
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowExecutionRow {
    pub execution_id: String,
    pub namespace: String,
    pub workflow_id: String,
    pub workflow_version: i32,
    pub input_parameters: Value,
    pub status: String,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_updated_at: DateTime<Utc>,
}

impl WorkflowExecutionRow {
    pub fn into_execution(self) -> Result<WorkflowExecution> {
        let input_parameters = match self.input_parameters {
            Value::Object(map) => map,
            other => {
                return Err(StepflowError::Internal(anyhow::anyhow!(
                    "stored input parameters are not an object: {other}"
                )))
            }
        };
        Ok(WorkflowExecution {
            execution_id: self.execution_id,
            revision_id: WorkflowRevisionId {
                namespace: self.namespace,
                id: self.workflow_id,
                version: self.workflow_version,
            },
            input_parameters,
            status: self.status.parse()?,
            error_message: self.error_message,
            started_at: self.started_at,
            completed_at: self.completed_at,
            last_updated_at: self.last_updated_at,
        })
    }
}

/// Step result row from the database
#[derive(Debug, Clone, FromRow)]
pub struct ExecutionStepResultRow {
    pub result_id: String,
    pub execution_id: String,
    pub step_index: i32,
    pub step_id: String,
    pub step_type: String,
    pub status: String,
    pub input_data: Option<Value>,
    pub output_data: Option<Value>,
    pub error_message: Option<String>,
    pub error_details: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionStepResultRow {
    pub fn into_step_result(self) -> Result<ExecutionStepResult> {
        let error_details: Option<ErrorInfo> = self
            .error_details
            .map(serde_json::from_value)
            .transpose()
            .context("decoding stored error details")?;
        Ok(ExecutionStepResult {
            result_id: self.result_id,
            execution_id: self.execution_id,
            step_index: self.step_index,
            step_id: self.step_id,
            step_type: self.step_type,
            status: self.status.parse()?,
            input_data: self.input_data,
            output_data: self.output_data,
            error_message: self.error_message,
            error_details,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn revision_row() -> WorkflowRevisionRow {
        WorkflowRevisionRow {
            namespace: "ops".to_string(),
            id: "nightly".to_string(),
            version: 2,
            name: "Nightly".to_string(),
            description: "D".to_string(),
            parameters: json!([{"name": "env", "type": "STRING", "required": true}]),
            steps: json!([{"type": "LogTask", "id": "greet", "message": "hi"}]),
            active: true,
            source: "namespace: ops\n".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn revision_row_decodes_into_the_domain_model() {
        let registry = StepTypeRegistry::with_builtins();
        let row = revision_row();
        let created_at = row.created_at;

        let revision = row.into_revision(&registry).unwrap();
        assert_eq!(revision.version, 2);
        assert!(revision.active);
        assert_eq!(revision.parameters.len(), 1);
        assert_eq!(revision.parameters[0].name, "env");
        assert_eq!(revision.steps[0].effective_id(), "greet");
        assert_eq!(revision.created_at, Some(created_at));
    }

    #[test]
    fn tampered_steps_surface_as_internal_errors() {
        let registry = StepTypeRegistry::with_builtins();
        let mut row = revision_row();
        row.steps = json!([{"type": "Vanished"}]);

        let err = row.into_revision(&registry).unwrap_err();
        assert!(matches!(err, StepflowError::Internal(_)));
    }

    #[test]
    fn execution_row_round_trips_status_and_inputs() {
        let now = Utc::now();
        let row = WorkflowExecutionRow {
            execution_id: "V1StGXR8_Z5jdHi6B-myT".to_string(),
            namespace: "ops".to_string(),
            workflow_id: "nightly".to_string(),
            workflow_version: 2,
            input_parameters: json!({"env": "prod"}),
            status: "FAILED".to_string(),
            error_message: Some("boom".to_string()),
            started_at: now,
            completed_at: Some(now),
            last_updated_at: now,
        };

        let execution = row.into_execution().unwrap();
        assert_eq!(execution.status, stepflow_core::ExecutionStatus::Failed);
        assert_eq!(execution.revision_id.version, 2);
        assert_eq!(execution.input_parameters.get("env"), Some(&json!("prod")));
    }

    #[test]
    fn step_result_row_decodes_error_details() {
        let now = Utc::now();
        let row = ExecutionStepResultRow {
            result_id: "r".to_string(),
            execution_id: "e".to_string(),
            step_index: 1,
            step_id: "bad".to_string(),
            step_type: "LogTask".to_string(),
            status: "FAILED".to_string(),
            input_data: None,
            output_data: None,
            error_message: Some("boom".to_string()),
            error_details: Some(json!({"errorType": "StepExecutionFailure", "stackTrace": "boom"})),
            started_at: now,
            completed_at: now,
        };

        let result = row.into_step_result().unwrap();
        assert_eq!(
            result.error_details.unwrap().error_type,
            "StepExecutionFailure"
        );
        assert_eq!(result.status, stepflow_core::StepStatus::Failed);
    }
}
