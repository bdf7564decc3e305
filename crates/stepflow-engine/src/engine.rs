// Execution engine: drive one revision's step tree to a terminal status.
//
// A single execution is one sequential walker. The engine takes no
// process-wide locks; isolation between concurrent executions comes from
// distinct execution ids and the append-only step trace.

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;

use stepflow_core::{
    ids, ExecutionContext, ExecutionStatus, Result, StepExecutor, StepStatus, StepTypeRegistry,
    WorkflowExecution, WorkflowRevisionId,
};

use crate::executor::PersistingExecutor;
use crate::journal::{ExecutionJournal, RevisionReader};

pub struct ExecutionEngine {
    revisions: Arc<dyn RevisionReader>,
    journal: Arc<dyn ExecutionJournal>,
    registry: Arc<StepTypeRegistry>,
}

impl ExecutionEngine {
    pub fn new(
        revisions: Arc<dyn RevisionReader>,
        journal: Arc<dyn ExecutionJournal>,
        registry: Arc<StepTypeRegistry>,
    ) -> Self {
        Self {
            revisions,
            journal,
            registry,
        }
    }

    /// Run a revision against validated input parameters.
    ///
    /// The execution row is persisted as RUNNING before the walk starts and
    /// moved to its terminal status after; every started step leaves a
    /// checkpoint regardless of how the walk ends. Step failures never
    /// surface as errors from this method - they end the run as FAILED.
    pub async fn execute(
        &self,
        revision_id: &WorkflowRevisionId,
        validated_params: Map<String, Value>,
    ) -> Result<WorkflowExecution> {
        let revision = self.revisions.get(revision_id).await?;

        let execution_id = ids::new_execution_id();
        let started_at = Utc::now();
        let mut execution = WorkflowExecution::started(
            execution_id.clone(),
            revision_id.clone(),
            validated_params.clone(),
            started_at,
        );
        self.journal.create_execution(&execution).await?;

        tracing::info!(
            execution_id = %execution_id,
            revision = %revision_id,
            parameter_count = validated_params.len(),
            "execution started"
        );

        let ctx = ExecutionContext::new(validated_params);
        let mut executor =
            PersistingExecutor::new(self.journal.as_ref(), self.registry.clone(), &execution_id);

        let walk = executor.execute_sequence(&revision.steps, ctx).await;
        let (final_status, error_message) = match walk {
            Ok((StepStatus::Completed, _)) | Ok((StepStatus::Skipped, _)) => {
                (ExecutionStatus::Completed, None)
            }
            Ok((StepStatus::Failed, _)) => {
                let message = executor
                    .last_error()
                    .unwrap_or("a step failed during execution")
                    .to_string();
                (ExecutionStatus::Failed, Some(message))
            }
            Err(err) => {
                tracing::error!(
                    execution_id = %execution_id,
                    error = %err,
                    "execution aborted"
                );
                (ExecutionStatus::Failed, Some(err.to_string()))
            }
        };

        self.journal
            .update_execution_status(&execution_id, final_status, error_message.as_deref())
            .await?;

        let now = Utc::now();
        execution.status = final_status;
        execution.error_message = error_message;
        execution.completed_at = Some(now);
        execution.last_updated_at = now;

        tracing::info!(
            execution_id = %execution_id,
            status = %final_status,
            steps = executor.persisted_steps(),
            "execution finished"
        );
        Ok(execution)
    }
}
