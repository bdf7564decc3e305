// Per-step checkpointed execution.
//
// Every step - nested or not - runs through execute_and_persist: the step is
// invoked inside an exception guard, its outcome becomes an append-only
// ExecutionStepResult, and only then does the walk continue. Step indices are
// assigned at persist time, so commit order and index order coincide.

use chrono::Utc;
use std::sync::Arc;

use async_trait::async_trait;
use stepflow_core::{
    ids, ErrorInfo, ExecutionContext, ExecutionStepResult, Result, Step, StepExecutor, StepHandler,
    StepStatus, StepTypeRegistry,
};

use crate::journal::ExecutionJournal;

pub struct PersistingExecutor<'a> {
    journal: &'a dyn ExecutionJournal,
    registry: Arc<StepTypeRegistry>,
    execution_id: String,
    next_index: i32,
    last_error: Option<String>,
}

impl<'a> PersistingExecutor<'a> {
    pub fn new(
        journal: &'a dyn ExecutionJournal,
        registry: Arc<StepTypeRegistry>,
        execution_id: impl Into<String>,
    ) -> Self {
        Self {
            journal,
            registry,
            execution_id: execution_id.into(),
            next_index: 0,
            last_error: None,
        }
    }

    /// Message of the most recent failed step, if any
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Number of step results persisted so far
    pub fn persisted_steps(&self) -> i32 {
        self.next_index
    }
}

#[async_trait]
impl StepExecutor for PersistingExecutor<'_> {
    async fn execute_and_persist(
        &mut self,
        step: &Step,
        ctx: ExecutionContext,
    ) -> Result<(StepStatus, ExecutionContext)> {
        let started_at = Utc::now();
        let input_data = step.input_snapshot();

        // Exception guard: a step that errors becomes a FAILED result, it
        // never unwinds through the engine.
        let outcome = step.execute(ctx.clone(), self).await;
        let completed_at = Utc::now();

        let (status, next_ctx, output_data, error_message, error_details) = match outcome {
            Ok(outcome) => {
                let error_message = outcome.error_message;
                (
                    outcome.status,
                    outcome.context,
                    outcome.output,
                    error_message,
                    None,
                )
            }
            Err(err) => {
                tracing::warn!(
                    execution_id = %self.execution_id,
                    step_id = %step.effective_id(),
                    error = %err,
                    "step raised during execution"
                );
                let details = ErrorInfo::from_error(&err);
                (
                    StepStatus::Failed,
                    ctx,
                    None,
                    Some(err.to_string()),
                    Some(details),
                )
            }
        };

        let step_index = self.next_index;
        self.next_index += 1;

        let record = ExecutionStepResult {
            result_id: ids::new_result_id(),
            execution_id: self.execution_id.clone(),
            step_index,
            step_id: step.effective_id().to_string(),
            step_type: step.type_name().to_string(),
            status,
            input_data,
            // Output only ever accompanies a completed step
            output_data: if status == StepStatus::Completed {
                output_data
            } else {
                None
            },
            error_message: error_message.clone(),
            error_details,
            started_at,
            completed_at,
        };
        self.journal.save_step_result(&record).await?;

        if status == StepStatus::Failed {
            self.last_error = error_message.or_else(|| {
                Some(format!("step '{}' failed", record.step_id))
            });
        }

        Ok((status, next_ctx))
    }

    async fn execute_sequence(
        &mut self,
        steps: &[Step],
        ctx: ExecutionContext,
    ) -> Result<(StepStatus, ExecutionContext)> {
        let mut current = ctx;
        for step in steps {
            let (status, next) = self.execute_and_persist(step, current).await?;
            current = next;
            if status == StepStatus::Failed {
                // Fail fast: remaining steps are never started and leave no
                // trace rows.
                return Ok((StepStatus::Failed, current));
            }
        }
        Ok((StepStatus::Completed, current))
    }

    fn step_handler(&self, type_name: &str) -> Option<Arc<dyn StepHandler>> {
        self.registry.handler(type_name)
    }
}
