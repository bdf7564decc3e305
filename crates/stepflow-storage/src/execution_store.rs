// Execution store: one row per run plus an append-only step trace.
//
// Step results are never updated after insert. Each saveStepResult is its own
// commit, so an observer can watch a run's trace grow while the execution row
// still reads RUNNING; execution status is authoritative only once terminal.

use anyhow::Context;
use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;

use stepflow_core::{
    ExecutionStatus, ExecutionStepResult, Result, StepflowError, WorkflowExecution, WorkflowId,
};

use crate::models::{ExecutionStepResultRow, WorkflowExecutionRow};

const EXECUTION_COLUMNS: &str = "execution_id, namespace, workflow_id, workflow_version, input_parameters, status, error_message, started_at, completed_at, last_updated_at";
const STEP_RESULT_COLUMNS: &str = "result_id, execution_id, step_index, step_id, step_type, status, input_data, output_data, error_message, error_details, started_at, completed_at";

/// Pagination bounds for execution listings
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Clone)]
pub struct ExecutionStore {
    pool: PgPool,
}

impl ExecutionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ============================================
    // Executions
    // ============================================

    pub async fn create_execution(&self, execution: &WorkflowExecution) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions (execution_id, namespace, workflow_id, workflow_version, input_parameters, status, error_message, started_at, completed_at, last_updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&execution.execution_id)
        .bind(&execution.revision_id.namespace)
        .bind(&execution.revision_id.id)
        .bind(execution.revision_id.version)
        .bind(Value::Object(execution.input_parameters.clone()))
        .bind(execution.status.as_str())
        .bind(&execution.error_message)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(execution.last_updated_at)
        .execute(&self.pool)
        .await
        .context("inserting execution")?;

        Ok(())
    }

    /// Move an execution to a new status. Terminal states are absorbing: a
    /// write against an already-terminal execution is ignored with a warning.
    pub async fn update_execution_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        let completed_at = status.is_terminal().then_some(now);

        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $2,
                error_message = $3,
                completed_at = COALESCE($4, completed_at),
                last_updated_at = $5
            WHERE execution_id = $1
              AND status NOT IN ('COMPLETED', 'FAILED', 'CANCELLED')
            "#,
        )
        .bind(execution_id)
        .bind(status.as_str())
        .bind(error_message)
        .bind(completed_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("updating execution status")?;

        if result.rows_affected() == 0 {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM workflow_executions WHERE execution_id = $1)",
            )
            .bind(execution_id)
            .fetch_one(&self.pool)
            .await
            .context("checking execution existence")?;

            if !exists {
                return Err(StepflowError::not_found(format!(
                    "execution {execution_id} does not exist"
                )));
            }
            tracing::warn!(
                execution_id = %execution_id,
                attempted_status = %status,
                "ignored status write against a terminal execution"
            );
        }
        Ok(())
    }

    pub async fn find_by_id(&self, execution_id: &str) -> Result<Option<WorkflowExecution>> {
        let row = sqlx::query_as::<_, WorkflowExecutionRow>(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE execution_id = $1"
        ))
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await
        .context("reading execution")?;

        row.map(WorkflowExecutionRow::into_execution).transpose()
    }

    /// Executions of a workflow, newest first, optionally filtered by version
    /// and status. `limit` is clamped to [1, 100].
    pub async fn find_by_workflow(
        &self,
        workflow: &WorkflowId,
        version: Option<i32>,
        status: Option<ExecutionStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WorkflowExecution>> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let offset = offset.max(0);

        let rows = sqlx::query_as::<_, WorkflowExecutionRow>(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM workflow_executions \
             WHERE namespace = $1 AND workflow_id = $2 \
               AND ($3::integer IS NULL OR workflow_version = $3) \
               AND ($4::text IS NULL OR status = $4) \
             ORDER BY started_at DESC \
             LIMIT $5 OFFSET $6"
        ))
        .bind(&workflow.namespace)
        .bind(&workflow.id)
        .bind(version)
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("listing executions")?;

        rows.into_iter()
            .map(WorkflowExecutionRow::into_execution)
            .collect()
    }

    pub async fn count_by_workflow(
        &self,
        workflow: &WorkflowId,
        version: Option<i32>,
        status: Option<ExecutionStatus>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM workflow_executions
            WHERE namespace = $1 AND workflow_id = $2
              AND ($3::integer IS NULL OR workflow_version = $3)
              AND ($4::text IS NULL OR status = $4)
            "#,
        )
        .bind(&workflow.namespace)
        .bind(&workflow.id)
        .bind(version)
        .bind(status.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await
        .context("counting executions")?;

        Ok(count)
    }

    /// Stamp executions left RUNNING by a crashed process as FAILED.
    /// Their step traces remain queryable; resumption is not attempted.
    pub async fn mark_orphaned_running(&self) -> Result<u64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = 'FAILED',
                error_message = 'execution orphaned: service restarted while the run was in flight',
                completed_at = $1,
                last_updated_at = $1
            WHERE status = 'RUNNING'
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .context("sweeping orphaned executions")?;

        if result.rows_affected() > 0 {
            tracing::warn!(
                count = result.rows_affected(),
                "marked orphaned RUNNING executions as FAILED"
            );
        }
        Ok(result.rows_affected())
    }

    // ============================================
    // Step results (append-only)
    // ============================================

    pub async fn save_step_result(&self, result: &ExecutionStepResult) -> Result<()> {
        let error_details = result
            .error_details
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .context("encoding error details")?;

        sqlx::query(
            r#"
            INSERT INTO execution_step_results (result_id, execution_id, step_index, step_id, step_type, status, input_data, output_data, error_message, error_details, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&result.result_id)
        .bind(&result.execution_id)
        .bind(result.step_index)
        .bind(&result.step_id)
        .bind(&result.step_type)
        .bind(result.status.as_str())
        .bind(&result.input_data)
        .bind(&result.output_data)
        .bind(&result.error_message)
        .bind(error_details)
        .bind(result.started_at)
        .bind(result.completed_at)
        .execute(&self.pool)
        .await
        .context("inserting step result")?;

        Ok(())
    }

    pub async fn find_step_results(&self, execution_id: &str) -> Result<Vec<ExecutionStepResult>> {
        let rows = sqlx::query_as::<_, ExecutionStepResultRow>(&format!(
            "SELECT {STEP_RESULT_COLUMNS} FROM execution_step_results \
             WHERE execution_id = $1 ORDER BY step_index ASC"
        ))
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await
        .context("listing step results")?;

        rows.into_iter()
            .map(ExecutionStepResultRow::into_step_result)
            .collect()
    }
}
