// Storage seams the engine runs against.
//
// The engine only needs three writes and one read; keeping them behind traits
// keeps the walk testable without Postgres. The sqlx stores implement both.

use async_trait::async_trait;

use stepflow_core::{
    ExecutionStatus, ExecutionStepResult, Result, WorkflowExecution, WorkflowRevision,
    WorkflowRevisionId,
};
use stepflow_storage::{ExecutionStore, RevisionStore};

/// Durable record of an execution and its step trace
#[async_trait]
pub trait ExecutionJournal: Send + Sync {
    async fn create_execution(&self, execution: &WorkflowExecution) -> Result<()>;

    async fn update_execution_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    /// Append one step result. Each call commits independently so the trace
    /// is visible to concurrent readers as the walk progresses.
    async fn save_step_result(&self, result: &ExecutionStepResult) -> Result<()>;
}

/// Read access to stored revisions
#[async_trait]
pub trait RevisionReader: Send + Sync {
    async fn get(&self, key: &WorkflowRevisionId) -> Result<WorkflowRevision>;
}

#[async_trait]
impl ExecutionJournal for ExecutionStore {
    async fn create_execution(&self, execution: &WorkflowExecution) -> Result<()> {
        ExecutionStore::create_execution(self, execution).await
    }

    async fn update_execution_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        ExecutionStore::update_execution_status(self, execution_id, status, error_message).await
    }

    async fn save_step_result(&self, result: &ExecutionStepResult) -> Result<()> {
        ExecutionStore::save_step_result(self, result).await
    }
}

#[async_trait]
impl RevisionReader for RevisionStore {
    async fn get(&self, key: &WorkflowRevisionId) -> Result<WorkflowRevision> {
        RevisionStore::get(self, key).await
    }
}
