// Executor capability seam.
//
// Composite steps must run their children *through* the engine so every step
// is checkpointed, but steps live in the model layer. The narrow trait below
// is what steps see; the engine crate provides the persisting implementation.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::execution::StepStatus;
use crate::step::{Step, StepHandler};

/// Result of executing a single step: its status, the context to continue
/// with, and the output recorded in the step's trace row.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub status: StepStatus,
    pub context: ExecutionContext,
    pub output: Option<Value>,
    pub error_message: Option<String>,
}

impl StepOutcome {
    pub fn completed(context: ExecutionContext, output: Option<Value>) -> Self {
        Self {
            status: StepStatus::Completed,
            context,
            output,
            error_message: None,
        }
    }

    pub fn failed(context: ExecutionContext, message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            context,
            output: None,
            error_message: Some(message.into()),
        }
    }
}

/// Capability interface composites call back into.
///
/// `execute_and_persist` runs one step inside the engine's exception guard
/// and checkpoints its result; `execute_sequence` walks a list of steps with
/// fail-fast semantics, returning the last good context alongside the status.
#[async_trait]
pub trait StepExecutor: Send {
    async fn execute_and_persist(
        &mut self,
        step: &Step,
        ctx: ExecutionContext,
    ) -> Result<(StepStatus, ExecutionContext)>;

    async fn execute_sequence(
        &mut self,
        steps: &[Step],
        ctx: ExecutionContext,
    ) -> Result<(StepStatus, ExecutionContext)>;

    /// Look up the handler for an extension step type
    fn step_handler(&self, type_name: &str) -> Option<Arc<dyn StepHandler>>;
}
