// Runs a small workflow against an in-memory journal and prints the trace.
// No database needed:
//   cargo run -p stepflow-engine --example trace_demo

use async_trait::async_trait;
use serde_json::{json, Map};
use std::sync::{Arc, Mutex};

use stepflow_core::document::parse_document;
use stepflow_core::{
    ExecutionStatus, ExecutionStepResult, Result, StepTypeRegistry, StepflowError,
    WorkflowExecution, WorkflowRevision, WorkflowRevisionId,
};
use stepflow_engine::{ExecutionEngine, ExecutionJournal, RevisionReader};

const DOCUMENT: &str = r#"
namespace: demo
id: greeter
version: 1
name: Greeter
description: Logs a greeting, louder in prod
steps:
  - type: LogTask
    id: hello
    message: "hello there"
  - type: If
    id: env-gate
    condition: "${env} == 'prod'"
    ifTrue:
      type: LogTask
      id: loud
      message: "PRODUCTION RUN"
    ifFalse:
      type: LogTask
      id: quiet
      message: "just a rehearsal"
"#;

#[derive(Default)]
struct PrintingJournal {
    steps: Mutex<Vec<ExecutionStepResult>>,
}

#[async_trait]
impl ExecutionJournal for PrintingJournal {
    async fn create_execution(&self, execution: &WorkflowExecution) -> Result<()> {
        println!(
            "execution {} started for {}",
            execution.execution_id, execution.revision_id
        );
        Ok(())
    }

    async fn update_execution_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        match error_message {
            Some(message) => println!("execution {execution_id} -> {status}: {message}"),
            None => println!("execution {execution_id} -> {status}"),
        }
        Ok(())
    }

    async fn save_step_result(&self, result: &ExecutionStepResult) -> Result<()> {
        println!(
            "  checkpoint #{} {} ({}) -> {}",
            result.step_index, result.step_id, result.step_type, result.status
        );
        self.steps.lock().unwrap().push(result.clone());
        Ok(())
    }
}

struct SingleRevision(WorkflowRevision);

#[async_trait]
impl RevisionReader for SingleRevision {
    async fn get(&self, key: &WorkflowRevisionId) -> Result<WorkflowRevision> {
        if self.0.revision_id().as_ref() == Some(key) {
            Ok(self.0.clone())
        } else {
            Err(StepflowError::not_found(format!(
                "revision {key} does not exist"
            )))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("stepflow=info")
        .init();

    let registry = Arc::new(StepTypeRegistry::with_builtins());
    let revision = parse_document(DOCUMENT, &registry)?;

    let journal = Arc::new(PrintingJournal::default());
    let engine = ExecutionEngine::new(
        Arc::new(SingleRevision(revision)),
        journal.clone(),
        registry,
    );

    let key = WorkflowRevisionId::new("demo", "greeter", 1)?;
    let mut params = Map::new();
    params.insert("env".to_string(), json!("prod"));

    let execution = engine.execute(&key, params).await?;
    println!(
        "finished: {} with {} checkpoints",
        execution.status,
        journal.steps.lock().unwrap().len()
    );
    Ok(())
}
