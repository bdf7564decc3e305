// Engine walk tests against in-memory storage fakes.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use stepflow_core::{
    CustomStep, ExecutionContext, ExecutionStatus, ExecutionStepResult, Result, StepHandler,
    StepStatus, StepTypeRegistry, StepflowError, WorkflowExecution, WorkflowRevision,
    WorkflowRevisionId,
};
use stepflow_engine::{ExecutionEngine, ExecutionJournal, RevisionReader};

// ============================================
// In-memory fakes
// ============================================

#[derive(Default)]
struct MemoryJournal {
    executions: Mutex<Vec<WorkflowExecution>>,
    statuses: Mutex<Vec<(String, ExecutionStatus, Option<String>)>>,
    steps: Mutex<Vec<ExecutionStepResult>>,
}

#[async_trait]
impl ExecutionJournal for MemoryJournal {
    async fn create_execution(&self, execution: &WorkflowExecution) -> Result<()> {
        self.executions.lock().unwrap().push(execution.clone());
        Ok(())
    }

    async fn update_execution_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        self.statuses.lock().unwrap().push((
            execution_id.to_string(),
            status,
            error_message.map(str::to_string),
        ));
        Ok(())
    }

    async fn save_step_result(&self, result: &ExecutionStepResult) -> Result<()> {
        self.steps.lock().unwrap().push(result.clone());
        Ok(())
    }
}

impl MemoryJournal {
    fn step_results(&self) -> Vec<ExecutionStepResult> {
        self.steps.lock().unwrap().clone()
    }

    fn final_status(&self) -> Option<(ExecutionStatus, Option<String>)> {
        self.statuses
            .lock()
            .unwrap()
            .last()
            .map(|(_, status, message)| (*status, message.clone()))
    }
}

struct MemoryRevisions {
    revisions: HashMap<WorkflowRevisionId, WorkflowRevision>,
}

impl MemoryRevisions {
    fn single(revision: WorkflowRevision) -> Self {
        let key = revision.revision_id().expect("revision has a version");
        let mut revisions = HashMap::new();
        revisions.insert(key, revision);
        Self { revisions }
    }
}

#[async_trait]
impl RevisionReader for MemoryRevisions {
    async fn get(&self, key: &WorkflowRevisionId) -> Result<WorkflowRevision> {
        self.revisions
            .get(key)
            .cloned()
            .ok_or_else(|| StepflowError::not_found(format!("revision {key} does not exist")))
    }
}

// ============================================
// Test step handlers
// ============================================

/// Extension step that always errors, for exercising the exception guard
struct ExplodingHandler;

#[async_trait]
impl StepHandler for ExplodingHandler {
    fn type_name(&self) -> &str {
        "ExplodeTask"
    }

    async fn execute(&self, _: &CustomStep, _: &ExecutionContext) -> Result<Option<Value>> {
        Err(StepflowError::StepExecutionFailure(
            "deliberate explosion".to_string(),
        ))
    }
}

/// Extension step that echoes an input parameter into its output
struct EchoHandler;

#[async_trait]
impl StepHandler for EchoHandler {
    fn type_name(&self) -> &str {
        "EchoTask"
    }

    async fn execute(&self, step: &CustomStep, ctx: &ExecutionContext) -> Result<Option<Value>> {
        let name = step
            .config
            .get("parameter")
            .and_then(Value::as_str)
            .unwrap_or("input");
        Ok(Some(json!({ "echoed": ctx.input(name).cloned() })))
    }
}

// ============================================
// Helpers
// ============================================

fn registry_with_test_handlers() -> Arc<StepTypeRegistry> {
    let mut registry = StepTypeRegistry::with_builtins();
    registry.register_handler(Arc::new(ExplodingHandler));
    registry.register_handler(Arc::new(EchoHandler));
    Arc::new(registry)
}

fn revision(steps_doc: Value) -> WorkflowRevision {
    let registry = registry_with_test_handlers();
    WorkflowRevision {
        namespace: "test".to_string(),
        id: "wf".to_string(),
        version: 1,
        name: "Test workflow".to_string(),
        description: "engine test fixture".to_string(),
        parameters: vec![],
        steps: registry.decode_steps(&steps_doc).unwrap(),
        active: true,
        created_at: None,
        updated_at: None,
    }
}

fn engine_for(revision: WorkflowRevision) -> (ExecutionEngine, Arc<MemoryJournal>) {
    let journal = Arc::new(MemoryJournal::default());
    let engine = ExecutionEngine::new(
        Arc::new(MemoryRevisions::single(revision)),
        journal.clone(),
        registry_with_test_handlers(),
    );
    (engine, journal)
}

fn key() -> WorkflowRevisionId {
    WorkflowRevisionId::new("test", "wf", 1).unwrap()
}

fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

// ============================================
// Tests
// ============================================

#[tokio::test]
async fn single_log_task_completes() {
    let rev = revision(json!([{"type": "LogTask", "message": "hi"}]));
    let (engine, journal) = engine_for(rev);

    let execution = engine.execute(&key(), Map::new()).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.error_message.is_none());
    assert!(execution.completed_at.unwrap() >= execution.started_at);
    assert_eq!(execution.execution_id.len(), 21);

    let steps = journal.step_results();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].step_index, 0);
    assert_eq!(steps[0].step_type, "LogTask");
    assert_eq!(steps[0].status, StepStatus::Completed);
    assert_eq!(steps[0].output_data, Some(json!({"message": "hi"})));

    let (status, message) = journal.final_status().unwrap();
    assert_eq!(status, ExecutionStatus::Completed);
    assert!(message.is_none());
}

#[tokio::test]
async fn missing_revision_is_not_found() {
    let rev = revision(json!([{"type": "LogTask", "message": "hi"}]));
    let (engine, _) = engine_for(rev);

    let other = WorkflowRevisionId::new("test", "wf", 99).unwrap();
    let err = engine.execute(&other, Map::new()).await.unwrap_err();
    assert!(matches!(err, StepflowError::NotFound(_)));
}

#[tokio::test]
async fn sequence_fails_fast_and_omits_unstarted_steps() {
    let rev = revision(json!([
        {"type": "LogTask", "id": "good", "message": "one"},
        {"type": "ExplodeTask", "id": "bad"},
        {"type": "LogTask", "id": "never", "message": "three"}
    ]));
    let (engine, journal) = engine_for(rev);

    let execution = engine.execute(&key(), Map::new()).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution
        .error_message
        .as_deref()
        .unwrap()
        .contains("deliberate explosion"));

    // Exactly two rows: the completed step and the failed one. The step after
    // the failure never started and leaves no trace.
    let steps = journal.step_results();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].step_id, "good");
    assert_eq!(steps[0].status, StepStatus::Completed);
    assert_eq!(steps[1].step_id, "bad");
    assert_eq!(steps[1].status, StepStatus::Failed);
    assert_eq!(
        steps[1].error_details.as_ref().unwrap().error_type,
        "StepExecutionFailure"
    );
    assert!(steps[1].output_data.is_none());
    assert!(steps.iter().all(|s| s.step_id != "never"));
}

#[tokio::test]
async fn step_indices_are_dense_and_unique() {
    let rev = revision(json!([
        {"type": "LogTask", "message": "a"},
        {"type": "Sequence", "id": "inner", "steps": [
            {"type": "LogTask", "message": "b"},
            {"type": "LogTask", "message": "c"}
        ]},
        {"type": "LogTask", "message": "d"}
    ]));
    let (engine, journal) = engine_for(rev);

    engine.execute(&key(), Map::new()).await.unwrap();

    let steps = journal.step_results();
    // Five rows: three root steps plus the two children of the inner
    // sequence; every started step is checkpointed.
    assert_eq!(steps.len(), 5);
    let mut indices: Vec<i32> = steps.iter().map(|s| s.step_index).collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);

    // The composite's own row persists after its children complete
    let inner = steps.iter().find(|s| s.step_id == "inner").unwrap();
    assert_eq!(inner.step_index, 3);
    assert_eq!(inner.status, StepStatus::Completed);
    assert!(inner.input_data.is_none());
}

#[tokio::test]
async fn nested_failure_propagates_to_the_enclosing_sequence() {
    let rev = revision(json!([
        {"type": "Sequence", "id": "outer", "steps": [
            {"type": "ExplodeTask", "id": "inner-bad"}
        ]},
        {"type": "LogTask", "id": "after", "message": "never"}
    ]));
    let (engine, journal) = engine_for(rev);

    let execution = engine.execute(&key(), Map::new()).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);

    let steps = journal.step_results();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].step_id, "inner-bad");
    assert_eq!(steps[0].status, StepStatus::Failed);
    assert_eq!(steps[1].step_id, "outer");
    assert_eq!(steps[1].status, StepStatus::Failed);
    assert!(steps.iter().all(|s| s.step_id != "after"));
}

#[tokio::test]
async fn if_selects_the_true_branch() {
    let rev = revision(json!([
        {"type": "If", "id": "gate", "condition": "verbose",
         "ifTrue": {"type": "LogTask", "id": "loud", "message": "on"},
         "ifFalse": {"type": "LogTask", "id": "quiet", "message": "off"}}
    ]));
    let (engine, journal) = engine_for(rev);

    engine
        .execute(&key(), params(&[("verbose", json!(true))]))
        .await
        .unwrap();

    let steps = journal.step_results();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].step_id, "loud");
    assert_eq!(steps[1].step_id, "gate");
    assert!(steps.iter().all(|s| s.step_id != "quiet"));
}

#[tokio::test]
async fn if_without_else_completes_when_condition_is_false() {
    let rev = revision(json!([
        {"type": "If", "id": "gate", "condition": "verbose",
         "ifTrue": {"type": "LogTask", "id": "loud", "message": "on"}}
    ]));
    let (engine, journal) = engine_for(rev);

    let execution = engine.execute(&key(), Map::new()).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);

    // Only the If itself is recorded; no branch was taken
    let steps = journal.step_results();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].step_id, "gate");
    assert_eq!(steps[0].status, StepStatus::Completed);
}

#[tokio::test]
async fn equality_condition_routes_on_parameter_value() {
    let rev = revision(json!([
        {"type": "If", "id": "gate", "condition": "${env} == 'prod'",
         "ifTrue": {"type": "LogTask", "id": "prod", "message": "prod"},
         "ifFalse": {"type": "LogTask", "id": "dev", "message": "dev"}}
    ]));

    let (engine, journal) = engine_for(rev.clone());
    engine
        .execute(&key(), params(&[("env", json!("prod"))]))
        .await
        .unwrap();
    assert!(journal.step_results().iter().any(|s| s.step_id == "prod"));

    let (engine, journal) = engine_for(rev);
    engine
        .execute(&key(), params(&[("env", json!("staging"))]))
        .await
        .unwrap();
    assert!(journal.step_results().iter().any(|s| s.step_id == "dev"));
}

#[tokio::test]
async fn step_outputs_flow_through_the_context() {
    let rev = revision(json!([
        {"type": "EchoTask", "id": "echo", "parameter": "user"}
    ]));
    let (engine, journal) = engine_for(rev);

    engine
        .execute(&key(), params(&[("user", json!("ada"))]))
        .await
        .unwrap();

    let steps = journal.step_results();
    assert_eq!(steps[0].output_data, Some(json!({"echoed": "ada"})));
    assert_eq!(steps[0].input_data, Some(json!({"parameter": "user"})));
}

#[tokio::test]
async fn input_parameters_are_recorded_on_the_execution() {
    let rev = revision(json!([{"type": "LogTask", "message": "hi"}]));
    let (engine, _) = engine_for(rev);

    let execution = engine
        .execute(&key(), params(&[("n", json!(42))]))
        .await
        .unwrap();
    assert_eq!(execution.input_parameters.get("n"), Some(&json!(42)));
    assert_eq!(execution.revision_id, key());
}

#[tokio::test]
async fn empty_workflow_completes_trivially() {
    let rev = revision(json!([]));
    let (engine, journal) = engine_for(rev);

    let execution = engine.execute(&key(), Map::new()).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(journal.step_results().is_empty());
}
