// Step model and the step-type registry.
//
// The step tree is a closed sum type: composites own their children by value,
// so the tree is finite and acyclic by construction. Extension step kinds
// registered at startup decode into the Custom variant and execute through
// their registered handler; built-ins decode into typed variants. Wire
// encoding is type-tagged: every step object carries a `type` discriminator.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::condition;
use crate::context::ExecutionContext;
use crate::error::{Result, StepflowError};
use crate::execution::StepStatus;
use crate::executor::{StepExecutor, StepOutcome};

pub const TYPE_SEQUENCE: &str = "Sequence";
pub const TYPE_IF: &str = "If";
pub const TYPE_LOG_TASK: &str = "LogTask";

// ============================================================================
// Step variants
// ============================================================================

/// Composite that runs its children in order, stopping on the first failure
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceStep {
    pub id: Option<String>,
    pub steps: Vec<Step>,
}

/// Conditional: runs `if_true` or `if_false` depending on the condition
#[derive(Debug, Clone, PartialEq)]
pub struct IfStep {
    pub id: Option<String>,
    pub condition: String,
    pub if_true: Box<Step>,
    pub if_false: Option<Box<Step>>,
}

/// Leaf task that emits a message to the logging sink
#[derive(Debug, Clone, PartialEq)]
pub struct LogStep {
    pub id: Option<String>,
    pub message: String,
}

/// Leaf task of a registered extension kind; `config` holds its raw
/// variant-specific fields so the authored document survives a round-trip
#[derive(Debug, Clone, PartialEq)]
pub struct CustomStep {
    pub id: Option<String>,
    pub step_type: String,
    pub config: Map<String, Value>,
}

/// A node in the workflow tree: either orchestrates children or performs work
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Sequence(SequenceStep),
    If(IfStep),
    Log(LogStep),
    Custom(CustomStep),
}

impl Step {
    /// Wire discriminator for this step
    pub fn type_name(&self) -> &str {
        match self {
            Step::Sequence(_) => TYPE_SEQUENCE,
            Step::If(_) => TYPE_IF,
            Step::Log(_) => TYPE_LOG_TASK,
            Step::Custom(step) => &step.step_type,
        }
    }

    /// Declared step id, if the author provided one
    pub fn declared_id(&self) -> Option<&str> {
        match self {
            Step::Sequence(step) => step.id.as_deref(),
            Step::If(step) => step.id.as_deref(),
            Step::Log(step) => step.id.as_deref(),
            Step::Custom(step) => step.id.as_deref(),
        }
    }

    /// Id recorded in the execution trace: the declared id, or the type name
    /// for anonymous steps
    pub fn effective_id(&self) -> &str {
        self.declared_id().unwrap_or_else(|| self.type_name())
    }

    /// Snapshot of the step's own configuration, persisted as the step
    /// result's input data. Composites carry none; their children have rows
    /// of their own.
    pub fn input_snapshot(&self) -> Option<Value> {
        match self {
            Step::Sequence(_) | Step::If(_) => None,
            Step::Log(step) => Some(json!({ "message": step.message })),
            Step::Custom(step) => Some(Value::Object(step.config.clone())),
        }
    }

    /// Depth of the tree rooted at this step
    pub fn depth(&self) -> usize {
        match self {
            Step::Sequence(step) => {
                1 + step.steps.iter().map(Step::depth).max().unwrap_or(0)
            }
            Step::If(step) => {
                let true_depth = step.if_true.depth();
                let false_depth = step.if_false.as_deref().map(Step::depth).unwrap_or(0);
                1 + true_depth.max(false_depth)
            }
            Step::Log(_) | Step::Custom(_) => 1,
        }
    }

    /// Encode this step as a type-tagged JSON value
    pub fn to_value(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("type".to_string(), json!(self.type_name()));
        if let Some(id) = self.declared_id() {
            fields.insert("id".to_string(), json!(id));
        }
        match self {
            Step::Sequence(step) => {
                let children: Vec<Value> = step.steps.iter().map(Step::to_value).collect();
                fields.insert("steps".to_string(), Value::Array(children));
            }
            Step::If(step) => {
                fields.insert("condition".to_string(), json!(step.condition));
                fields.insert("ifTrue".to_string(), step.if_true.to_value());
                if let Some(if_false) = &step.if_false {
                    fields.insert("ifFalse".to_string(), if_false.to_value());
                }
            }
            Step::Log(step) => {
                fields.insert("message".to_string(), json!(step.message));
            }
            Step::Custom(step) => {
                for (key, value) in &step.config {
                    fields.insert(key.clone(), value.clone());
                }
            }
        }
        Value::Object(fields)
    }

    /// Execute this step, delegating children to the executor so every step
    /// in the tree is checkpointed
    pub async fn execute(
        &self,
        ctx: ExecutionContext,
        exec: &mut dyn StepExecutor,
    ) -> Result<StepOutcome> {
        match self {
            Step::Sequence(step) => {
                let (status, next) = exec.execute_sequence(&step.steps, ctx).await?;
                if status == StepStatus::Failed {
                    Ok(StepOutcome::failed(next, "sequence aborted on failed step"))
                } else {
                    Ok(StepOutcome::completed(next, None))
                }
            }
            Step::If(step) => {
                let branch = if condition::evaluate(&step.condition, &ctx) {
                    Some(step.if_true.as_ref())
                } else {
                    step.if_false.as_deref()
                };
                match branch {
                    Some(child) => {
                        let (status, next) = exec.execute_and_persist(child, ctx).await?;
                        if status == StepStatus::Failed {
                            Ok(StepOutcome::failed(next, "selected branch failed"))
                        } else {
                            Ok(StepOutcome::completed(next, None))
                        }
                    }
                    None => Ok(StepOutcome::completed(ctx, None)),
                }
            }
            Step::Log(step) => {
                tracing::info!(
                    target: "stepflow::workflow",
                    step_id = %self.effective_id(),
                    "{}",
                    step.message
                );
                let output = json!({ "message": step.message });
                let next = ctx.with_step_output(self.effective_id(), output.clone());
                Ok(StepOutcome::completed(next, Some(output)))
            }
            Step::Custom(step) => {
                let handler = exec.step_handler(&step.step_type).ok_or_else(|| {
                    StepflowError::StepExecutionFailure(format!(
                        "no handler registered for step type '{}'",
                        step.step_type
                    ))
                })?;
                let output = handler.execute(step, &ctx).await?;
                let next = match &output {
                    Some(value) => ctx.with_step_output(self.effective_id(), value.clone()),
                    None => ctx,
                };
                Ok(StepOutcome::completed(next, output))
            }
        }
    }
}

// ============================================================================
// Extension handlers
// ============================================================================

/// Work performed by an extension step kind.
///
/// Handlers are registered once at startup and shared across executions, so
/// they hold no per-run state; everything a run needs arrives via the step
/// config and the execution context.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Wire discriminator this handler serves
    fn type_name(&self) -> &str;

    /// Perform the step's work, returning its output value (recorded in the
    /// trace and in the context under the step's id)
    async fn execute(&self, step: &CustomStep, ctx: &ExecutionContext) -> Result<Option<Value>>;
}

// ============================================================================
// Registry
// ============================================================================

type BuiltinDecoder = fn(&Map<String, Value>, &StepTypeRegistry) -> Result<Step>;

#[derive(Clone)]
enum StepTypeEntry {
    Builtin(BuiltinDecoder),
    Extension(Arc<dyn StepHandler>),
}

/// Process-wide mapping from step type name to decoder (and, for extensions,
/// handler). Populated at startup from the built-in list plus discovered
/// plugins; read-only afterwards. Registration is idempotent: duplicates are
/// logged and the first registration wins.
#[derive(Clone)]
pub struct StepTypeRegistry {
    entries: HashMap<String, StepTypeEntry>,
}

impl StepTypeRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry with Sequence, If, and LogTask registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtin(TYPE_SEQUENCE, decode_sequence);
        registry.register_builtin(TYPE_IF, decode_if);
        registry.register_builtin(TYPE_LOG_TASK, decode_log);
        registry
    }

    fn register_builtin(&mut self, type_name: &str, decoder: BuiltinDecoder) {
        if self.entries.contains_key(type_name) {
            tracing::warn!(type_name = %type_name, "duplicate step type registration ignored");
            return;
        }
        self.entries
            .insert(type_name.to_string(), StepTypeEntry::Builtin(decoder));
    }

    /// Register an extension step kind by its handler
    pub fn register_handler(&mut self, handler: Arc<dyn StepHandler>) {
        let type_name = handler.type_name().to_string();
        if self.entries.contains_key(&type_name) {
            tracing::warn!(type_name = %type_name, "duplicate step type registration ignored");
            return;
        }
        self.entries
            .insert(type_name, StepTypeEntry::Extension(handler));
    }

    pub fn has(&self, type_name: &str) -> bool {
        self.entries.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handler for an extension step type, if one is registered
    pub fn handler(&self, type_name: &str) -> Option<Arc<dyn StepHandler>> {
        match self.entries.get(type_name) {
            Some(StepTypeEntry::Extension(handler)) => Some(handler.clone()),
            _ => None,
        }
    }

    /// Decode one type-tagged step object
    pub fn decode_step(&self, value: &Value) -> Result<Step> {
        let fields = value
            .as_object()
            .ok_or_else(|| StepflowError::Parse("step must be a mapping".to_string()))?;
        let type_name = fields
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| StepflowError::Parse("step is missing its 'type' field".to_string()))?;

        match self.entries.get(type_name) {
            Some(StepTypeEntry::Builtin(decoder)) => decoder(fields, self),
            Some(StepTypeEntry::Extension(_)) => {
                let id = decode_step_id(fields)?;
                let mut config = fields.clone();
                config.remove("type");
                config.remove("id");
                Ok(Step::Custom(CustomStep {
                    id,
                    step_type: type_name.to_string(),
                    config,
                }))
            }
            None => Err(StepflowError::Parse(format!(
                "unknown step type '{type_name}'"
            ))),
        }
    }

    /// Decode a list of step objects
    pub fn decode_steps(&self, value: &Value) -> Result<Vec<Step>> {
        let items = value
            .as_array()
            .ok_or_else(|| StepflowError::Parse("'steps' must be a list".to_string()))?;
        items.iter().map(|item| self.decode_step(item)).collect()
    }
}

impl Default for StepTypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for StepTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.entries.keys().collect();
        f.debug_struct("StepTypeRegistry")
            .field("types", &names)
            .finish()
    }
}

// ============================================================================
// Built-in decoders
// ============================================================================

fn decode_step_id(fields: &Map<String, Value>) -> Result<Option<String>> {
    match fields.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(id.clone())),
        Some(other) => Err(StepflowError::Parse(format!(
            "step 'id' must be a string, got {other}"
        ))),
    }
}

fn required_str<'a>(fields: &'a Map<String, Value>, key: &str, type_name: &str) -> Result<&'a str> {
    fields.get(key).and_then(Value::as_str).ok_or_else(|| {
        StepflowError::Parse(format!("{type_name} step requires a string '{key}' field"))
    })
}

fn decode_sequence(fields: &Map<String, Value>, registry: &StepTypeRegistry) -> Result<Step> {
    let steps_value = fields.get("steps").ok_or_else(|| {
        StepflowError::Parse("Sequence step requires a 'steps' field".to_string())
    })?;
    Ok(Step::Sequence(SequenceStep {
        id: decode_step_id(fields)?,
        steps: registry.decode_steps(steps_value)?,
    }))
}

fn decode_if(fields: &Map<String, Value>, registry: &StepTypeRegistry) -> Result<Step> {
    let condition = required_str(fields, "condition", TYPE_IF)?.to_string();
    let if_true_value = fields
        .get("ifTrue")
        .ok_or_else(|| StepflowError::Parse("If step requires an 'ifTrue' field".to_string()))?;
    let if_false = match fields.get("ifFalse") {
        None | Some(Value::Null) => None,
        Some(value) => Some(Box::new(registry.decode_step(value)?)),
    };
    Ok(Step::If(IfStep {
        id: decode_step_id(fields)?,
        condition,
        if_true: Box::new(registry.decode_step(if_true_value)?),
        if_false,
    }))
}

fn decode_log(fields: &Map<String, Value>, _registry: &StepTypeRegistry) -> Result<Step> {
    Ok(Step::Log(LogStep {
        id: decode_step_id(fields)?,
        message: required_str(fields, "message", TYPE_LOG_TASK)?.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl StepHandler for NoopHandler {
        fn type_name(&self) -> &str {
            "NoopTask"
        }
        async fn execute(&self, _: &CustomStep, _: &ExecutionContext) -> Result<Option<Value>> {
            Ok(None)
        }
    }

    #[test]
    fn builtins_are_registered() {
        let registry = StepTypeRegistry::with_builtins();
        assert!(registry.has(TYPE_SEQUENCE));
        assert!(registry.has(TYPE_IF));
        assert!(registry.has(TYPE_LOG_TASK));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        struct ShadowSequence;
        #[async_trait]
        impl StepHandler for ShadowSequence {
            fn type_name(&self) -> &str {
                TYPE_SEQUENCE
            }
            async fn execute(&self, _: &CustomStep, _: &ExecutionContext) -> Result<Option<Value>> {
                Ok(None)
            }
        }

        let mut registry = StepTypeRegistry::with_builtins();
        registry.register_handler(Arc::new(ShadowSequence));
        assert_eq!(registry.len(), 3);
        // Sequence still decodes as the builtin composite
        let decoded = registry
            .decode_step(&json!({"type": "Sequence", "steps": []}))
            .unwrap();
        assert!(matches!(decoded, Step::Sequence(_)));
    }

    #[test]
    fn decode_log_task() {
        let registry = StepTypeRegistry::with_builtins();
        let step = registry
            .decode_step(&json!({"type": "LogTask", "message": "hi"}))
            .unwrap();
        assert_eq!(
            step,
            Step::Log(LogStep {
                id: None,
                message: "hi".to_string()
            })
        );
        assert_eq!(step.effective_id(), "LogTask");
    }

    #[test]
    fn decode_nested_composites() {
        let registry = StepTypeRegistry::with_builtins();
        let step = registry
            .decode_step(&json!({
                "type": "Sequence",
                "id": "outer",
                "steps": [
                    {"type": "LogTask", "id": "greet", "message": "hello"},
                    {
                        "type": "If",
                        "condition": "verbose",
                        "ifTrue": {"type": "LogTask", "message": "details"}
                    }
                ]
            }))
            .unwrap();

        assert_eq!(step.effective_id(), "outer");
        assert_eq!(step.depth(), 3);
        match &step {
            Step::Sequence(seq) => {
                assert_eq!(seq.steps.len(), 2);
                assert_eq!(seq.steps[0].effective_id(), "greet");
                assert!(matches!(seq.steps[1], Step::If(_)));
            }
            other => panic!("expected sequence, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let registry = StepTypeRegistry::with_builtins();
        let err = registry
            .decode_step(&json!({"type": "HttpTask", "url": "http://example.com"}))
            .unwrap_err();
        assert!(err.to_string().contains("unknown step type 'HttpTask'"));
    }

    #[test]
    fn decode_rejects_missing_fields() {
        let registry = StepTypeRegistry::with_builtins();
        assert!(registry.decode_step(&json!({"message": "no type"})).is_err());
        assert!(registry.decode_step(&json!({"type": "LogTask"})).is_err());
        assert!(registry
            .decode_step(&json!({"type": "If", "condition": "x"}))
            .is_err());
        assert!(registry.decode_step(&json!("not a mapping")).is_err());
    }

    #[test]
    fn extension_steps_round_trip_their_config() {
        let mut registry = StepTypeRegistry::with_builtins();
        registry.register_handler(Arc::new(NoopHandler));

        let encoded = json!({"type": "NoopTask", "id": "n1", "level": 3, "tags": ["a"]});
        let step = registry.decode_step(&encoded).unwrap();
        match &step {
            Step::Custom(custom) => {
                assert_eq!(custom.step_type, "NoopTask");
                assert_eq!(custom.config.get("level"), Some(&json!(3)));
            }
            other => panic!("expected custom step, got {other:?}"),
        }
        assert_eq!(step.to_value(), encoded);
    }

    #[test]
    fn encode_decode_round_trip() {
        let registry = StepTypeRegistry::with_builtins();
        let original = json!({
            "type": "If",
            "id": "gate",
            "condition": "${env} == 'prod'",
            "ifTrue": {"type": "LogTask", "message": "prod"},
            "ifFalse": {"type": "Sequence", "steps": [
                {"type": "LogTask", "message": "not prod"}
            ]}
        });
        let step = registry.decode_step(&original).unwrap();
        let encoded = step.to_value();
        assert_eq!(registry.decode_step(&encoded).unwrap(), step);
        assert_eq!(encoded, original);
    }

    #[test]
    fn input_snapshot_only_for_leaves() {
        let registry = StepTypeRegistry::with_builtins();
        let seq = registry
            .decode_step(&json!({"type": "Sequence", "steps": []}))
            .unwrap();
        let log = registry
            .decode_step(&json!({"type": "LogTask", "message": "hi"}))
            .unwrap();
        assert!(seq.input_snapshot().is_none());
        assert_eq!(log.input_snapshot(), Some(json!({"message": "hi"})));
    }
}
