// Immutable execution context threaded through a run

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Carrier of input parameters and accumulated step outputs.
///
/// Contexts are never mutated in place: `with_step_output` produces a new
/// context, so a composite that aborts mid-walk still holds the last good one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    input_parameters: Map<String, Value>,
    step_outputs: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(input_parameters: Map<String, Value>) -> Self {
        Self {
            input_parameters,
            step_outputs: Map::new(),
        }
    }

    pub fn input_parameters(&self) -> &Map<String, Value> {
        &self.input_parameters
    }

    pub fn step_outputs(&self) -> &Map<String, Value> {
        &self.step_outputs
    }

    /// Look up an input parameter by name
    pub fn input(&self, name: &str) -> Option<&Value> {
        self.input_parameters.get(name)
    }

    /// Look up a recorded step output by step id
    pub fn step_output(&self, step_id: &str) -> Option<&Value> {
        self.step_outputs.get(step_id)
    }

    /// Produce a new context with one more step output recorded
    pub fn with_step_output(&self, step_id: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.step_outputs.insert(step_id.into(), value);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("user".to_string(), json!("ada"));
        m
    }

    #[test]
    fn with_step_output_leaves_original_untouched() {
        let ctx = ExecutionContext::new(params());
        let next = ctx.with_step_output("greet", json!({"message": "hi"}));

        assert!(ctx.step_output("greet").is_none());
        assert_eq!(next.step_output("greet"), Some(&json!({"message": "hi"})));
        assert_eq!(next.input("user"), Some(&json!("ada")));
    }

    #[test]
    fn outputs_accumulate_across_derivations() {
        let ctx = ExecutionContext::new(Map::new())
            .with_step_output("a", json!(1))
            .with_step_output("b", json!(2));
        assert_eq!(ctx.step_outputs().len(), 2);
    }
}
