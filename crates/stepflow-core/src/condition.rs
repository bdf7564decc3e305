// Condition language for If steps.
//
// Deliberately small: a bare input parameter name evaluated for truthiness,
// or the equality form `${name} == 'literal'` comparing string
// representations. Unknown names evaluate to falsy.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::context::ExecutionContext;

static EQUALITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$\{([A-Za-z0-9_-]+)\}\s*==\s*'([^']*)'$").expect("equality pattern compiles")
});

/// Evaluate a condition string against the execution context
pub fn evaluate(condition: &str, ctx: &ExecutionContext) -> bool {
    let condition = condition.trim();

    if let Some(captures) = EQUALITY.captures(condition) {
        let name = &captures[1];
        let literal = &captures[2];
        return match ctx.input(name) {
            Some(value) => string_repr(value) == literal,
            None => false,
        };
    }

    match ctx.input(condition) {
        Some(value) => is_truthy(value),
        None => false,
    }
}

/// Truthiness of a parameter value.
///
/// Strings "true"/"1"/"yes"/"on" (case-insensitive, trimmed) are truthy and
/// "false"/"0"/"no"/"off" falsy; numeric zero is falsy; otherwise any
/// non-null, non-empty value is truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return false;
            }
            let lowered = trimmed.to_ascii_lowercase();
            match lowered.as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                _ => true,
            }
        }
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

/// String representation used by the equality form
fn string_repr(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
