// Parameter type system: typed input parameters with coercion rules.
//
// A ParameterType validates a provided value and converts it to its canonical
// form. The registry mirrors the step-type registry: populated once at
// startup, read-only afterwards, first registration wins.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A named parameter type with a validate-and-convert contract.
///
/// `validate_and_convert` returns the canonical value on success, or a
/// human-readable reason on rejection. Reasons become `InvalidParam.reason`
/// at the API boundary, so they are phrased for workflow authors.
pub trait ParameterType: Send + Sync {
    /// Unique type id, e.g. `STRING`
    fn type_id(&self) -> &str;

    /// Validate `value` and return its canonical form
    fn validate_and_convert(&self, value: &Value) -> Result<Value, String>;
}

// ============================================================================
// Built-in types
// ============================================================================

/// STRING: accepts any non-null value as-is
pub struct StringType;

impl ParameterType for StringType {
    fn type_id(&self) -> &str {
        "STRING"
    }

    fn validate_and_convert(&self, value: &Value) -> Result<Value, String> {
        if value.is_null() {
            return Err("must not be null".to_string());
        }
        Ok(value.clone())
    }
}

/// INTEGER: accepts integers and numeric strings; rejects floats outright
/// rather than silently losing precision
pub struct IntegerType;

impl ParameterType for IntegerType {
    fn type_id(&self) -> &str {
        "INTEGER"
    }

    fn validate_and_convert(&self, value: &Value) -> Result<Value, String> {
        match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::Number(_) => Err("must be an integer".to_string()),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| "must be an integer".to_string()),
            _ => Err("must be an integer".to_string()),
        }
    }
}

/// FLOAT: accepts floats, integers (widened), and numeric strings
pub struct FloatType;

impl ParameterType for FloatType {
    fn type_id(&self) -> &str {
        "FLOAT"
    }

    fn validate_and_convert(&self, value: &Value) -> Result<Value, String> {
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        };
        parsed
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| "must be a number".to_string())
    }
}

/// BOOLEAN: accepts booleans and the strings "true"/"false" (case-insensitive,
/// trimmed). Integers 0/1 are rejected.
pub struct BooleanType;

impl ParameterType for BooleanType {
    fn type_id(&self) -> &str {
        "BOOLEAN"
    }

    fn validate_and_convert(&self, value: &Value) -> Result<Value, String> {
        match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.eq_ignore_ascii_case("true") {
                    Ok(Value::Bool(true))
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Ok(Value::Bool(false))
                } else {
                    Err("must be a boolean".to_string())
                }
            }
            _ => Err("must be a boolean".to_string()),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Registry of parameter types, keyed by type id.
///
/// Written once at startup; request handlers only read it. Registration is
/// idempotent: a duplicate type id is logged and the first registration wins.
#[derive(Clone)]
pub struct ParameterTypeRegistry {
    types: HashMap<String, Arc<dyn ParameterType>>,
}

impl ParameterTypeRegistry {
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Registry with STRING, INTEGER, FLOAT, and BOOLEAN registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(StringType));
        registry.register(Arc::new(IntegerType));
        registry.register(Arc::new(FloatType));
        registry.register(Arc::new(BooleanType));
        registry
    }

    pub fn register(&mut self, ty: Arc<dyn ParameterType>) {
        let type_id = ty.type_id().to_string();
        if self.types.contains_key(&type_id) {
            tracing::warn!(type_id = %type_id, "duplicate parameter type registration ignored");
            return;
        }
        self.types.insert(type_id, ty);
    }

    pub fn get(&self, type_id: &str) -> Option<&Arc<dyn ParameterType>> {
        self.types.get(type_id)
    }

    pub fn has(&self, type_id: &str) -> bool {
        self.types.contains_key(type_id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for ParameterTypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ParameterTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<_> = self.types.keys().collect();
        f.debug_struct("ParameterTypeRegistry")
            .field("types", &ids)
            .finish()
    }
}
