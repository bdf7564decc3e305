// Workflow document parsing and serialization.
//
// Documents are authored in YAML (JSON parses through the same path). Parsing
// produces a WorkflowRevision; serialization produces a canonical document
// that parses back to an equal revision. The stored source text is never
// regenerated from the model - see source_patch for the metadata surgery.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Result, StepflowError};
use crate::params::ParameterTypeRegistry;
use crate::revision::{ParameterDefinition, WorkflowRevision};
use crate::step::StepTypeRegistry;

/// Parse a YAML or JSON workflow document into a revision.
///
/// Enforces document shape only; use `parse_and_validate` to also enforce the
/// domain invariants on the result.
pub fn parse_document(text: &str, steps: &StepTypeRegistry) -> Result<WorkflowRevision> {
    let value: Value = serde_yaml::from_str(text)
        .map_err(|e| StepflowError::Parse(format!("invalid document: {e}")))?;
    let fields = value
        .as_object()
        .ok_or_else(|| StepflowError::Parse("document must be a mapping".to_string()))?;

    let namespace = required_str(fields, "namespace")?;
    let id = required_str(fields, "id")?;
    let name = required_str(fields, "name")?;
    let description = required_str(fields, "description")?;

    let version = match fields.get("version") {
        None | Some(Value::Null) => 0,
        Some(value) => {
            let version = value.as_i64().ok_or_else(|| {
                StepflowError::Parse(format!("'version' must be an integer, got {value}"))
            })?;
            if version < 1 || version > i32::MAX as i64 {
                return Err(StepflowError::Parse(format!(
                    "'version' must be a positive integer, got {version}"
                )));
            }
            version as i32
        }
    };

    let active = match fields.get("active") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(StepflowError::Parse(format!(
                "'active' must be a boolean, got {other}"
            )))
        }
    };

    let parameters: Vec<ParameterDefinition> = match fields.get("parameters") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| StepflowError::Parse(format!("invalid parameters: {e}")))?,
    };

    let steps_value = fields
        .get("steps")
        .ok_or_else(|| StepflowError::Parse("document is missing 'steps'".to_string()))?;
    let steps = steps.decode_steps(steps_value)?;

    Ok(WorkflowRevision {
        namespace,
        id,
        version,
        name,
        description,
        parameters,
        steps,
        active,
        created_at: optional_timestamp(fields, "createdAt")?,
        updated_at: optional_timestamp(fields, "updatedAt")?,
    })
}

/// Parse a document and enforce the domain invariants on the result.
/// Violations are aggregated into a single `InvalidRevision` error.
pub fn parse_and_validate(
    text: &str,
    steps: &StepTypeRegistry,
    types: &ParameterTypeRegistry,
) -> Result<WorkflowRevision> {
    let revision = parse_document(text, steps)?;
    revision.validate(types)?;
    Ok(revision)
}

/// Encode a revision as a JSON value in document shape
pub fn revision_to_value(revision: &WorkflowRevision) -> Value {
    let mut fields = serde_json::Map::new();
    fields.insert("namespace".to_string(), Value::from(revision.namespace.clone()));
    fields.insert("id".to_string(), Value::from(revision.id.clone()));
    if revision.version > 0 {
        fields.insert("version".to_string(), Value::from(revision.version));
    }
    fields.insert("name".to_string(), Value::from(revision.name.clone()));
    fields.insert(
        "description".to_string(),
        Value::from(revision.description.clone()),
    );
    fields.insert("active".to_string(), Value::from(revision.active));
    if let Some(created_at) = revision.created_at {
        fields.insert("createdAt".to_string(), Value::from(created_at.to_rfc3339()));
    }
    if let Some(updated_at) = revision.updated_at {
        fields.insert("updatedAt".to_string(), Value::from(updated_at.to_rfc3339()));
    }
    if !revision.parameters.is_empty() {
        // ParameterDefinition serialization is infallible: plain fields only
        if let Ok(params) = serde_json::to_value(&revision.parameters) {
            fields.insert("parameters".to_string(), params);
        }
    }
    fields.insert(
        "steps".to_string(),
        Value::Array(revision.steps.iter().map(|s| s.to_value()).collect()),
    );
    Value::Object(fields)
}

/// Serialize a revision to a YAML document, keys in authoring order
pub fn serialize_revision(revision: &WorkflowRevision) -> Result<String> {
    let value = revision_to_value(revision);
    let fields = match &value {
        Value::Object(fields) => fields,
        _ => unreachable!("revision_to_value always returns a mapping"),
    };

    let order = [
        "namespace",
        "id",
        "version",
        "name",
        "description",
        "active",
        "createdAt",
        "updatedAt",
        "parameters",
        "steps",
    ];
    let mut mapping = serde_yaml::Mapping::new();
    for key in order {
        if let Some(field) = fields.get(key) {
            let yaml = serde_yaml::to_value(field).context("converting document field")?;
            mapping.insert(serde_yaml::Value::String(key.to_string()), yaml);
        }
    }

    let text = serde_yaml::to_string(&serde_yaml::Value::Mapping(mapping))
        .context("serializing document")?;
    Ok(text)
}

fn required_str(fields: &serde_json::Map<String, Value>, key: &str) -> Result<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StepflowError::Parse(format!("document is missing string field '{key}'")))
}

fn optional_timestamp(
    fields: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<DateTime<Utc>>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| StepflowError::Parse(format!("'{key}' is not a valid timestamp: {e}"))),
        Some(other) => Err(StepflowError::Parse(format!(
            "'{key}' must be an RFC 3339 string, got {other}"
        ))),
    }
}
