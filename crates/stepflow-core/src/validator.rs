// Input parameter validation against a revision's parameter schema.
//
// Validation never short-circuits: every missing, unknown, and type error in
// the input is collected before returning. Parameter values never reach the
// logs here - only names and counts.

use serde_json::{Map, Value};

use crate::error::InvalidParam;
use crate::params::ParameterTypeRegistry;
use crate::revision::ParameterDefinition;

/// Result of validating provided parameters against a schema
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub errors: Vec<InvalidParam>,
    pub validated: Map<String, Value>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate and canonicalize provided parameters.
///
/// For each schema entry the provided value is converted through its
/// parameter type; absent required parameters are errors, and absent optional
/// parameters with defaults resolve to the default. Provided keys not in the
/// schema are rejected as unknown.
pub fn validate_parameters(
    provided: &Map<String, Value>,
    schema: &[ParameterDefinition],
    types: &ParameterTypeRegistry,
) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    for def in schema {
        match provided.get(&def.name) {
            Some(value) => match types.get(&def.param_type) {
                Some(ty) => match ty.validate_and_convert(value) {
                    Ok(canonical) => {
                        outcome.validated.insert(def.name.clone(), canonical);
                    }
                    Err(reason) => {
                        outcome
                            .errors
                            .push(InvalidParam::new(&def.name, reason, Some(value.clone())));
                    }
                },
                None => {
                    outcome.errors.push(InvalidParam::new(
                        &def.name,
                        format!("unknown parameter type '{}'", def.param_type),
                        Some(value.clone()),
                    ));
                }
            },
            None if def.required => {
                outcome.errors.push(InvalidParam::new(
                    &def.name,
                    "required parameter missing",
                    None,
                ));
            }
            None => {
                if let Some(default) = &def.default {
                    outcome.validated.insert(def.name.clone(), default.clone());
                }
            }
        }
    }

    for (name, value) in provided {
        if !schema.iter().any(|def| def.name == *name) {
            outcome.errors.push(InvalidParam::new(
                name,
                "unknown parameter",
                Some(value.clone()),
            ));
        }
    }

    tracing::debug!(
        parameter_count = provided.len(),
        error_count = outcome.errors.len(),
        "validated input parameters"
    );

    outcome
}
