// Core workflow domain: step model, parameter types, document parsing, validation.
// No I/O lives here - persistence and transport are separate crates that depend
// on the types and traits defined in this one.

pub mod condition;
pub mod context;
pub mod document;
pub mod error;
pub mod execution;
pub mod executor;
pub mod ids;
pub mod params;
pub mod revision;
pub mod source_patch;
pub mod step;
pub mod validator;

pub use context::ExecutionContext;
pub use error::{InvalidParam, Result, StepflowError};
pub use execution::{ErrorInfo, ExecutionStatus, ExecutionStepResult, StepStatus, WorkflowExecution};
pub use executor::{StepExecutor, StepOutcome};
pub use ids::{WorkflowId, WorkflowRevisionId};
pub use params::{ParameterType, ParameterTypeRegistry};
pub use revision::{ParameterDefinition, WorkflowRevision, WorkflowRevisionWithSource};
pub use step::{CustomStep, IfStep, LogStep, SequenceStep, Step, StepHandler, StepTypeRegistry};
pub use validator::{validate_parameters, ValidationOutcome};
