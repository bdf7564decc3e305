// Execution HTTP routes (JSON)

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use stepflow_core::{
    ids, validate_parameters, ErrorInfo, ExecutionStatus, ExecutionStepResult,
    ParameterTypeRegistry, StepStatus, StepflowError, WorkflowExecution, WorkflowId,
    WorkflowRevisionId,
};
use stepflow_engine::ExecutionEngine;
use stepflow_storage::{execution_store::MAX_PAGE_SIZE, ExecutionStore, RevisionStore};

use crate::problem::ApiError;

/// App state
#[derive(Clone)]
pub struct AppState {
    pub revisions: RevisionStore,
    pub executions: ExecutionStore,
    pub engine: Arc<ExecutionEngine>,
    pub types: Arc<ParameterTypeRegistry>,
}

/// Request to execute a revision
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateExecutionRequest {
    pub namespace: String,
    pub id: String,
    pub version: i32,
    /// Caller-supplied input parameters, validated against the revision's
    /// parameter schema
    #[serde(default)]
    #[schema(value_type = Object)]
    pub parameters: Map<String, Value>,
}

/// Hypermedia links on an execution response
#[derive(Debug, Serialize, ToSchema)]
pub struct ExecutionLinks {
    #[serde(rename = "self")]
    pub self_href: String,
}

/// Response for a started execution
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub revision_id: WorkflowRevisionId,
    #[schema(value_type = Object)]
    pub input_parameters: Map<String, Value>,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "_links")]
    pub links: ExecutionLinks,
}

impl From<&WorkflowExecution> for ExecutionResponse {
    fn from(execution: &WorkflowExecution) -> Self {
        Self {
            execution_id: execution.execution_id.clone(),
            status: execution.status,
            revision_id: execution.revision_id.clone(),
            input_parameters: execution.input_parameters.clone(),
            started_at: execution.started_at,
            links: ExecutionLinks {
                self_href: format!("/api/executions/{}", execution.execution_id),
            },
        }
    }
}

/// One step result in an execution detail response
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepResultResponse {
    pub step_index: i32,
    pub step_id: String,
    pub step_type: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub input_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub output_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorInfo>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl From<ExecutionStepResult> for StepResultResponse {
    fn from(result: ExecutionStepResult) -> Self {
        Self {
            step_index: result.step_index,
            step_id: result.step_id,
            step_type: result.step_type,
            status: result.status,
            input_data: result.input_data,
            output_data: result.output_data,
            error_message: result.error_message,
            error_details: result.error_details,
            started_at: result.started_at,
            completed_at: result.completed_at,
        }
    }
}

/// Full execution detail including the step trace
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDetailResponse {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub revision_id: WorkflowRevisionId,
    #[schema(value_type = Object)]
    pub input_parameters: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub last_updated_at: DateTime<Utc>,
    pub steps: Vec<StepResultResponse>,
}

/// One entry in an execution listing
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub revision_id: WorkflowRevisionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<WorkflowExecution> for ExecutionSummary {
    fn from(execution: WorkflowExecution) -> Self {
        Self {
            execution_id: execution.execution_id,
            status: execution.status,
            revision_id: execution.revision_id,
            error_message: execution.error_message,
            started_at: execution.started_at,
            completed_at: execution.completed_at,
        }
    }
}

/// Paged envelope for execution listings
#[derive(Debug, Serialize, ToSchema)]
pub struct PagedExecutionsResponse {
    pub data: Vec<ExecutionSummary>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Query parameters for listing executions
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListExecutionsParams {
    pub version: Option<i32>,
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

/// Create execution routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/executions", post(create_execution))
        .route("/api/executions/:execution_id", get(get_execution))
        .route(
            "/api/workflows/:namespace/:id/executions",
            get(list_executions),
        )
        .with_state(state)
}

/// POST /api/executions - validate inputs and run a revision
#[utoipa::path(
    post,
    path = "/api/executions",
    request_body = CreateExecutionRequest,
    responses(
        (status = 200, description = "Execution finished", body = ExecutionResponse),
        (status = 400, description = "Parameter validation failed"),
        (status = 404, description = "Revision not found")
    ),
    tag = "executions"
)]
pub async fn create_execution(
    State(state): State<AppState>,
    Json(req): Json<CreateExecutionRequest>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    let key = WorkflowRevisionId::new(req.namespace, req.id, req.version)?;
    let revision = state.revisions.get(&key).await?;

    let outcome = validate_parameters(&req.parameters, &revision.parameters, &state.types);
    if !outcome.is_valid() {
        return Err(StepflowError::ParameterValidation(outcome.errors).into());
    }

    let execution = state.engine.execute(&key, outcome.validated).await?;
    Ok(Json(ExecutionResponse::from(&execution)))
}

/// GET /api/executions/{execution_id} - execution detail with step trace
#[utoipa::path(
    get,
    path = "/api/executions/{execution_id}",
    params(
        ("execution_id" = String, Path, description = "21-char execution id")
    ),
    responses(
        (status = 200, description = "Execution detail", body = ExecutionDetailResponse),
        (status = 400, description = "Malformed execution id"),
        (status = 404, description = "Execution not found")
    ),
    tag = "executions"
)]
pub async fn get_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<ExecutionDetailResponse>, ApiError> {
    if !ids::is_valid_execution_id(&execution_id) {
        return Err(StepflowError::MalformedIdentifier(format!(
            "execution id '{execution_id}' must be 21 chars of [A-Za-z0-9_-]"
        ))
        .into());
    }

    let execution = state
        .executions
        .find_by_id(&execution_id)
        .await?
        .ok_or_else(|| {
            StepflowError::not_found(format!("execution {execution_id} does not exist"))
        })?;
    let steps = state.executions.find_step_results(&execution_id).await?;

    Ok(Json(ExecutionDetailResponse {
        execution_id: execution.execution_id,
        status: execution.status,
        revision_id: execution.revision_id,
        input_parameters: execution.input_parameters,
        error_message: execution.error_message,
        started_at: execution.started_at,
        completed_at: execution.completed_at,
        last_updated_at: execution.last_updated_at,
        steps: steps.into_iter().map(StepResultResponse::from).collect(),
    }))
}

/// GET /api/workflows/{namespace}/{id}/executions - list a workflow's runs
#[utoipa::path(
    get,
    path = "/api/workflows/{namespace}/{id}/executions",
    params(
        ("namespace" = String, Path, description = "Workflow namespace"),
        ("id" = String, Path, description = "Workflow id"),
        ("version" = Option<i32>, Query, description = "Filter by revision version"),
        ("status" = Option<String>, Query, description = "Filter by execution status"),
        ("limit" = Option<i64>, Query, description = "Page size, 1-100 (default 20)"),
        ("offset" = Option<i64>, Query, description = "Page offset")
    ),
    responses(
        (status = 200, description = "Executions newest first", body = PagedExecutionsResponse),
        (status = 400, description = "Malformed filter or pagination")
    ),
    tag = "executions"
)]
pub async fn list_executions(
    State(state): State<AppState>,
    Path((namespace, id)): Path<(String, String)>,
    Query(params): Query<ListExecutionsParams>,
) -> Result<Json<PagedExecutionsResponse>, ApiError> {
    let workflow = WorkflowId::new(namespace, id)?;

    if params.limit < 1 || params.limit > MAX_PAGE_SIZE {
        return Err(StepflowError::MalformedIdentifier(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}, got {}",
            params.limit
        ))
        .into());
    }
    if params.offset < 0 {
        return Err(StepflowError::MalformedIdentifier(format!(
            "offset must not be negative, got {}",
            params.offset
        ))
        .into());
    }

    let status = params
        .status
        .as_deref()
        .map(str::parse::<ExecutionStatus>)
        .transpose()?;

    let executions = state
        .executions
        .find_by_workflow(&workflow, params.version, status, params.limit, params.offset)
        .await?;
    let total = state
        .executions
        .count_by_workflow(&workflow, params.version, status)
        .await?;

    Ok(Json(PagedExecutionsResponse {
        data: executions.into_iter().map(ExecutionSummary::from).collect(),
        total,
        limit: params.limit,
        offset: params.offset,
    }))
}
