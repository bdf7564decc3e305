// Workflow lifecycle HTTP routes (YAML in/out)

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use stepflow_core::document::{parse_and_validate, revision_to_value};
use stepflow_core::{
    ParameterTypeRegistry, StepTypeRegistry, StepflowError, WorkflowId, WorkflowRevisionId,
    WorkflowRevisionWithSource,
};
use stepflow_storage::RevisionStore;

use crate::problem::ApiError;
use crate::yaml::{require_document_content_type, to_yaml_response, CreatedYaml, YamlSource};

/// Optimistic-lock token header for activate/deactivate
pub const CURRENT_UPDATED_AT: &str = "X-Current-Updated-At";

/// App state
#[derive(Clone)]
pub struct AppState {
    pub revisions: RevisionStore,
    pub steps: Arc<StepTypeRegistry>,
    pub types: Arc<ParameterTypeRegistry>,
}

/// Query parameters for listing revisions
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListRevisionsParams {
    /// When set, only revisions with this active flag are returned
    pub active: Option<bool>,
}

/// Query parameters for listing workflows
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListWorkflowsParams {
    pub namespace: Option<String>,
}

/// Create workflow routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/workflows", post(create_workflow).get(list_workflows))
        .route(
            "/api/workflows/:namespace/:id",
            post(create_next_revision)
                .get(list_revisions)
                .delete(delete_workflow),
        )
        .route(
            "/api/workflows/:namespace/:id/:version",
            get(get_revision).put(update_revision).delete(delete_revision),
        )
        .route(
            "/api/workflows/:namespace/:id/:version/activate",
            post(activate_revision),
        )
        .route(
            "/api/workflows/:namespace/:id/:version/deactivate",
            post(deactivate_revision),
        )
        .with_state(state)
}

fn parse_incoming(
    state: &AppState,
    body: String,
) -> Result<WorkflowRevisionWithSource, ApiError> {
    let revision = parse_and_validate(&body, &state.steps, &state.types)?;
    Ok(WorkflowRevisionWithSource {
        revision,
        source: body,
    })
}

fn revision_location(key: &WorkflowRevisionId) -> String {
    format!(
        "/api/workflows/{}/{}/{}",
        key.namespace, key.id, key.version
    )
}

fn current_updated_at(headers: &HeaderMap) -> Result<DateTime<Utc>, ApiError> {
    let raw = headers
        .get(CURRENT_UPDATED_AT)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ApiError(StepflowError::Parse(format!(
                "missing required header '{CURRENT_UPDATED_AT}'"
            )))
        })?;
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            ApiError(StepflowError::Parse(format!(
                "invalid '{CURRENT_UPDATED_AT}' header: {e}"
            )))
        })
}

/// POST /api/workflows - create the first revision of a new workflow
#[utoipa::path(
    post,
    path = "/api/workflows",
    request_body(content = String, content_type = "application/yaml", description = "Workflow document"),
    responses(
        (status = 201, description = "First revision stored as version 1", body = String, content_type = "application/yaml"),
        (status = 400, description = "Malformed or invalid document"),
        (status = 409, description = "Workflow already exists")
    ),
    tag = "workflows"
)]
pub async fn create_workflow(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<CreatedYaml, ApiError> {
    require_document_content_type(&headers)?;
    let incoming = parse_incoming(&state, body)?;
    let stored = state.revisions.save_first(&incoming).await?;

    let key = stored
        .revision
        .revision_id()
        .ok_or_else(|| StepflowError::Internal(anyhow::anyhow!("stored revision has no version")))?;
    Ok(CreatedYaml {
        location: revision_location(&key),
        source: stored.source,
    })
}

/// POST /api/workflows/{namespace}/{id} - create the next revision
#[utoipa::path(
    post,
    path = "/api/workflows/{namespace}/{id}",
    params(
        ("namespace" = String, Path, description = "Workflow namespace"),
        ("id" = String, Path, description = "Workflow id")
    ),
    request_body(content = String, content_type = "application/yaml", description = "Workflow document"),
    responses(
        (status = 201, description = "Next revision stored", body = String, content_type = "application/yaml"),
        (status = 400, description = "Malformed or invalid document"),
        (status = 404, description = "Workflow does not exist")
    ),
    tag = "workflows"
)]
pub async fn create_next_revision(
    State(state): State<AppState>,
    Path((namespace, id)): Path<(String, String)>,
    headers: HeaderMap,
    body: String,
) -> Result<CreatedYaml, ApiError> {
    require_document_content_type(&headers)?;
    let workflow = WorkflowId::new(namespace, id)?;
    let incoming = parse_incoming(&state, body)?;
    if incoming.revision.namespace != workflow.namespace || incoming.revision.id != workflow.id {
        return Err(StepflowError::InvalidRevision(vec![format!(
            "document identity {}/{} does not match the request path {workflow}",
            incoming.revision.namespace, incoming.revision.id
        )])
        .into());
    }

    let stored = state.revisions.save_next(&workflow, &incoming).await?;
    let key = stored
        .revision
        .revision_id()
        .ok_or_else(|| StepflowError::Internal(anyhow::anyhow!("stored revision has no version")))?;
    Ok(CreatedYaml {
        location: revision_location(&key),
        source: stored.source,
    })
}

/// GET /api/workflows/{namespace}/{id}/{version} - fetch one revision
#[utoipa::path(
    get,
    path = "/api/workflows/{namespace}/{id}/{version}",
    params(
        ("namespace" = String, Path, description = "Workflow namespace"),
        ("id" = String, Path, description = "Workflow id"),
        ("version" = i32, Path, description = "Revision version")
    ),
    responses(
        (status = 200, description = "Revision source", body = String, content_type = "application/yaml"),
        (status = 404, description = "Revision not found")
    ),
    tag = "workflows"
)]
pub async fn get_revision(
    State(state): State<AppState>,
    Path((namespace, id, version)): Path<(String, String, i32)>,
) -> Result<YamlSource, ApiError> {
    let key = WorkflowRevisionId::new(namespace, id, version)?;
    let stored = state.revisions.get_with_source(&key).await?;
    Ok(YamlSource(stored.source))
}

/// GET /api/workflows/{namespace}/{id} - list revisions
#[utoipa::path(
    get,
    path = "/api/workflows/{namespace}/{id}",
    params(
        ("namespace" = String, Path, description = "Workflow namespace"),
        ("id" = String, Path, description = "Workflow id"),
        ("active" = Option<bool>, Query, description = "Filter on the active flag")
    ),
    responses(
        (status = 200, description = "Revisions ordered by version", content_type = "application/yaml"),
        (status = 404, description = "No active revisions match the filter")
    ),
    tag = "workflows"
)]
pub async fn list_revisions(
    State(state): State<AppState>,
    Path((namespace, id)): Path<(String, String)>,
    Query(params): Query<ListRevisionsParams>,
) -> Result<YamlSource, ApiError> {
    let workflow = WorkflowId::new(namespace, id)?;
    let revisions = state
        .revisions
        .list_by_workflow(&workflow, params.active)
        .await?;
    let documents: Vec<serde_json::Value> = revisions.iter().map(revision_to_value).collect();
    to_yaml_response(&documents)
}

/// GET /api/workflows?namespace= - list workflows in a namespace
#[utoipa::path(
    get,
    path = "/api/workflows",
    params(
        ("namespace" = String, Query, description = "Namespace to list")
    ),
    responses(
        (status = 200, description = "Distinct workflows", content_type = "application/yaml"),
        (status = 400, description = "Missing namespace")
    ),
    tag = "workflows"
)]
pub async fn list_workflows(
    State(state): State<AppState>,
    Query(params): Query<ListWorkflowsParams>,
) -> Result<YamlSource, ApiError> {
    let namespace = params.namespace.ok_or_else(|| {
        ApiError(StepflowError::MalformedIdentifier(
            "query parameter 'namespace' is required".to_string(),
        ))
    })?;
    let workflows = state.revisions.list_workflows(&namespace).await?;
    to_yaml_response(&workflows)
}

/// PUT /api/workflows/{namespace}/{id}/{version} - replace an inactive revision
#[utoipa::path(
    put,
    path = "/api/workflows/{namespace}/{id}/{version}",
    params(
        ("namespace" = String, Path, description = "Workflow namespace"),
        ("id" = String, Path, description = "Workflow id"),
        ("version" = i32, Path, description = "Revision version")
    ),
    request_body(content = String, content_type = "application/yaml", description = "Replacement workflow document"),
    responses(
        (status = 200, description = "Revision updated", body = String, content_type = "application/yaml"),
        (status = 400, description = "Malformed or invalid document"),
        (status = 404, description = "Revision not found"),
        (status = 409, description = "Revision is active")
    ),
    tag = "workflows"
)]
pub async fn update_revision(
    State(state): State<AppState>,
    Path((namespace, id, version)): Path<(String, String, i32)>,
    headers: HeaderMap,
    body: String,
) -> Result<YamlSource, ApiError> {
    require_document_content_type(&headers)?;
    let key = WorkflowRevisionId::new(namespace, id, version)?;
    let mut incoming = parse_incoming(&state, body)?;

    if incoming.revision.namespace != key.namespace || incoming.revision.id != key.id {
        return Err(StepflowError::InvalidRevision(vec![format!(
            "document identity {}/{} does not match the request path {}/{}",
            incoming.revision.namespace, incoming.revision.id, key.namespace, key.id
        )])
        .into());
    }
    if incoming.revision.version != 0 && incoming.revision.version != key.version {
        return Err(StepflowError::InvalidRevision(vec![format!(
            "document version {} does not match the request path version {}",
            incoming.revision.version, key.version
        )])
        .into());
    }
    incoming.revision.version = key.version;

    let stored = state.revisions.update_inactive(&incoming).await?;
    Ok(YamlSource(stored.source))
}

async fn set_active(
    state: AppState,
    namespace: String,
    id: String,
    version: i32,
    headers: HeaderMap,
    new_active: bool,
) -> Result<YamlSource, ApiError> {
    let key = WorkflowRevisionId::new(namespace, id, version)?;
    let expected = current_updated_at(&headers)?;
    let stored = state.revisions.set_active(&key, expected, new_active).await?;
    Ok(YamlSource(stored.source))
}

/// POST /api/workflows/{namespace}/{id}/{version}/activate
#[utoipa::path(
    post,
    path = "/api/workflows/{namespace}/{id}/{version}/activate",
    params(
        ("namespace" = String, Path, description = "Workflow namespace"),
        ("id" = String, Path, description = "Workflow id"),
        ("version" = i32, Path, description = "Revision version"),
        ("X-Current-Updated-At" = String, Header, description = "updatedAt last read by the caller (RFC 3339)")
    ),
    responses(
        (status = 200, description = "Revision activated", body = String, content_type = "application/yaml"),
        (status = 400, description = "Missing or malformed lock header"),
        (status = 404, description = "Revision not found"),
        (status = 409, description = "Lock token is stale")
    ),
    tag = "workflows"
)]
pub async fn activate_revision(
    State(state): State<AppState>,
    Path((namespace, id, version)): Path<(String, String, i32)>,
    headers: HeaderMap,
) -> Result<YamlSource, ApiError> {
    set_active(state, namespace, id, version, headers, true).await
}

/// POST /api/workflows/{namespace}/{id}/{version}/deactivate
#[utoipa::path(
    post,
    path = "/api/workflows/{namespace}/{id}/{version}/deactivate",
    params(
        ("namespace" = String, Path, description = "Workflow namespace"),
        ("id" = String, Path, description = "Workflow id"),
        ("version" = i32, Path, description = "Revision version"),
        ("X-Current-Updated-At" = String, Header, description = "updatedAt last read by the caller (RFC 3339)")
    ),
    responses(
        (status = 200, description = "Revision deactivated", body = String, content_type = "application/yaml"),
        (status = 400, description = "Missing or malformed lock header"),
        (status = 404, description = "Revision not found"),
        (status = 409, description = "Lock token is stale")
    ),
    tag = "workflows"
)]
pub async fn deactivate_revision(
    State(state): State<AppState>,
    Path((namespace, id, version)): Path<(String, String, i32)>,
    headers: HeaderMap,
) -> Result<YamlSource, ApiError> {
    set_active(state, namespace, id, version, headers, false).await
}

/// DELETE /api/workflows/{namespace}/{id}/{version} - delete one revision
#[utoipa::path(
    delete,
    path = "/api/workflows/{namespace}/{id}/{version}",
    params(
        ("namespace" = String, Path, description = "Workflow namespace"),
        ("id" = String, Path, description = "Workflow id"),
        ("version" = i32, Path, description = "Revision version")
    ),
    responses(
        (status = 204, description = "Revision deleted"),
        (status = 404, description = "Revision not found"),
        (status = 409, description = "Revision is active")
    ),
    tag = "workflows"
)]
pub async fn delete_revision(
    State(state): State<AppState>,
    Path((namespace, id, version)): Path<(String, String, i32)>,
) -> Result<StatusCode, ApiError> {
    let key = WorkflowRevisionId::new(namespace, id, version)?;
    state.revisions.delete_revision(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/workflows/{namespace}/{id} - delete a whole workflow
#[utoipa::path(
    delete,
    path = "/api/workflows/{namespace}/{id}",
    params(
        ("namespace" = String, Path, description = "Workflow namespace"),
        ("id" = String, Path, description = "Workflow id")
    ),
    responses(
        (status = 204, description = "Workflow deleted (idempotent)"),
        (status = 409, description = "Workflow has active revisions")
    ),
    tag = "workflows"
)]
pub async fn delete_workflow(
    State(state): State<AppState>,
    Path((namespace, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let workflow = WorkflowId::new(namespace, id)?;
    state.revisions.delete_workflow(&workflow).await?;
    Ok(StatusCode::NO_CONTENT)
}
