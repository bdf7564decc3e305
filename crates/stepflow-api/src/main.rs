// Stepflow API server
// Decision: executions run synchronously inside the request - one sequential
//           walker per run, no worker pool

mod executions;
mod problem;
mod workflows;
mod yaml;

use anyhow::{Context, Result};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use stepflow_core::{ParameterTypeRegistry, StepTypeRegistry};
use stepflow_engine::{ExecutionEngine, ExecutionJournal, RevisionReader};
use stepflow_storage::{ExecutionStore, RevisionStore};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Server configuration from environment variables
#[derive(Debug, Clone)]
struct ApiConfig {
    database_url: String,
    listen_addr: String,
    request_timeout: Duration,
}

impl ApiConfig {
    fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL environment variable required")?;
        let listen_addr =
            std::env::var("STEPFLOW_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let request_timeout_secs = std::env::var("STEPFLOW_REQUEST_TIMEOUT_SECS")
            .ok()
            .map(|raw| raw.parse::<u64>())
            .transpose()
            .context("STEPFLOW_REQUEST_TIMEOUT_SECS must be an integer")?
            .unwrap_or(30);
        Ok(Self {
            database_url,
            listen_addr,
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        workflows::create_workflow,
        workflows::create_next_revision,
        workflows::get_revision,
        workflows::update_revision,
        workflows::list_revisions,
        workflows::list_workflows,
        workflows::activate_revision,
        workflows::deactivate_revision,
        workflows::delete_revision,
        workflows::delete_workflow,
        executions::create_execution,
        executions::get_execution,
        executions::list_executions,
    ),
    components(
        schemas(
            executions::CreateExecutionRequest,
            executions::ExecutionResponse,
            executions::ExecutionDetailResponse,
            executions::ExecutionSummary,
            executions::ExecutionLinks,
            executions::StepResultResponse,
            executions::PagedExecutionsResponse,
            stepflow_core::ExecutionStatus,
            stepflow_core::StepStatus,
            stepflow_core::ErrorInfo,
            stepflow_core::InvalidParam,
            stepflow_core::ParameterDefinition,
            stepflow_core::WorkflowId,
            stepflow_core::WorkflowRevisionId,
        )
    ),
    tags(
        (name = "workflows", description = "Workflow revision lifecycle"),
        (name = "executions", description = "Workflow execution and traces")
    ),
    info(
        title = "Stepflow API",
        description = "Workflow orchestration service: declarative step trees, versioned revisions, durable execution traces",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stepflow=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ApiConfig::from_env()?;
    tracing::info!("stepflow-api starting...");

    let pool = PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    stepflow_storage::MIGRATOR
        .run(&pool)
        .await
        .context("Failed to apply migrations")?;
    tracing::info!("Connected to database");

    // Registries: written once here, read-only for the process lifetime
    let step_registry = Arc::new(StepTypeRegistry::with_builtins());
    let type_registry = Arc::new(ParameterTypeRegistry::with_builtins());

    let revisions = RevisionStore::new(pool.clone(), step_registry.clone());
    let execution_store = ExecutionStore::new(pool);

    // Executions left RUNNING by a previous process are unrecoverable;
    // stamp them failed before taking traffic so their traces read cleanly.
    let swept = execution_store.mark_orphaned_running().await?;
    if swept > 0 {
        tracing::info!(count = swept, "swept orphaned executions");
    }

    let engine = Arc::new(ExecutionEngine::new(
        Arc::new(revisions.clone()) as Arc<dyn RevisionReader>,
        Arc::new(execution_store.clone()) as Arc<dyn ExecutionJournal>,
        step_registry.clone(),
    ));

    let workflows_state = workflows::AppState {
        revisions: revisions.clone(),
        steps: step_registry.clone(),
        types: type_registry.clone(),
    };
    let executions_state = executions::AppState {
        revisions,
        executions: execution_store,
        engine,
        types: type_registry,
    };

    let app = Router::new()
        .route("/health", get(health))
        .merge(workflows::routes(workflows_state))
        .merge(executions::routes(executions_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.listen_addr))?;
    tracing::info!("Listening on {}", config.listen_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
