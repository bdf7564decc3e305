// Integration tests for the Stepflow API
// Require a running server and database:
//   DATABASE_URL=... cargo run -p stepflow-api
//   cargo test --test integration_test -- --ignored

use reqwest::header::{CONTENT_TYPE, LOCATION};
use serde_json::{json, Value};

const API_BASE_URL: &str = "http://localhost:8080";

fn unique_workflow_id(prefix: &str) -> String {
    // Keep ids unique across repeated test runs against the same database
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}-{nanos}")
}

fn log_workflow_doc(namespace: &str, id: &str) -> String {
    format!(
        "namespace: {namespace}\nid: {id}\nname: Smoke test\ndescription: Logs a greeting\nparameters:\n  - name: user\n    type: STRING\n    required: true\nsteps:\n  - type: LogTask\n    id: greet\n    message: \"hello\"\n"
    )
}

#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_workflow_lifecycle_and_execution() {
    let client = reqwest::Client::new();
    let id = unique_workflow_id("wf");

    // Create the first revision
    let create_response = client
        .post(format!("{API_BASE_URL}/api/workflows"))
        .header(CONTENT_TYPE, "application/yaml")
        .body(log_workflow_doc("it", &id))
        .send()
        .await
        .expect("Failed to create workflow");
    assert_eq!(create_response.status(), 201);
    assert_eq!(
        create_response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok()),
        Some(format!("/api/workflows/it/{id}/1").as_str())
    );

    let stored = create_response.text().await.expect("Failed to read body");
    assert!(stored.contains("version: 1"));
    assert!(stored.contains("active: false"));

    // Fetch the revision back; the source round-trips
    let get_response = client
        .get(format!("{API_BASE_URL}/api/workflows/it/{id}/1"))
        .send()
        .await
        .expect("Failed to get revision");
    assert_eq!(get_response.status(), 200);
    assert_eq!(get_response.text().await.unwrap(), stored);

    // Execute it
    let execute_response = client
        .post(format!("{API_BASE_URL}/api/executions"))
        .json(&json!({
            "namespace": "it",
            "id": id,
            "version": 1,
            "parameters": {"user": "ada"}
        }))
        .send()
        .await
        .expect("Failed to execute");
    assert_eq!(execute_response.status(), 200);

    let execution: Value = execute_response.json().await.unwrap();
    assert_eq!(execution["status"], "COMPLETED");
    let execution_id = execution["executionId"].as_str().unwrap();
    assert_eq!(execution_id.len(), 21);

    // The trace has exactly one completed LogTask step
    let detail_response = client
        .get(format!("{API_BASE_URL}/api/executions/{execution_id}"))
        .send()
        .await
        .expect("Failed to get execution");
    assert_eq!(detail_response.status(), 200);

    let detail: Value = detail_response.json().await.unwrap();
    let steps = detail["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0]["stepIndex"], 0);
    assert_eq!(steps[0]["stepId"], "greet");
    assert_eq!(steps[0]["stepType"], "LogTask");
    assert_eq!(steps[0]["status"], "COMPLETED");

    // The run shows up in the workflow's execution listing
    let list_response = client
        .get(format!(
            "{API_BASE_URL}/api/workflows/it/{id}/executions?status=COMPLETED"
        ))
        .send()
        .await
        .expect("Failed to list executions");
    assert_eq!(list_response.status(), 200);
    let page: Value = list_response.json().await.unwrap();
    assert!(page["total"].as_i64().unwrap() >= 1);
}

#[tokio::test]
#[ignore]
async fn test_missing_required_parameter_is_rejected() {
    let client = reqwest::Client::new();
    let id = unique_workflow_id("wf-params");

    client
        .post(format!("{API_BASE_URL}/api/workflows"))
        .header(CONTENT_TYPE, "application/yaml")
        .body(log_workflow_doc("it", &id))
        .send()
        .await
        .expect("Failed to create workflow");

    let response = client
        .post(format!("{API_BASE_URL}/api/executions"))
        .json(&json!({
            "namespace": "it",
            "id": id,
            "version": 1,
            "parameters": {}
        }))
        .send()
        .await
        .expect("Failed to post execution");
    assert_eq!(response.status(), 400);
    assert_eq!(
        response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("application/problem+json")
    );

    let problem: Value = response.json().await.unwrap();
    assert_eq!(
        problem["invalidParams"],
        json!([{"name": "user", "reason": "required parameter missing", "provided": null}])
    );
}

#[tokio::test]
#[ignore]
async fn test_optimistic_lock_conflict_on_stale_activate() {
    let client = reqwest::Client::new();
    let id = unique_workflow_id("wf-lock");

    let created = client
        .post(format!("{API_BASE_URL}/api/workflows"))
        .header(CONTENT_TYPE, "application/yaml")
        .body(log_workflow_doc("it", &id))
        .send()
        .await
        .expect("Failed to create workflow");
    let source = created.text().await.unwrap();

    // Pull the lock token out of the stored source
    let token = source
        .lines()
        .find_map(|line| line.strip_prefix("updatedAt: "))
        .map(|raw| raw.trim_matches('"').to_string())
        .expect("stored source carries updatedAt");

    // First activation with the fresh token succeeds
    let first = client
        .post(format!("{API_BASE_URL}/api/workflows/it/{id}/1/activate"))
        .header("X-Current-Updated-At", &token)
        .send()
        .await
        .expect("Failed to activate");
    assert_eq!(first.status(), 200);

    // Replaying the same token conflicts
    let second = client
        .post(format!("{API_BASE_URL}/api/workflows/it/{id}/1/deactivate"))
        .header("X-Current-Updated-At", &token)
        .send()
        .await
        .expect("Failed to deactivate");
    assert_eq!(second.status(), 409);

    // Missing header is a 400
    let missing = client
        .post(format!("{API_BASE_URL}/api/workflows/it/{id}/1/deactivate"))
        .send()
        .await
        .expect("Failed to deactivate");
    assert_eq!(missing.status(), 400);
}

#[tokio::test]
#[ignore]
async fn test_workflow_delete_is_idempotent_and_respects_active() {
    let client = reqwest::Client::new();

    // Deleting a workflow that never existed succeeds
    let response = client
        .delete(format!("{API_BASE_URL}/api/workflows/it/never-created"))
        .send()
        .await
        .expect("Failed to delete");
    assert_eq!(response.status(), 204);

    // An active revision blocks whole-workflow deletion
    let id = unique_workflow_id("wf-del");
    let created = client
        .post(format!("{API_BASE_URL}/api/workflows"))
        .header(CONTENT_TYPE, "application/yaml")
        .body(log_workflow_doc("it", &id))
        .send()
        .await
        .expect("Failed to create workflow");
    let source = created.text().await.unwrap();
    let token = source
        .lines()
        .find_map(|line| line.strip_prefix("updatedAt: "))
        .map(|raw| raw.trim_matches('"').to_string())
        .unwrap();

    client
        .post(format!("{API_BASE_URL}/api/workflows/it/{id}/1/activate"))
        .header("X-Current-Updated-At", &token)
        .send()
        .await
        .expect("Failed to activate");

    let blocked = client
        .delete(format!("{API_BASE_URL}/api/workflows/it/{id}"))
        .send()
        .await
        .expect("Failed to delete");
    assert_eq!(blocked.status(), 409);

    // The revision list is intact
    let list = client
        .get(format!("{API_BASE_URL}/api/workflows/it/{id}"))
        .send()
        .await
        .expect("Failed to list revisions");
    assert_eq!(list.status(), 200);
}

#[tokio::test]
#[ignore]
async fn test_health_endpoint() {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{API_BASE_URL}/health"))
        .send()
        .await
        .expect("Failed to call health endpoint");
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
#[ignore]
async fn test_openapi_spec() {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{API_BASE_URL}/api-doc/openapi.json"))
        .send()
        .await
        .expect("Failed to get OpenAPI spec");
    assert_eq!(response.status(), 200);

    let spec: Value = response.json().await.unwrap();
    assert_eq!(spec["info"]["title"], "Stepflow API");
}
