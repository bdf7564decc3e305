// YAML request/response plumbing for the workflow management routes.
//
// Workflow documents travel as raw text so the author's source survives
// byte-for-byte; responses carry either stored source text or a serialized
// value, both as application/yaml.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use stepflow_core::StepflowError;

use crate::problem::ApiError;

pub const CONTENT_TYPE_YAML: &str = "application/yaml";

/// Raw YAML text response
pub struct YamlSource(pub String);

impl IntoResponse for YamlSource {
    fn into_response(self) -> Response {
        (
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(CONTENT_TYPE_YAML),
            )],
            self.0,
        )
            .into_response()
    }
}

/// Created response: 201 with a Location header and the stored source
pub struct CreatedYaml {
    pub location: String,
    pub source: String,
}

impl IntoResponse for CreatedYaml {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::CREATED, YamlSource(self.source)).into_response();
        if let Ok(location) = HeaderValue::from_str(&self.location) {
            response.headers_mut().insert(header::LOCATION, location);
        }
        response
    }
}

/// Serialize a value as a YAML response body
pub fn to_yaml_response<T: Serialize>(value: &T) -> Result<YamlSource, ApiError> {
    let text = serde_yaml::to_string(value)
        .map_err(|e| StepflowError::Internal(anyhow::Error::new(e)))?;
    Ok(YamlSource(text))
}

/// Reject request bodies that are not declared as YAML (or JSON, which the
/// document parser accepts through the same path)
pub fn require_document_content_type(headers: &HeaderMap) -> Result<(), ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if content_type.contains("yaml") || content_type.contains("json") {
        Ok(())
    } else {
        Err(StepflowError::Parse(format!(
            "unsupported content type '{content_type}', expected {CONTENT_TYPE_YAML}"
        ))
        .into())
    }
}
