// RFC 7807 problem responses.
//
// Domain errors surface to the caller with their natural status codes;
// unexpected errors become a generic 500 problem with the details kept in the
// server log only.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use stepflow_core::{InvalidParam, StepflowError};

/// Problem Details document (`application/problem+json`)
#[derive(Debug, Serialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "invalidParams", skip_serializing_if = "Option::is_none")]
    pub invalid_params: Option<Vec<InvalidParam>>,
}

/// Wrapper turning domain errors into problem responses
#[derive(Debug)]
pub struct ApiError(pub StepflowError);

impl From<StepflowError> for ApiError {
    fn from(err: StepflowError) -> Self {
        ApiError(err)
    }
}

fn problem_type(kind: &str) -> String {
    // CamelCase kind name to kebab-case slug
    let mut slug = String::new();
    for (i, c) in kind.chars().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            slug.push('-');
        }
        slug.push(c.to_ascii_lowercase());
    }
    format!("urn:stepflow:problem:{slug}")
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            StepflowError::MalformedIdentifier(_)
            | StepflowError::Parse(_)
            | StepflowError::InvalidRevision(_)
            | StepflowError::ParameterValidation(_) => StatusCode::BAD_REQUEST,
            StepflowError::NotFound(_) => StatusCode::NOT_FOUND,
            StepflowError::AlreadyExists { .. }
            | StepflowError::ActiveConflict(_)
            | StepflowError::OptimisticLockConflict { .. } => StatusCode::CONFLICT,
            StepflowError::StepExecutionFailure(_) | StepflowError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn title(&self) -> &'static str {
        match &self.0 {
            StepflowError::MalformedIdentifier(_) => "Malformed identifier",
            StepflowError::Parse(_) => "Document parse error",
            StepflowError::InvalidRevision(_) => "Invalid revision",
            StepflowError::AlreadyExists { .. } => "Workflow already exists",
            StepflowError::NotFound(_) => "Not found",
            StepflowError::ActiveConflict(_) => "Active revision conflict",
            StepflowError::OptimisticLockConflict { .. } => "Optimistic lock conflict",
            StepflowError::ParameterValidation(_) => "Parameter validation failed",
            StepflowError::StepExecutionFailure(_) | StepflowError::Internal(_) => {
                "Internal server error"
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed unexpectedly");
            "an unexpected error occurred".to_string()
        } else {
            self.0.to_string()
        };

        let invalid_params = match &self.0 {
            StepflowError::ParameterValidation(params) => Some(params.clone()),
            _ => None,
        };

        let problem = Problem {
            problem_type: problem_type(self.0.kind()),
            title: self.title().to_string(),
            status: status.as_u16(),
            detail,
            instance: None,
            timestamp: Utc::now(),
            invalid_params,
        };

        let mut response = (status, Json(problem)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn statuses_match_the_error_kinds() {
        let cases = [
            (
                StepflowError::Parse("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                StepflowError::MalformedIdentifier("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                StepflowError::not_found("workflow"),
                StatusCode::NOT_FOUND,
            ),
            (
                StepflowError::AlreadyExists {
                    namespace: "n".into(),
                    id: "w".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                StepflowError::ActiveConflict("active".into()),
                StatusCode::CONFLICT,
            ),
            (
                StepflowError::OptimisticLockConflict {
                    expected: Utc::now(),
                    actual: Utc::now(),
                },
                StatusCode::CONFLICT,
            ),
            (
                StepflowError::ParameterValidation(vec![]),
                StatusCode::BAD_REQUEST,
            ),
            (
                StepflowError::Internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }

    #[test]
    fn problem_type_slugs_are_kebab_case() {
        assert_eq!(
            problem_type("OptimisticLockConflict"),
            "urn:stepflow:problem:optimistic-lock-conflict"
        );
        assert_eq!(problem_type("NotFound"), "urn:stepflow:problem:not-found");
    }

    #[test]
    fn validation_problems_carry_invalid_params() {
        let err = ApiError(StepflowError::ParameterValidation(vec![InvalidParam::new(
            "u",
            "required parameter missing",
            None,
        )]));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn internal_detail_is_generic() {
        let problem = Problem {
            problem_type: problem_type("Internal"),
            title: "Internal server error".into(),
            status: 500,
            detail: "an unexpected error occurred".into(),
            instance: None,
            timestamp: Utc::now(),
            invalid_params: None,
        };
        let value = serde_json::to_value(&problem).unwrap();
        assert_eq!(value["status"], json!(500));
        assert!(value.get("invalidParams").is_none());
    }
}
