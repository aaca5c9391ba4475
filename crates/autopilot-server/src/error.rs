use autopilot_core::PipelineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

// ---------------------------------------------------------------------------
// Sentinels for explicit HTTP statuses
// ---------------------------------------------------------------------------

/// Private sentinel carrying an explicit 400 through the `anyhow` chain.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

/// Private sentinel carrying an explicit 503 through the `anyhow` chain.
#[derive(Debug)]
struct UnavailableError(String);

impl std::fmt::Display for UnavailableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UnavailableError {}

/// Private sentinel carrying an explicit 422 through the `anyhow` chain.
#[derive(Debug)]
struct UnprocessableError(String);

impl std::fmt::Display for UnprocessableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UnprocessableError {}

// ---------------------------------------------------------------------------
// AppError — unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self(UnavailableError(msg.into()).into())
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self(UnprocessableError(msg.into()).into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(e) = self.0.downcast_ref::<BadRequestError>() {
            let body = serde_json::json!({ "error": e.0.clone() });
            return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
        }
        if let Some(e) = self.0.downcast_ref::<UnavailableError>() {
            let body = serde_json::json!({ "error": e.0.clone() });
            return (StatusCode::SERVICE_UNAVAILABLE, axum::Json(body)).into_response();
        }
        if let Some(e) = self.0.downcast_ref::<UnprocessableError>() {
            let body = serde_json::json!({ "error": e.0.clone() });
            return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(body)).into_response();
        }

        let status = if let Some(e) = self.0.downcast_ref::<PipelineError>() {
            match e {
                PipelineError::AutomationNotFound(_) | PipelineError::RunNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                PipelineError::AutomationExists(_) | PipelineError::AlreadyRecorded(_) => {
                    StatusCode::CONFLICT
                }
                PipelineError::InvalidSlug(_)
                | PipelineError::InvalidPlan(_)
                | PipelineError::InvalidPolicy(_)
                | PipelineError::NotInitialized => StatusCode::BAD_REQUEST,
                PipelineError::AlreadyFinalized(_) => StatusCode::CONFLICT,
                PipelineError::NoExecutor(_) => StatusCode::UNPROCESSABLE_ENTITY,
                PipelineError::RunDb(_)
                | PipelineError::Io(_)
                | PipelineError::Yaml(_)
                | PipelineError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
