use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use concord_core::{EngineError, RegistryError, RequestError};

/// Private sentinel carrying an explicit 400 through the `anyhow::Error`
/// chain.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError — unified error type for HTTP responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<BadRequestError>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        if let Some(e) = self.0.downcast_ref::<RequestError>() {
            return match e {
                RequestError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                RequestError::UnknownRequest(_) | RequestError::AlreadyAwaited(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
        }
        if let Some(e) = self.0.downcast_ref::<EngineError>() {
            return match e {
                EngineError::Registry(RegistryError::NotFound(_)) => StatusCode::NOT_FOUND,
                EngineError::Registry(_)
                | EngineError::DepthExceeded { .. }
                | EngineError::BudgetExceeded { .. }
                | EngineError::CycleDetected { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
        }
        if let Some(RegistryError::NotFound(_)) = self.0.downcast_ref::<RegistryError>() {
            return StatusCode::NOT_FOUND;
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        }
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
