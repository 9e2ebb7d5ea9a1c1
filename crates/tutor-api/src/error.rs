//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tutor_engine::EngineError;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Engine(#[from] EngineError),
}

impl ApiError {
  fn status(&self) -> StatusCode {
    let ApiError::Engine(e) = self;
    match e {
      EngineError::EmptyMessage => StatusCode::BAD_REQUEST,
      EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
      EngineError::AttemptCompleted(_)
      | EngineError::TurnLimitReached(_)
      | EngineError::NothingToRetry => StatusCode::CONFLICT,
      EngineError::Integrity(_) => StatusCode::UNPROCESSABLE_ENTITY,
      EngineError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let body = match &self {
      ApiError::Engine(e) if e.is_retryable() => {
        tracing::warn!(error = %e, "turn failed; client may retry");
        json!({
          "error": "The evaluation service is temporarily unavailable. Please try again.",
          "retryable": true,
        })
      }
      other => json!({ "error": other.to_string() }),
    };
    (status, Json(body)).into_response()
  }
}
