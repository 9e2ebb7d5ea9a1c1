//! Error type for `tutor-evaluator`.

use thiserror::Error;

/// Everything that can go wrong talking to an external service. The engine
/// treats all of these as retryable.
#[derive(Debug, Error)]
pub enum ServiceError {
  #[error("failed to build HTTP client: {0}")]
  Client(String),

  #[error("rate limited, retry after {retry_after_ms}ms")]
  RateLimited { retry_after_ms: u64 },

  #[error("authentication failed: {0}")]
  AuthenticationFailed(String),

  #[error("API error (HTTP {status}): {message}")]
  Api { status: u16, message: String },

  #[error("request timed out after {0}s")]
  Timeout(u64),

  #[error("network error: {0}")]
  Network(String),

  #[error("malformed response: {0}")]
  Decode(String),

  #[error("response contained no output")]
  EmptyResponse,
}

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;
