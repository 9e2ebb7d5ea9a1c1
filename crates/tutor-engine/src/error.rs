//! Error type for `tutor-engine`.

use thiserror::Error;
use uuid::Uuid;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum EngineError {
  /// A missing assessment, attempt, or result set. Not retryable.
  #[error("{kind} not found: {id}")]
  NotFound { kind: &'static str, id: Uuid },

  #[error("attempt {0} is already completed")]
  AttemptCompleted(Uuid),

  #[error("message is empty")]
  EmptyMessage,

  /// Every turn has been used; the last one can only be retried.
  #[error("attempt {0} has no turns left; retry the last message instead")]
  TurnLimitReached(Uuid),

  /// The latest attempt has no unanswered student message.
  #[error("nothing to retry")]
  NothingToRetry,

  /// The evaluator referenced a skill or level outside the assessment.
  /// Fatal for the turn; nothing beyond the student's message was written.
  #[error("integrity violation: {0}")]
  Integrity(String),

  /// Storage or a remote service is unavailable. Retryable; the attempt is
  /// unchanged apart from the student's persisted message.
  #[error("service unavailable: {0}")]
  Transient(#[source] BoxError),
}

impl EngineError {
  pub fn is_retryable(&self) -> bool { matches!(self, Self::Transient(_)) }
}

pub(crate) fn transient<E>(e: E) -> EngineError
where
  E: std::error::Error + Send + Sync + 'static,
{
  EngineError::Transient(Box::new(e))
}

impl From<tutor_core::Error> for EngineError {
  fn from(e: tutor_core::Error) -> Self {
    use tutor_core::Error as Core;
    match e {
      Core::AssessmentNotFound(id) => Self::NotFound { kind: "assessment", id },
      Core::AttemptNotFound(id) => Self::NotFound { kind: "attempt", id },
      Core::Integrity(msg) => Self::Integrity(msg),
      other @ (Core::EmptySkill(_) | Core::StandardLevel { .. }) => {
        Self::Integrity(other.to_string())
      }
      other => transient(other),
    }
  }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
