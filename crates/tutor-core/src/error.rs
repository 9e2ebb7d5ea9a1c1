//! Error types for `tutor-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("assessment not found: {0}")]
  AssessmentNotFound(Uuid),

  #[error("attempt not found: {0}")]
  AttemptNotFound(Uuid),

  /// The evaluator referenced a skill or level that does not belong to the
  /// assessment. Fatal for the turn; nothing may be written.
  #[error("integrity violation: {0}")]
  Integrity(String),

  #[error("skill {0} has no levels")]
  EmptySkill(Uuid),

  /// A skill must mark exactly one level as its certifying standard.
  #[error("skill {skill_id} marks {count} standard levels, expected exactly one")]
  StandardLevel { skill_id: Uuid, count: usize },

  #[error("unknown discriminant: {0:?}")]
  UnknownDiscriminant(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
