//! Storage traits for attempts, conversations and the assessment catalog.
//!
//! Backends (e.g. `tutor-store-sqlite`) implement both traits. The engine
//! depends on these abstractions, never on a concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  assessment::{AssessmentConfig, EmbeddingChunk, SkillLevelSetting},
  attempt::{AssessmentResult, Attempt, ConversationMessage, NewMessage, NewResult},
};

// ─── Finalize ────────────────────────────────────────────────────────────────

/// Input to [`ConversationStore::complete_attempt`].
#[derive(Debug, Clone)]
pub struct Finalization {
  pub attempt_id:      Uuid,
  pub results:         Vec<NewResult>,
  pub final_grade:     Option<f64>,
  /// Appended to the conversation in the same transaction, if present.
  pub closing_message: Option<NewMessage>,
}

/// What [`ConversationStore::complete_attempt`] found and did.
#[derive(Debug, Clone)]
pub enum FinalizeOutcome {
  /// Results were written and the attempt marked completed.
  Inserted {
    attempt: Attempt,
    results: Vec<AssessmentResult>,
  },
  /// Results already existed; nothing was written. The stored values are
  /// returned so the caller can rebuild its response from them.
  AlreadyFinalized {
    attempt: Attempt,
    results: Vec<AssessmentResult>,
  },
}

impl FinalizeOutcome {
  pub fn attempt(&self) -> &Attempt {
    match self {
      Self::Inserted { attempt, .. } | Self::AlreadyFinalized { attempt, .. } => attempt,
    }
  }

  pub fn results(&self) -> &[AssessmentResult] {
    match self {
      Self::Inserted { results, .. } | Self::AlreadyFinalized { results, .. } => results,
    }
  }

  pub fn was_inserted(&self) -> bool { matches!(self, Self::Inserted { .. }) }
}

// ─── Conversation store ──────────────────────────────────────────────────────

/// Append-only persistence of attempts, messages and results.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ConversationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Return the student's in-progress attempt for the assessment, creating
  /// one if none exists. Completed attempts are never returned here.
  fn open_attempt(
    &self,
    assessment_id: Uuid,
    student_id: Uuid,
  ) -> impl Future<Output = Result<Attempt, Self::Error>> + Send + '_;

  /// The most recently created attempt of any status.
  fn latest_attempt(
    &self,
    assessment_id: Uuid,
    student_id: Uuid,
  ) -> impl Future<Output = Result<Option<Attempt>, Self::Error>> + Send + '_;

  fn get_attempt(
    &self,
    attempt_id: Uuid,
  ) -> impl Future<Output = Result<Option<Attempt>, Self::Error>> + Send + '_;

  /// Append a message and bump the attempt's `updated_at`. The `created_at`
  /// timestamp is set by the store.
  fn append_message(
    &self,
    input: NewMessage,
  ) -> impl Future<Output = Result<ConversationMessage, Self::Error>> + Send + '_;

  /// The full log in creation order. Always read fresh; never cached.
  fn list_messages(
    &self,
    attempt_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ConversationMessage>, Self::Error>> + Send + '_;

  fn list_results(
    &self,
    attempt_id: Uuid,
  ) -> impl Future<Output = Result<Vec<AssessmentResult>, Self::Error>> + Send + '_;

  /// Insert-if-absent for the attempt's results plus the status transition,
  /// atomically. Implementations must back this with a uniqueness constraint
  /// on `(attempt_id, skill_id)` so concurrent callers cannot both insert.
  fn complete_attempt(
    &self,
    input: Finalization,
  ) -> impl Future<Output = Result<FinalizeOutcome, Self::Error>> + Send + '_;
}

// ─── Catalog store ───────────────────────────────────────────────────────────

/// Read access to the data the configuration, ingestion and institution
/// collaborators maintain.
pub trait CatalogStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The assessment with its skills and their levels (sorted by order).
  fn get_assessment(
    &self,
    assessment_id: Uuid,
  ) -> impl Future<Output = Result<Option<AssessmentConfig>, Self::Error>> + Send + '_;

  fn level_settings(
    &self,
    institution_id: Uuid,
  ) -> impl Future<Output = Result<Vec<SkillLevelSetting>, Self::Error>> + Send + '_;

  /// Chunks from `completed` sources linked to any of the assessment's
  /// skills.
  fn candidate_chunks(
    &self,
    assessment_id: Uuid,
  ) -> impl Future<Output = Result<Vec<EmbeddingChunk>, Self::Error>> + Send + '_;
}
