//! What the engine hands back to callers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tutor_core::{
  assessment::AssessmentConfig,
  attempt::{AssessmentResult, Attempt},
  reply::Tier,
  turn::ForceReason,
};
use uuid::Uuid;

/// One skill's stored result, labelled for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillOutcome {
  pub skill_id:       Uuid,
  pub skill_name:     String,
  pub skill_level_id: Uuid,
  pub level_label:    String,
  pub feedback:       String,
  pub grade:          Option<f64>,
}

/// The completion payload, always rebuilt from stored rows so repeated
/// reads return identical values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
  pub attempt_id:   Uuid,
  pub final_grade:  Option<f64>,
  pub completed_at: Option<DateTime<Utc>>,
  pub results:      Vec<SkillOutcome>,
}

impl Completion {
  pub(crate) fn from_stored(
    assessment: &AssessmentConfig,
    attempt: &Attempt,
    results: &[AssessmentResult],
  ) -> Self {
    let results = results
      .iter()
      .map(|r| {
        let skill = assessment.skill(r.skill_id);
        SkillOutcome {
          skill_id:       r.skill_id,
          skill_name:     skill.map(|s| s.name.clone()).unwrap_or_default(),
          skill_level_id: r.skill_level_id,
          level_label:    skill
            .and_then(|s| s.level(r.skill_level_id))
            .map(|l| l.label.clone())
            .unwrap_or_default(),
          feedback:       r.feedback.clone(),
          grade:          r.grade,
        }
      })
      .collect();

    Self {
      attempt_id: attempt.attempt_id,
      final_grade: attempt.final_grade,
      completed_at: attempt.completed_at,
      results,
    }
  }
}

/// The response to a conversation submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
  pub attempt_id:    Uuid,
  /// The evaluator's message, or the engine's templated one.
  pub message:       String,
  pub tier:          Tier,
  /// The message asks the student to clarify; answering is free.
  pub clarification: bool,
  pub completed:     bool,
  /// Set when completion was imposed by policy rather than earned.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub forced:        Option<ForceReason>,
  pub turn:          u32,
  pub max_turns:     u32,
  /// Per-skill results; empty until the attempt completes.
  pub results:       Vec<SkillOutcome>,
  pub final_grade:   Option<f64>,
}
