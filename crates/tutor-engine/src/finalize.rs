//! Completion Finalizer: grade verdicts and persist them exactly once.

use tracing::info;
use tutor_core::{
  assessment::AssessmentConfig,
  attempt::{MessageSubtype, NewMessage, NewResult},
  grading::{final_grade, Grader},
  language::Language,
  reply::SkillVerdict,
  service::{Embedder, Evaluator},
  store::{Finalization, FinalizeOutcome},
};
use uuid::Uuid;

use crate::{
  engine::{Engine, TutorStore},
  error::{transient, Result},
  outcome::Completion,
};

/// What a finalize call produced.
pub(crate) struct Finalized {
  pub completion: Completion,
  /// False when another call had already finalized the attempt.
  pub inserted:   bool,
}

/// Every skill at its lowest level, with templated feedback.
pub(crate) fn lowest_level_verdicts(
  assessment: &AssessmentConfig,
  language: Language,
) -> Result<Vec<SkillVerdict>> {
  assessment
    .skills
    .iter()
    .map(|skill| -> Result<SkillVerdict> {
      Ok(SkillVerdict {
        skill_id:       skill.skill_id,
        skill_level_id: skill.lowest_level()?.level_id,
        feedback:       language.insufficient_development(&skill.name),
      })
    })
    .collect()
}

impl<S, V, M> Engine<S, V, M>
where
  S: TutorStore,
  V: Evaluator,
  M: Embedder,
{
  /// Grade `verdicts` against the institution's settings and persist them
  /// together with the attempt's completion.
  ///
  /// Idempotent: if the attempt already has results nothing is written and
  /// the stored values are returned.
  pub(crate) async fn finalize_with(
    &self,
    assessment: &AssessmentConfig,
    attempt_id: Uuid,
    verdicts: &[SkillVerdict],
    student_text: &str,
    closing_message: Option<String>,
  ) -> Result<Finalized> {
    let settings = self
      .store
      .level_settings(assessment.institution_id)
      .await
      .map_err(transient)?;

    let grader = Grader {
      settings:      &settings,
      scorer:        self.scorer.as_ref(),
      neutral_grade: self.config.grading.neutral_grade,
    };
    let graded = grader.grade(assessment, verdicts, student_text);
    let grade = final_grade(graded.iter().map(|g| (g.weight, g.grade)));

    let results = graded
      .into_iter()
      .map(|g| NewResult {
        skill_id:       g.skill_id,
        skill_level_id: g.skill_level_id,
        feedback:       g.feedback,
        grade:          g.grade,
      })
      .collect();

    let outcome = self
      .store
      .complete_attempt(Finalization {
        attempt_id,
        results,
        final_grade: grade,
        closing_message: closing_message
          .map(|text| NewMessage::ai(attempt_id, MessageSubtype::Regular, text)),
      })
      .await
      .map_err(transient)?;

    let inserted = outcome.was_inserted();
    let (attempt, stored) = match outcome {
      FinalizeOutcome::Inserted { attempt, results }
      | FinalizeOutcome::AlreadyFinalized { attempt, results } => (attempt, results),
    };
    if inserted {
      info!(
        %attempt_id,
        final_grade = ?attempt.final_grade,
        skills = stored.len(),
        "attempt completed"
      );
    } else {
      info!(%attempt_id, "attempt was already finalized; returning stored results");
    }

    Ok(Finalized {
      completion: Completion::from_stored(assessment, &attempt, &stored),
      inserted,
    })
  }
}
