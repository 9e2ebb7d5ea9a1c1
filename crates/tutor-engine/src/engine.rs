//! The per-turn orchestration and the read-side lookups.

use tracing::{debug, error, info, instrument, warn};
use tutor_core::{
  assessment::AssessmentConfig,
  attempt::{Attempt, ConversationMessage, MessageSubtype, MessageType, NewMessage},
  grading::{HeuristicScorer, PerformanceScorer},
  language::{Language, LanguageDetector, WordListDetector},
  prompt::{build_request, PromptInput},
  reply::{check_coverage, check_integrity, parse_reply, EvaluatorReply, SkillVerdict, Tier},
  service::{Embedder, Evaluator},
  store::{CatalogStore, ConversationStore},
  turn::{count_turns, decide, is_stagnant, ForceReason, TurnDecision, TurnState},
};
use uuid::Uuid;

use crate::{
  config::EngineConfig,
  error::{transient, EngineError, Result},
  finalize::{lowest_level_verdicts, Finalized},
  outcome::{Completion, SubmissionOutcome},
};

/// A backend that provides both the conversation and the catalog side.
pub trait TutorStore: ConversationStore + CatalogStore {}

impl<T: ConversationStore + CatalogStore> TutorStore for T {}

/// Orchestrates attempts for any store, evaluator and embedder.
pub struct Engine<S, V, M> {
  pub(crate) store:     S,
  pub(crate) evaluator: V,
  pub(crate) embedder:  M,
  pub(crate) config:    EngineConfig,
  pub(crate) detector:  Box<dyn LanguageDetector>,
  pub(crate) scorer:    Box<dyn PerformanceScorer>,
}

/// All student text of the attempt, oldest first.
fn student_text(messages: &[ConversationMessage]) -> String {
  messages
    .iter()
    .filter(|m| m.kind == MessageType::Student)
    .map(|m| m.text.as_str())
    .collect::<Vec<_>>()
    .join("\n")
}

impl<S, V, M> Engine<S, V, M>
where
  S: TutorStore,
  V: Evaluator,
  M: Embedder,
{
  pub fn new(store: S, evaluator: V, embedder: M, config: EngineConfig) -> Self {
    Self {
      store,
      evaluator,
      embedder,
      config,
      detector: Box::new(WordListDetector),
      scorer: Box::new(HeuristicScorer),
    }
  }

  pub fn with_detector(mut self, detector: impl LanguageDetector + 'static) -> Self {
    self.detector = Box::new(detector);
    self
  }

  pub fn with_scorer(mut self, scorer: impl PerformanceScorer + 'static) -> Self {
    self.scorer = Box::new(scorer);
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn config(&self) -> &EngineConfig { &self.config }

  async fn assessment(&self, assessment_id: Uuid) -> Result<AssessmentConfig> {
    self
      .store
      .get_assessment(assessment_id)
      .await
      .map_err(transient)?
      .ok_or(EngineError::NotFound { kind: "assessment", id: assessment_id })
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// The ordered messages of the student's latest attempt; empty if the
  /// student has not started one.
  pub async fn conversation(
    &self,
    assessment_id: Uuid,
    student_id: Uuid,
  ) -> Result<Vec<ConversationMessage>> {
    self.assessment(assessment_id).await?;
    let Some(attempt) = self
      .store
      .latest_attempt(assessment_id, student_id)
      .await
      .map_err(transient)?
    else {
      return Ok(Vec::new());
    };
    self.store.list_messages(attempt.attempt_id).await.map_err(transient)
  }

  pub async fn attempt(&self, attempt_id: Uuid) -> Result<Attempt> {
    self
      .store
      .get_attempt(attempt_id)
      .await
      .map_err(transient)?
      .ok_or(EngineError::NotFound { kind: "attempt", id: attempt_id })
  }

  /// The completion payload of a completed attempt.
  pub async fn results(&self, attempt_id: Uuid) -> Result<Completion> {
    let attempt = self.attempt(attempt_id).await?;
    if !attempt.is_completed() {
      return Err(EngineError::NotFound { kind: "results", id: attempt_id });
    }
    let assessment = self.assessment(attempt.assessment_id).await?;
    let results = self.store.list_results(attempt_id).await.map_err(transient)?;
    Ok(Completion::from_stored(&assessment, &attempt, &results))
  }

  // ── Finalize ──────────────────────────────────────────────────────────────

  /// Finalize an attempt with the given verdicts.
  ///
  /// Verdicts are checked against the assessment first. Calling this again
  /// for a completed attempt writes nothing and returns the stored payload.
  pub async fn finalize(&self, attempt_id: Uuid, verdicts: &[SkillVerdict]) -> Result<Completion> {
    let attempt = self.attempt(attempt_id).await?;
    let assessment = self.assessment(attempt.assessment_id).await?;
    check_integrity(&assessment, verdicts)?;
    check_coverage(&assessment, verdicts).map_err(|e| EngineError::Integrity(e.to_string()))?;

    let messages = self.store.list_messages(attempt_id).await.map_err(transient)?;
    let finalized = self
      .finalize_with(&assessment, attempt_id, verdicts, &student_text(&messages), None)
      .await?;
    Ok(finalized.completion)
  }

  // ── Turns ───────────────────────────────────────────────────────────────

  /// Run one turn for a new student message.
  #[instrument(skip_all, fields(%assessment_id, %student_id))]
  pub async fn submit(
    &self,
    assessment_id: Uuid,
    student_id: Uuid,
    text: &str,
  ) -> Result<SubmissionOutcome> {
    let text = text.trim();
    if text.is_empty() {
      return Err(EngineError::EmptyMessage);
    }

    let assessment = self.assessment(assessment_id).await?;
    if let Some(latest) = self
      .store
      .latest_attempt(assessment_id, student_id)
      .await
      .map_err(transient)?
    {
      if latest.is_completed() {
        return Err(EngineError::AttemptCompleted(latest.attempt_id));
      }
    }
    let attempt = self
      .store
      .open_attempt(assessment_id, student_id)
      .await
      .map_err(transient)?;
    let attempt_id = attempt.attempt_id;

    let prior = self.store.list_messages(attempt_id).await.map_err(transient)?;
    // The last turn is settled through `retry`, never by a further message.
    let max_turns = assessment.max_turns(self.config.questions_per_skill);
    if count_turns(&prior) >= max_turns {
      return Err(EngineError::TurnLimitReached(attempt_id));
    }
    let answers_clarification = prior.last().is_some_and(|m| {
      m.kind == MessageType::Ai && m.subtype == MessageSubtype::ClarificationQuestion
    });
    let subtype = if answers_clarification {
      MessageSubtype::ClarificationResponse
    } else {
      MessageSubtype::Regular
    };

    // Persisted before any service call so a failed turn can be retried
    // without resubmitting.
    self
      .store
      .append_message(NewMessage::student(attempt_id, subtype, text))
      .await
      .map_err(transient)?;

    self.run_turn(&assessment, attempt_id, subtype, text).await
  }

  /// Re-run the evaluation of the student's last, unanswered message, e.g.
  /// after a transient failure. Nothing new is appended for the student.
  #[instrument(skip_all, fields(%assessment_id, %student_id))]
  pub async fn retry(&self, assessment_id: Uuid, student_id: Uuid) -> Result<SubmissionOutcome> {
    let assessment = self.assessment(assessment_id).await?;
    let attempt = self
      .store
      .latest_attempt(assessment_id, student_id)
      .await
      .map_err(transient)?
      .ok_or(EngineError::NothingToRetry)?;
    if attempt.is_completed() {
      return Err(EngineError::AttemptCompleted(attempt.attempt_id));
    }

    let messages = self.store.list_messages(attempt.attempt_id).await.map_err(transient)?;
    let Some(pending) = messages.last().filter(|m| m.kind == MessageType::Student) else {
      return Err(EngineError::NothingToRetry);
    };
    info!(attempt_id = %attempt.attempt_id, "retrying unanswered message");
    self
      .run_turn(&assessment, attempt.attempt_id, pending.subtype, &pending.text)
      .await
  }

  /// Evaluate the attempt after the student's message `text` has been
  /// stored, and record the outcome.
  async fn run_turn(
    &self,
    assessment: &AssessmentConfig,
    attempt_id: Uuid,
    subtype: MessageSubtype,
    text: &str,
  ) -> Result<SubmissionOutcome> {
    let messages = self.store.list_messages(attempt_id).await.map_err(transient)?;
    let state =
      TurnState::from_history(&messages, assessment.max_turns(self.config.questions_per_skill));
    let student_text = student_text(&messages);
    let language = self.detector.detect(&student_text);

    if text.eq_ignore_ascii_case(self.config.finish_sentinel.trim()) {
      return self
        .force_final(assessment, attempt_id, state, &student_text, language, ForceReason::FinishEarly)
        .await;
    }

    let context = self.retrieve(assessment.assessment_id, text).await?;
    let request = build_request(&PromptInput {
      assessment,
      transcript: &messages,
      context: &context,
      turn: state,
      language,
    });
    let raw = self.evaluator.evaluate(&request).await.map_err(transient)?;
    let reply = match validate(assessment, &raw, language) {
      // Only a valid final reply may override the turn limit.
      Err(EngineError::Integrity(reason)) if state.at_limit() => {
        warn!(%attempt_id, %reason, "invalid final reply on the last turn; applying turn limit");
        return self
          .force_final(assessment, attempt_id, state, &student_text, language, ForceReason::TurnLimit)
          .await;
      }
      reply => reply?,
    };

    let stagnant = subtype == MessageSubtype::Regular
      && state.stagnation_window()
      && is_stagnant(&messages);
    let decision = decide(&state, reply.tier() == Tier::Final, stagnant);
    debug!(
      turn = state.turn,
      max_turns = state.max_turns,
      tier = reply.tier().as_str(),
      stagnant,
      ?decision,
      "turn evaluated"
    );

    match (decision, reply) {
      (TurnDecision::ForcedFinal(reason), _) => {
        self
          .force_final(assessment, attempt_id, state, &student_text, language, reason)
          .await
      }
      (TurnDecision::NaturallyFinal, EvaluatorReply::Final { feedback, skill_results }) => {
        let finalized = self
          .finalize_with(
            assessment,
            attempt_id,
            &skill_results,
            &student_text,
            Some(feedback.clone()),
          )
          .await?;
        self.completed_outcome(attempt_id, finalized, feedback, None, state).await
      }
      (_, reply) => {
        let clarification = reply.is_clarification();
        let ai_subtype = if clarification {
          MessageSubtype::ClarificationQuestion
        } else {
          MessageSubtype::Regular
        };
        self
          .store
          .append_message(NewMessage::ai(attempt_id, ai_subtype, reply.feedback()))
          .await
          .map_err(transient)?;

        info!(%attempt_id, turn = state.turn, tier = reply.tier().as_str(), "turn completed");
        Ok(SubmissionOutcome {
          attempt_id,
          message: reply.feedback().to_owned(),
          tier: reply.tier(),
          clarification,
          completed: false,
          forced: None,
          turn: state.turn,
          max_turns: state.max_turns,
          results: Vec::new(),
          final_grade: None,
        })
      }
    }
  }

  /// Complete the attempt with every skill at its lowest level.
  async fn force_final(
    &self,
    assessment: &AssessmentConfig,
    attempt_id: Uuid,
    state: TurnState,
    student_text: &str,
    language: Language,
    reason: ForceReason,
  ) -> Result<SubmissionOutcome> {
    info!(%attempt_id, turn = state.turn, ?reason, "forcing final evaluation");
    let verdicts = lowest_level_verdicts(assessment, language)?;
    let closing = language.forced_closing(reason).to_owned();
    let finalized = self
      .finalize_with(assessment, attempt_id, &verdicts, student_text, Some(closing.clone()))
      .await?;
    self.completed_outcome(attempt_id, finalized, closing, Some(reason), state).await
  }

  async fn completed_outcome(
    &self,
    attempt_id: Uuid,
    finalized: Finalized,
    closing: String,
    forced: Option<ForceReason>,
    state: TurnState,
  ) -> Result<SubmissionOutcome> {
    // A concurrent request won the race; answer with what it stored.
    let message = if finalized.inserted {
      closing
    } else {
      self
        .store
        .list_messages(attempt_id)
        .await
        .map_err(transient)?
        .into_iter()
        .rev()
        .find(|m| m.kind == MessageType::Ai)
        .map_or(closing, |m| m.text)
    };

    Ok(SubmissionOutcome {
      attempt_id,
      message,
      tier: Tier::Final,
      clarification: false,
      completed: true,
      forced,
      turn: state.turn,
      max_turns: state.max_turns,
      final_grade: finalized.completion.final_grade,
      results: finalized.completion.results,
    })
  }
}

/// Parse and check the evaluator's reply.
///
/// Malformed replies and final replies that do not cover every skill are
/// replaced by the safe fallback. A reference to a foreign skill or level is
/// an integrity error.
fn validate(assessment: &AssessmentConfig, raw: &str, language: Language) -> Result<EvaluatorReply> {
  let reply = match parse_reply(raw) {
    Ok(reply) => reply,
    Err(e) => {
      warn!(error = %e, "evaluator reply rejected; substituting fallback");
      return Ok(EvaluatorReply::fallback(language.retry_message()));
    }
  };

  if let EvaluatorReply::Final { skill_results, .. } = &reply {
    if let Err(e) = check_integrity(assessment, skill_results) {
      error!(error = %e, assessment_id = %assessment.assessment_id, "evaluator broke integrity");
      return Err(e.into());
    }
    if let Err(e) = check_coverage(assessment, skill_results) {
      warn!(error = %e, "final reply does not cover every skill; substituting fallback");
      return Ok(EvaluatorReply::fallback(language.retry_message()));
    }
  }

  Ok(reply)
}
