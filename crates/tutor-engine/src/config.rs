//! Engine tuning, deserialised from the `[engine]` table of the server
//! config.

use serde::Deserialize;
use tutor_core::{grading::DEFAULT_NEUTRAL_GRADE, retrieval::RetrievalLimits};

pub const DEFAULT_QUESTIONS_PER_SKILL: u32 = 3;
pub const DEFAULT_FINISH_SENTINEL: &str = "[finish]";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Used when an assessment does not set its own.
  pub questions_per_skill: u32,
  pub retrieval:           RetrievalLimits,
  pub grading:             GradingConfig,
  /// A student message equal to this (case-insensitive) ends the attempt.
  pub finish_sentinel:     String,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      questions_per_skill: DEFAULT_QUESTIONS_PER_SKILL,
      retrieval:           RetrievalLimits::default(),
      grading:             GradingConfig::default(),
      finish_sentinel:     DEFAULT_FINISH_SENTINEL.to_owned(),
    }
  }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
  /// Grade used when the institution has no setting for a level label.
  pub neutral_grade: f64,
}

impl Default for GradingConfig {
  fn default() -> Self { Self { neutral_grade: DEFAULT_NEUTRAL_GRADE } }
}
