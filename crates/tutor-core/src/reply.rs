//! The evaluator's structured reply, validated at the parsing boundary.
//!
//! The external service returns free text that should contain one JSON
//! object. Which fields are required depends on the tier, so the reply is
//! modelled as a tagged union and anything that does not fit is rejected
//! here with a [`ReplyError`]. The engine recovers from a `ReplyError` with a
//! safe `incomplete` fallback; it never advances on unverified data.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{assessment::AssessmentConfig, Error, Result};

// ─── Tier ────────────────────────────────────────────────────────────────────

/// The evaluator's classification of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
  /// Insufficient substance.
  Incomplete,
  /// Adequate but below the standard level.
  Improvable,
  /// Standard level demonstrated, or limits apply.
  Final,
}

impl Tier {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Incomplete => "incomplete",
      Self::Improvable => "improvable",
      Self::Final => "final",
    }
  }
}

// ─── Reply ───────────────────────────────────────────────────────────────────

/// One `{skillId, skillLevelId, feedback}` triple of a final reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillVerdict {
  pub skill_id:       Uuid,
  pub skill_level_id: Uuid,
  pub feedback:       String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluatorReply {
  Incomplete {
    feedback:      String,
    /// The feedback is a question the student should answer before the
    /// dialogue moves on. The answer does not count as a turn.
    clarification: bool,
  },
  Improvable {
    feedback:      String,
    clarification: bool,
  },
  Final {
    feedback:      String,
    skill_results: Vec<SkillVerdict>,
  },
}

impl EvaluatorReply {
  /// The safe reply substituted when validation fails.
  pub fn fallback(retry_message: impl Into<String>) -> Self {
    Self::Incomplete { feedback: retry_message.into(), clarification: false }
  }

  pub fn tier(&self) -> Tier {
    match self {
      Self::Incomplete { .. } => Tier::Incomplete,
      Self::Improvable { .. } => Tier::Improvable,
      Self::Final { .. } => Tier::Final,
    }
  }

  pub fn feedback(&self) -> &str {
    match self {
      Self::Incomplete { feedback, .. }
      | Self::Improvable { feedback, .. }
      | Self::Final { feedback, .. } => feedback,
    }
  }

  pub fn is_clarification(&self) -> bool {
    match self {
      Self::Incomplete { clarification, .. } | Self::Improvable { clarification, .. } => {
        *clarification
      }
      Self::Final { .. } => false,
    }
  }
}

// ─── Validation ──────────────────────────────────────────────────────────────

/// Why a reply was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyError {
  #[error("reply is not a JSON object: {0}")]
  NotJson(String),

  #[error("reply has no tier")]
  MissingTier,

  #[error("unrecognised tier {0:?}")]
  UnknownTier(String),

  #[error("reply has no feedback text")]
  MissingFeedback,

  #[error("final reply lacks the confirmation flag")]
  MissingConfirmation,

  #[error("final reply lacks skill results")]
  MissingSkillResults,

  #[error("final reply has no feedback for skill {0}")]
  MissingSkillFeedback(Uuid),

  #[error("final reply does not cover skill {0}")]
  UncoveredSkill(Uuid),

  #[error("final reply lists skill {0} more than once")]
  DuplicateSkill(Uuid),
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
  #[serde(alias = "skillId")]
  skill_id:       Uuid,
  #[serde(alias = "skillLevelId")]
  skill_level_id: Uuid,
  feedback:       Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawReply {
  tier:          Option<String>,
  #[serde(alias = "message")]
  feedback:      Option<String>,
  #[serde(default)]
  clarification: bool,
  #[serde(alias = "confirmedFinal")]
  confirmed:     Option<bool>,
  #[serde(alias = "skillResults")]
  skill_results: Option<Vec<RawVerdict>>,
}

/// Strip Markdown fences and surrounding prose, leaving the outermost JSON
/// object.
fn json_object(raw: &str) -> Option<&str> {
  let start = raw.find('{')?;
  let end = raw.rfind('}')?;
  (start < end).then(|| &raw[start..=end])
}

fn non_blank(text: Option<String>) -> Option<String> {
  text.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty())
}

/// Parse and validate the evaluator's raw text.
pub fn parse_reply(raw: &str) -> Result<EvaluatorReply, ReplyError> {
  let body = json_object(raw).ok_or_else(|| ReplyError::NotJson("no object found".into()))?;
  let reply: RawReply =
    serde_json::from_str(body).map_err(|e| ReplyError::NotJson(e.to_string()))?;

  let tier = reply.tier.ok_or(ReplyError::MissingTier)?;
  let feedback = non_blank(reply.feedback).ok_or(ReplyError::MissingFeedback)?;

  let tier_key = tier.trim().to_ascii_lowercase();
  match tier_key.as_str() {
    "incomplete" => Ok(EvaluatorReply::Incomplete { feedback, clarification: reply.clarification }),
    "improvable" => Ok(EvaluatorReply::Improvable { feedback, clarification: reply.clarification }),
    "final" => {
      if reply.confirmed != Some(true) {
        return Err(ReplyError::MissingConfirmation);
      }
      let raw_results = reply.skill_results.ok_or(ReplyError::MissingSkillResults)?;
      if raw_results.is_empty() {
        return Err(ReplyError::MissingSkillResults);
      }
      let skill_results = raw_results
        .into_iter()
        .map(|r| -> Result<SkillVerdict, ReplyError> {
          let feedback =
            non_blank(r.feedback).ok_or(ReplyError::MissingSkillFeedback(r.skill_id))?;
          Ok(SkillVerdict { skill_id: r.skill_id, skill_level_id: r.skill_level_id, feedback })
        })
        .collect::<Result<Vec<_>, _>>()?;
      Ok(EvaluatorReply::Final { feedback, skill_results })
    }
    _ => Err(ReplyError::UnknownTier(tier)),
  }
}

/// Cross-check every `(skill, level)` pair against the assessment's
/// authoritative level table.
///
/// A mismatch is an integrity violation: the caller must abort the turn
/// without writing anything.
pub fn check_integrity(assessment: &AssessmentConfig, verdicts: &[SkillVerdict]) -> Result<()> {
  for v in verdicts {
    let skill = assessment.skill(v.skill_id).ok_or_else(|| {
      Error::Integrity(format!(
        "skill {} does not belong to assessment {}",
        v.skill_id, assessment.assessment_id
      ))
    })?;
    if skill.level(v.skill_level_id).is_none() {
      return Err(Error::Integrity(format!(
        "level {} does not belong to skill {}",
        v.skill_level_id, v.skill_id
      )));
    }
  }
  Ok(())
}

/// A final reply must carry exactly one verdict per assessed skill.
pub fn check_coverage(
  assessment: &AssessmentConfig,
  verdicts: &[SkillVerdict],
) -> Result<(), ReplyError> {
  let mut seen = HashSet::new();
  for v in verdicts {
    if !seen.insert(v.skill_id) {
      return Err(ReplyError::DuplicateSkill(v.skill_id));
    }
  }
  match assessment.skills.iter().find(|s| !seen.contains(&s.skill_id)) {
    Some(missing) => Err(ReplyError::UncoveredSkill(missing.skill_id)),
    None => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::assessment::{Skill, SkillLevel};

  fn assessment() -> AssessmentConfig {
    let skill = |name: &str| Skill {
      skill_id:    Uuid::new_v4(),
      name:        name.into(),
      description: String::new(),
      levels:      vec![
        SkillLevel {
          level_id:    Uuid::new_v4(),
          order:       1,
          label:       "Beginner".into(),
          description: String::new(),
          standard:    false,
        },
        SkillLevel {
          level_id:    Uuid::new_v4(),
          order:       2,
          label:       "Competent".into(),
          description: String::new(),
          standard:    true,
        },
      ],
      weight:      100.0,
    };
    AssessmentConfig {
      assessment_id:       Uuid::new_v4(),
      institution_id:      Uuid::new_v4(),
      title:               "Case".into(),
      case_text:           "A case".into(),
      reference_solution:  None,
      questions_per_skill: Some(2),
      skills:              vec![skill("Analysis"), skill("Synthesis")],
    }
  }

  #[test]
  fn parses_incomplete_inside_code_fence() {
    let raw = "```json\n{\"tier\": \"incomplete\", \"feedback\": \"Say more.\"}\n```";
    let reply = parse_reply(raw).unwrap();
    assert_eq!(reply.tier(), Tier::Incomplete);
    assert_eq!(reply.feedback(), "Say more.");
    assert!(!reply.is_clarification());
  }

  #[test]
  fn parses_clarification_flag() {
    let raw = json!({"tier": "improvable", "feedback": "Which market?", "clarification": true});
    let reply = parse_reply(&raw.to_string()).unwrap();
    assert_eq!(reply.tier(), Tier::Improvable);
    assert!(reply.is_clarification());
  }

  #[test]
  fn rejects_missing_tier() {
    let raw = json!({"feedback": "hello"});
    assert_eq!(parse_reply(&raw.to_string()), Err(ReplyError::MissingTier));
  }

  #[test]
  fn rejects_unknown_tier() {
    let raw = json!({"tier": "excellent", "feedback": "hello"});
    assert!(matches!(parse_reply(&raw.to_string()), Err(ReplyError::UnknownTier(_))));
  }

  #[test]
  fn rejects_blank_feedback() {
    let raw = json!({"tier": "incomplete", "feedback": "   "});
    assert_eq!(parse_reply(&raw.to_string()), Err(ReplyError::MissingFeedback));
  }

  #[test]
  fn final_requires_confirmation_and_results() {
    let a = assessment();
    let results = json!([{
      "skillId": a.skills[0].skill_id,
      "skillLevelId": a.skills[0].levels[1].level_id,
      "feedback": "good"
    }]);

    let raw = json!({"tier": "final", "feedback": "done", "skill_results": results});
    assert_eq!(parse_reply(&raw.to_string()), Err(ReplyError::MissingConfirmation));

    let raw = json!({"tier": "final", "feedback": "done", "confirmed": true});
    assert_eq!(parse_reply(&raw.to_string()), Err(ReplyError::MissingSkillResults));

    let raw = json!({"tier": "final", "feedback": "done", "confirmed": true, "skillResults": results});
    let reply = parse_reply(&raw.to_string()).unwrap();
    assert_eq!(reply.tier(), Tier::Final);
  }

  #[test]
  fn prose_is_not_json() {
    assert!(matches!(parse_reply("I think the student did well."), Err(ReplyError::NotJson(_))));
  }

  #[test]
  fn level_from_another_skill_is_an_integrity_error() {
    let a = assessment();
    let verdicts = vec![SkillVerdict {
      skill_id:       a.skills[0].skill_id,
      skill_level_id: a.skills[1].levels[1].level_id,
      feedback:       "x".into(),
    }];
    assert!(matches!(check_integrity(&a, &verdicts), Err(Error::Integrity(_))));
  }

  #[test]
  fn unknown_skill_is_an_integrity_error() {
    let a = assessment();
    let verdicts = vec![SkillVerdict {
      skill_id:       Uuid::new_v4(),
      skill_level_id: a.skills[0].levels[0].level_id,
      feedback:       "x".into(),
    }];
    assert!(matches!(check_integrity(&a, &verdicts), Err(Error::Integrity(_))));
  }

  #[test]
  fn coverage_requires_every_skill_once() {
    let a = assessment();
    let verdict = |i: usize| SkillVerdict {
      skill_id:       a.skills[i].skill_id,
      skill_level_id: a.skills[i].levels[0].level_id,
      feedback:       "x".into(),
    };
    assert_eq!(
      check_coverage(&a, &[verdict(0)]),
      Err(ReplyError::UncoveredSkill(a.skills[1].skill_id))
    );
    assert_eq!(
      check_coverage(&a, &[verdict(0), verdict(0)]),
      Err(ReplyError::DuplicateSkill(a.skills[0].skill_id))
    );
    assert_eq!(check_coverage(&a, &[verdict(0), verdict(1)]), Ok(()));
  }
}
