//! Grading: from an assigned level to a numeric sub-grade, and from sub-grades
//! to a weighted final grade.
//!
//! A skill's grade is not a pure function of its level. Inside the level's
//! institution-configured `[lower_limit, upper_limit]` the position is set by
//! a [`PerformanceScorer`] reading the student's cumulative text:
//!
//! ```text
//! grade = lower + (upper − lower) × score
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  assessment::{AssessmentConfig, SkillLevelSetting},
  reply::SkillVerdict,
};

/// Upper bound of [`HeuristicScorer`]; a perfect heuristic score never
/// reaches the top of the range.
pub const MAX_PERFORMANCE_SCORE: f64 = 0.9;

/// Grade used when the institution has no setting for a level label.
pub const DEFAULT_NEUTRAL_GRADE: f64 = 3.0;

// ─── Performance score ───────────────────────────────────────────────────────

/// Strategy mapping cumulative student text to a score in `[0, 1]`.
pub trait PerformanceScorer: Send + Sync {
  fn score(&self, student_text: &str) -> f64;
}

const CAUSAL_MARKERS: &[&str] = &[
  "because", "therefore", "since", "thus", "hence", "consequently", "due to",
  "as a result", "so that", "which means", "porque", "por lo tanto", "debido a",
  "ya que", "por consiguiente", "dado que", "en consecuencia",
];

const EXAMPLE_MARKERS: &[&str] = &[
  "for example", "for instance", "such as", "e g", "in the case of",
  "por ejemplo", "como es el caso", "tal como", "a saber",
];

const THEORY_MARKERS: &[&str] = &[
  "theory", "according to", "framework", "model", "author", "literature",
  "principle", "teoría", "teoria", "según", "segun", "modelo", "autor", "principio",
];

/// Length, sentence complexity, causal language, examples and theoretical
/// references, each saturating, summing to at most
/// [`MAX_PERFORMANCE_SCORE`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

impl HeuristicScorer {
  const LENGTH_WEIGHT: f64 = 0.25;
  const COMPLEXITY_WEIGHT: f64 = 0.15;
  const CAUSAL_WEIGHT: f64 = 0.2;
  const EXAMPLE_WEIGHT: f64 = 0.15;
  const THEORY_WEIGHT: f64 = 0.15;

  const SATURATING_WORDS: f64 = 300.0;
  const SATURATING_SENTENCE_LEN: f64 = 20.0;
  const SATURATING_CAUSAL: f64 = 4.0;
  const SATURATING_EXAMPLES: f64 = 2.0;
  const SATURATING_THEORY: f64 = 2.0;
}

/// Lowercase, punctuation folded to single spaces, padded so every marker
/// can be matched on word boundaries with `" marker "`.
fn normalise(text: &str) -> String {
  let folded: String = text
    .chars()
    .map(|c| if c.is_alphanumeric() { c.to_lowercase().next().unwrap_or(c) } else { ' ' })
    .collect();
  format!(" {} ", folded.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn count_markers(normalised: &str, markers: &[&str]) -> usize {
  markers.iter().map(|m| normalised.matches(&format!(" {m} ")).count()).sum()
}

fn saturate(value: f64, at: f64) -> f64 { (value / at).min(1.0) }

impl PerformanceScorer for HeuristicScorer {
  fn score(&self, student_text: &str) -> f64 {
    let words = student_text.split_whitespace().count();
    if words == 0 {
      return 0.0;
    }

    let sentences = student_text
      .split(['.', '!', '?', ';'])
      .filter(|s| !s.trim().is_empty())
      .count()
      .max(1);
    let avg_sentence = words as f64 / sentences as f64;

    let text = normalise(student_text);
    let causal = count_markers(&text, CAUSAL_MARKERS) as f64;
    let examples = count_markers(&text, EXAMPLE_MARKERS) as f64;
    let theory = count_markers(&text, THEORY_MARKERS) as f64;

    let score = Self::LENGTH_WEIGHT * saturate(words as f64, Self::SATURATING_WORDS)
      + Self::COMPLEXITY_WEIGHT * saturate(avg_sentence, Self::SATURATING_SENTENCE_LEN)
      + Self::CAUSAL_WEIGHT * saturate(causal, Self::SATURATING_CAUSAL)
      + Self::EXAMPLE_WEIGHT * saturate(examples, Self::SATURATING_EXAMPLES)
      + Self::THEORY_WEIGHT * saturate(theory, Self::SATURATING_THEORY);

    score.clamp(0.0, MAX_PERFORMANCE_SCORE)
  }
}

// ─── Per-skill grade ─────────────────────────────────────────────────────────

/// `lower + (upper − lower) × score`, with `score` clamped to `[0, 1]` and
/// the limits taken in either order.
pub fn interpolate(setting: &SkillLevelSetting, score: f64) -> f64 {
  let lower = setting.lower_limit.min(setting.upper_limit);
  let upper = setting.lower_limit.max(setting.upper_limit);
  lower + (upper - lower) * score.clamp(0.0, 1.0)
}

fn find_setting<'a>(settings: &'a [SkillLevelSetting], label: &str) -> Option<&'a SkillLevelSetting> {
  let label = label.trim();
  settings.iter().find(|s| s.label.trim().eq_ignore_ascii_case(label))
}

/// One skill's contribution to the final grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedSkill {
  pub skill_id:       Uuid,
  pub skill_level_id: Uuid,
  pub level_label:    String,
  pub feedback:       String,
  /// Configured weight (100 = full).
  pub weight:         f64,
  pub grade:          Option<f64>,
}

/// Turns level verdicts into graded skills.
pub struct Grader<'a> {
  pub settings:      &'a [SkillLevelSetting],
  pub scorer:        &'a dyn PerformanceScorer,
  pub neutral_grade: f64,
}

impl Grader<'_> {
  /// Grade every verdict. A verdict whose level cannot be found in the
  /// assessment resolves to no grade rather than failing.
  pub fn grade(
    &self,
    assessment: &AssessmentConfig,
    verdicts: &[SkillVerdict],
    student_text: &str,
  ) -> Vec<GradedSkill> {
    let score = self.scorer.score(student_text);

    verdicts
      .iter()
      .map(|v| {
        let skill = assessment.skill(v.skill_id);
        let level = skill.and_then(|s| s.level(v.skill_level_id));
        let grade = level.map(|l| match find_setting(self.settings, &l.label) {
          Some(setting) => interpolate(setting, score),
          None => self.neutral_grade,
        });
        GradedSkill {
          skill_id:       v.skill_id,
          skill_level_id: v.skill_level_id,
          level_label:    level.map(|l| l.label.clone()).unwrap_or_default(),
          feedback:       v.feedback.clone(),
          weight:         skill.map_or(0.0, |s| s.weight),
          grade,
        }
      })
      .collect()
  }
}

// ─── Aggregate ───────────────────────────────────────────────────────────────

/// Weighted mean over the skills that resolved to a grade, weight =
/// configured weight / 100.
///
/// Unresolved skills are excluded from numerator and denominator. If the
/// resolved skills carry no usable weight, the unweighted mean is used. With
/// nothing resolved there is no final grade.
pub fn final_grade(graded: impl IntoIterator<Item = (f64, Option<f64>)>) -> Option<f64> {
  let resolved: Vec<(f64, f64)> = graded
    .into_iter()
    .filter_map(|(weight, grade)| grade.map(|g| ((weight / 100.0).max(0.0), g)))
    .collect();
  if resolved.is_empty() {
    return None;
  }

  let total_weight: f64 = resolved.iter().map(|(w, _)| w).sum();
  if total_weight > 0.0 {
    Some(resolved.iter().map(|(w, g)| w * g).sum::<f64>() / total_weight)
  } else {
    Some(resolved.iter().map(|(_, g)| g).sum::<f64>() / resolved.len() as f64)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assessment::{Skill, SkillLevel};

  fn setting(label: &str, lower: f64, upper: f64) -> SkillLevelSetting {
    SkillLevelSetting {
      institution_id: Uuid::nil(),
      label:          label.into(),
      lower_limit:    lower,
      upper_limit:    upper,
    }
  }

  struct Fixed(f64);

  impl PerformanceScorer for Fixed {
    fn score(&self, _: &str) -> f64 { self.0 }
  }

  fn assessment() -> AssessmentConfig {
    let skill = |weight: f64| Skill {
      skill_id: Uuid::new_v4(),
      name: "s".into(),
      description: String::new(),
      levels: vec![
        SkillLevel {
          level_id:    Uuid::new_v4(),
          order:       1,
          label:       "Initial".into(),
          description: String::new(),
          standard:    false,
        },
        SkillLevel {
          level_id:    Uuid::new_v4(),
          order:       2,
          label:       "Developed".into(),
          description: String::new(),
          standard:    true,
        },
      ],
      weight,
    };
    AssessmentConfig {
      assessment_id:       Uuid::new_v4(),
      institution_id:      Uuid::nil(),
      title:               "t".into(),
      case_text:           "c".into(),
      reference_solution:  None,
      questions_per_skill: None,
      skills:              vec![skill(100.0), skill(50.0)],
    }
  }

  #[test]
  fn empty_text_scores_zero() {
    assert_eq!(HeuristicScorer.score("   "), 0.0);
  }

  #[test]
  fn score_is_bounded() {
    let rich = "According to the theory of competitive advantage, firms win because \
                they differentiate. For example, a retailer such as a discounter \
                lowers cost; therefore margins rise. Since the model predicts this, \
                and thus the framework holds, consequently we see it. "
      .repeat(40);
    let s = HeuristicScorer.score(&rich);
    assert!(s > 0.75, "score {s}");
    assert!(s <= MAX_PERFORMANCE_SCORE);
  }

  #[test]
  fn reasoning_scores_above_bare_assertion() {
    let bare = HeuristicScorer.score("Prices went up.");
    let reasoned = HeuristicScorer.score(
      "Prices went up because demand outpaced supply; for example, according to the \
       model of elastic demand, consumers substituted away.",
    );
    assert!(reasoned > bare);
  }

  #[test]
  fn spanish_markers_count() {
    let s = HeuristicScorer.score("Los precios subieron porque la demanda creció, por ejemplo según el modelo.");
    let plain = HeuristicScorer.score("Los precios subieron y la demanda creció en el mercado local hoy.");
    assert!(s > plain);
  }

  #[test]
  fn grade_stays_within_limits() {
    let settings = vec![setting("Developed", 3.0, 4.0), setting("Initial", 1.0, 2.0)];
    let a = assessment();
    for score in [0.0, 0.3, 0.9, 1.0, 7.0, -1.0] {
      let scorer = Fixed(score);
      let grader = Grader { settings: &settings, scorer: &scorer, neutral_grade: 3.0 };
      let verdicts: Vec<SkillVerdict> = a
        .skills
        .iter()
        .map(|s| SkillVerdict {
          skill_id:       s.skill_id,
          skill_level_id: s.levels[1].level_id,
          feedback:       "f".into(),
        })
        .collect();
      for g in grader.grade(&a, &verdicts, "text") {
        let grade = g.grade.unwrap();
        assert!((3.0..=4.0).contains(&grade), "grade {grade} for score {score}");
      }
    }
  }

  #[test]
  fn missing_setting_uses_neutral_grade() {
    let a = assessment();
    let scorer = Fixed(0.5);
    let grader = Grader { settings: &[], scorer: &scorer, neutral_grade: 2.5 };
    let verdicts = vec![SkillVerdict {
      skill_id:       a.skills[0].skill_id,
      skill_level_id: a.skills[0].levels[0].level_id,
      feedback:       "f".into(),
    }];
    assert_eq!(grader.grade(&a, &verdicts, "x")[0].grade, Some(2.5));
  }

  #[test]
  fn label_lookup_ignores_case() {
    let settings = vec![setting("developed ", 3.0, 5.0)];
    assert!(find_setting(&settings, "Developed").is_some());
  }

  #[test]
  fn unknown_level_is_unresolved() {
    let a = assessment();
    let scorer = Fixed(0.5);
    let grader = Grader { settings: &[], scorer: &scorer, neutral_grade: 3.0 };
    let verdicts = vec![SkillVerdict {
      skill_id:       a.skills[0].skill_id,
      skill_level_id: Uuid::new_v4(),
      feedback:       "f".into(),
    }];
    assert_eq!(grader.grade(&a, &verdicts, "x")[0].grade, None);
  }

  #[test]
  fn equal_weights_give_arithmetic_mean() {
    let grades = [2.0, 3.5, 4.25];
    let got = final_grade(grades.iter().map(|g| (100.0, Some(*g)))).unwrap();
    assert!((got - (2.0 + 3.5 + 4.25) / 3.0).abs() < 1e-12);

    let got = final_grade(grades.iter().map(|g| (40.0, Some(*g)))).unwrap();
    assert!((got - (2.0 + 3.5 + 4.25) / 3.0).abs() < 1e-12);
  }

  #[test]
  fn weights_are_normalised_over_resolved_skills() {
    let got = final_grade([(100.0, Some(4.0)), (50.0, Some(1.0)), (100.0, None)]).unwrap();
    assert!((got - (4.0 + 0.5) / 1.5).abs() < 1e-12);
  }

  #[test]
  fn zero_weights_fall_back_to_plain_mean() {
    let got = final_grade([(0.0, Some(2.0)), (0.0, Some(4.0))]).unwrap();
    assert!((got - 3.0).abs() < 1e-12);
  }

  #[test]
  fn nothing_resolved_has_no_grade() {
    assert_eq!(final_grade([(100.0, None)]), None);
    assert_eq!(final_grade(std::iter::empty()), None);
  }
}
