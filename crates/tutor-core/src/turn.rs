//! Turn policy: a pure derivation over the immutable message log.
//!
//! States run `Active(turn = n)` → `ForcedFinal | NaturallyFinal` →
//! `Completed`. Nothing here keeps a counter; every decision is recomputed
//! from the history the store returns.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::attempt::{ConversationMessage, MessageType};

/// Below this share of previously unseen words a late turn counts as
/// stagnant.
pub const STAGNATION_NOVELTY_RATIO: f64 = 0.2;
/// A late turn introducing fewer unseen words than this is stagnant.
pub const STAGNATION_MIN_NOVEL_WORDS: usize = 3;

/// Count of regular student messages. Clarification exchanges are free.
pub fn count_turns(messages: &[ConversationMessage]) -> u32 {
  messages.iter().filter(|m| m.is_regular_student()).count() as u32
}

/// `ceil(maxTurns × 0.5) + 1`.
pub fn fifty_plus_one(max_turns: u32) -> u32 { max_turns.div_ceil(2) + 1 }

/// Turn bookkeeping for the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnState {
  pub turn:           u32,
  pub max_turns:      u32,
  pub fifty_plus_one: u32,
}

impl TurnState {
  pub fn from_history(messages: &[ConversationMessage], max_turns: u32) -> Self {
    Self {
      turn: count_turns(messages),
      max_turns,
      fifty_plus_one: fifty_plus_one(max_turns),
    }
  }

  /// From here on the evaluator is told that stagnation limits apply and the
  /// stagnation safety net is armed.
  pub fn stagnation_window(&self) -> bool { self.turn >= self.fifty_plus_one }

  pub fn at_limit(&self) -> bool { self.turn >= self.max_turns }
}

/// Why a final evaluation was imposed rather than earned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceReason {
  TurnLimit,
  Stagnation,
  FinishEarly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDecision {
  Continue,
  NaturallyFinal,
  ForcedFinal(ForceReason),
}

/// Decide the outcome of a turn once the evaluator has replied.
///
/// A valid `final` reply always wins. Otherwise the turn limit forces
/// completion, and inside the stagnation window so does a stagnant turn.
pub fn decide(state: &TurnState, evaluator_final: bool, stagnant: bool) -> TurnDecision {
  if evaluator_final {
    TurnDecision::NaturallyFinal
  } else if state.at_limit() {
    TurnDecision::ForcedFinal(ForceReason::TurnLimit)
  } else if state.stagnation_window() && stagnant {
    TurnDecision::ForcedFinal(ForceReason::Stagnation)
  } else {
    TurnDecision::Continue
  }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
  text
    .split(|c: char| !c.is_alphanumeric())
    .filter(|w| w.chars().count() >= 3)
    .map(str::to_lowercase)
}

/// Whether the latest regular student message adds too little that the
/// student has not already said.
pub fn is_stagnant(messages: &[ConversationMessage]) -> bool {
  let Some(latest_idx) = messages.iter().rposition(|m| m.is_regular_student()) else {
    return false;
  };

  let earlier: HashSet<String> = messages[..latest_idx]
    .iter()
    .filter(|m| m.kind == MessageType::Student)
    .flat_map(|m| words(&m.text))
    .collect();
  if earlier.is_empty() {
    return false;
  }

  let latest: HashSet<String> = words(&messages[latest_idx].text).collect();
  if latest.is_empty() {
    return true;
  }

  let novel = latest.iter().filter(|w| !earlier.contains(*w)).count();
  let ratio = novel as f64 / latest.len() as f64;
  novel < STAGNATION_MIN_NOVEL_WORDS || ratio < STAGNATION_NOVELTY_RATIO
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;
  use crate::attempt::MessageSubtype;

  fn msg(kind: MessageType, subtype: MessageSubtype, text: &str) -> ConversationMessage {
    ConversationMessage {
      message_id: Uuid::new_v4(),
      attempt_id: Uuid::nil(),
      kind,
      subtype,
      text: text.into(),
      created_at: Utc::now(),
    }
  }

  fn student(text: &str) -> ConversationMessage {
    msg(MessageType::Student, MessageSubtype::Regular, text)
  }

  #[test]
  fn clarification_responses_are_not_turns() {
    let log = vec![
      student("first answer"),
      msg(MessageType::Ai, MessageSubtype::ClarificationQuestion, "what do you mean?"),
      msg(MessageType::Student, MessageSubtype::ClarificationResponse, "I mean this"),
      msg(MessageType::Ai, MessageSubtype::Regular, "ok"),
      student("second answer"),
    ];
    assert_eq!(count_turns(&log), 2);
  }

  #[test]
  fn fifty_plus_one_rounds_up() {
    assert_eq!(fifty_plus_one(4), 3);
    assert_eq!(fifty_plus_one(5), 4);
    assert_eq!(fifty_plus_one(1), 2);
    assert_eq!(fifty_plus_one(0), 1);
  }

  #[test]
  fn limit_forces_final_exactly_at_max_turns() {
    for max_turns in 1..=12 {
      for turn in 1..=max_turns {
        let state = TurnState { turn, max_turns, fifty_plus_one: fifty_plus_one(max_turns) };
        let decision = decide(&state, false, false);
        if turn == max_turns {
          assert_eq!(decision, TurnDecision::ForcedFinal(ForceReason::TurnLimit));
        } else {
          assert_eq!(decision, TurnDecision::Continue);
        }
      }
    }
  }

  #[test]
  fn stagnation_only_fires_inside_window() {
    let max_turns = 8;
    let f = fifty_plus_one(max_turns);
    for turn in 1..max_turns {
      let state = TurnState { turn, max_turns, fifty_plus_one: f };
      match decide(&state, false, true) {
        TurnDecision::ForcedFinal(ForceReason::Stagnation) => assert!(turn >= f),
        TurnDecision::Continue => assert!(turn < f),
        other => panic!("unexpected {other:?}"),
      }
    }
  }

  #[test]
  fn evaluator_final_is_never_overridden() {
    let state = TurnState { turn: 4, max_turns: 4, fifty_plus_one: 3 };
    assert_eq!(decide(&state, true, true), TurnDecision::NaturallyFinal);
  }

  #[test]
  fn repeated_answer_is_stagnant() {
    let log = vec![
      student("Market segmentation divides customers by behaviour and demographics"),
      msg(MessageType::Ai, MessageSubtype::Regular, "Go deeper."),
      student("market segmentation divides customers by behaviour"),
    ];
    assert!(is_stagnant(&log));
  }

  #[test]
  fn new_material_is_not_stagnant() {
    let log = vec![
      student("Market segmentation divides customers by behaviour"),
      msg(MessageType::Ai, MessageSubtype::Regular, "Go deeper."),
      student("Because loyalty programmes reward frequent buyers, retention improves margins"),
    ];
    assert!(!is_stagnant(&log));
  }

  #[test]
  fn first_message_is_never_stagnant() {
    assert!(!is_stagnant(&[student("ok")]));
  }
}
