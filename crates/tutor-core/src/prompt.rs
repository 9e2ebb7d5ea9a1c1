//! Rendering of the grounded evaluation request.
//!
//! One request per turn. Evaluation is cumulative, so the whole transcript
//! is included, not just the latest message.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::{
  assessment::AssessmentConfig,
  attempt::{ConversationMessage, MessageSubtype, MessageType},
  language::Language,
  retrieval::RetrievedContext,
  turn::TurnState,
};

/// The two prompt parts sent to the evaluation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
  pub system: String,
  pub user:   String,
}

const SYSTEM_PROMPT: &str = "\
You are an assessment tutor holding a Socratic dialogue with a student about a case. \
Evaluate the student's answers cumulatively across the whole conversation against the \
skill rubric and classify the current turn into exactly one tier:

- \"incomplete\": the answers lack substance. Give developmental guidance. No skill results.
- \"improvable\": the answers are adequate but below the STANDARD level of at least one \
skill. Give guidance towards the standard level. No skill results.
- \"final\": the STANDARD level is demonstrated for every skill, or the conversation has \
reached its limits. Give closing feedback and one result per skill.

Never recommend or require more than the STANDARD level. Ground your guidance in the \
source excerpts when they are relevant. When you need the student to clarify an \
ambiguous statement before you can judge it, set \"clarification\" to true; \
clarifications do not consume turns.

Reply with a single JSON object and nothing else:
{\"tier\": \"incomplete\" | \"improvable\" | \"final\",
 \"feedback\": \"<message to the student>\",
 \"clarification\": false,
 \"confirmed\": true,
 \"skill_results\": [{\"skill_id\": \"<uuid>\", \"skill_level_id\": \"<uuid>\", \"feedback\": \"<text>\"}]}
\"confirmed\" and \"skill_results\" are required only when the tier is \"final\"; use the \
exact ids from the rubric.";

/// Everything a turn's request is built from.
pub struct PromptInput<'a> {
  pub assessment: &'a AssessmentConfig,
  pub transcript: &'a [ConversationMessage],
  pub context:    &'a RetrievedContext,
  pub turn:       TurnState,
  pub language:   Language,
}

fn speaker(m: &ConversationMessage) -> &'static str {
  match (m.kind, m.subtype) {
    (MessageType::Student, MessageSubtype::ClarificationResponse) => "STUDENT (clarification)",
    (MessageType::Student, _) => "STUDENT",
    (MessageType::Ai, MessageSubtype::ClarificationQuestion) => "TUTOR (clarification question)",
    (MessageType::Ai, _) => "TUTOR",
  }
}

pub fn build_request(input: &PromptInput<'_>) -> EvaluationRequest {
  let a = input.assessment;
  let mut user = String::new();

  // Writing into a String cannot fail.
  let _ = writeln!(user, "# CASE: {}\n\n{}\n", a.title, a.case_text);
  if let Some(solution) = &a.reference_solution {
    let _ = writeln!(user, "# REFERENCE SOLUTION (never reveal it)\n\n{solution}\n");
  }

  let _ = writeln!(user, "# SKILL RUBRIC");
  for skill in &a.skills {
    let _ = writeln!(
      user,
      "\n## {}\nskill_id: {}\n{}",
      skill.name, skill.skill_id, skill.description
    );
    for level in &skill.levels {
      let marker = if level.standard { " [STANDARD]" } else { "" };
      let _ = writeln!(
        user,
        "- order {} | {}{} | skill_level_id: {}\n  {}",
        level.order, level.label, marker, level.level_id, level.description
      );
    }
  }

  let _ = writeln!(user, "\n# SOURCE EXCERPTS");
  match input.context {
    RetrievedContext::NoRelevantContent => {
      let _ = writeln!(user, "{}", input.language.no_relevant_content());
    }
    RetrievedContext::Excerpts(chunks) => {
      for (i, c) in chunks.iter().enumerate() {
        let page = c.metadata.page.map(|p| format!(", page {p}")).unwrap_or_default();
        let section = c
          .metadata
          .section
          .as_deref()
          .map(|s| format!(", section \"{s}\""))
          .unwrap_or_default();
        let _ = writeln!(
          user,
          "[{}] (similarity {:.3}{page}{section})\n{}\n",
          i + 1,
          c.similarity,
          c.content.trim()
        );
      }
    }
  }

  let _ = writeln!(user, "# CONVERSATION SO FAR");
  for m in input.transcript {
    let _ = writeln!(user, "{}: {}", speaker(m), m.text.trim());
  }

  let t = input.turn;
  let _ = writeln!(user, "\n# TURN {} OF {}", t.turn, t.max_turns);
  if t.stagnation_window() {
    let _ = writeln!(
      user,
      "More than half of the turns are used. Stagnation limits apply: if the student is \
       no longer making progress, classify this turn as \"final\"."
    );
  }
  if t.at_limit() {
    let _ = writeln!(user, "This is the last turn. Classify it as \"final\".");
  }
  let reply_language = match input.language {
    Language::English => "English",
    Language::Spanish => "Spanish",
  };
  let _ = writeln!(user, "Write all feedback in {reply_language}.");

  EvaluationRequest { system: SYSTEM_PROMPT.to_owned(), user }
}
