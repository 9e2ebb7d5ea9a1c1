//! Attempts, conversation messages and assessment results.
//!
//! The conversation log is append-only and is the sole source of truth for
//! turn counting. An attempt transitions to [`AttemptStatus::Completed`]
//! exactly once, in the same transaction that writes its results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Attempt ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
  InProgress,
  Completed,
}

impl AttemptStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::InProgress => "in_progress",
      Self::Completed => "completed",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "in_progress" => Ok(Self::InProgress),
      "completed" => Ok(Self::Completed),
      other => Err(Error::UnknownDiscriminant(other.to_owned())),
    }
  }
}

/// One student's pass through an assessment's conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
  pub attempt_id:    Uuid,
  pub assessment_id: Uuid,
  pub student_id:    Uuid,
  pub status:        AttemptStatus,
  pub created_at:    DateTime<Utc>,
  /// Touched on every turn.
  pub updated_at:    DateTime<Utc>,
  pub completed_at:  Option<DateTime<Utc>>,
  pub final_grade:   Option<f64>,
}

impl Attempt {
  pub fn is_completed(&self) -> bool { self.status == AttemptStatus::Completed }
}

// ─── Messages ────────────────────────────────────────────────────────────────

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
  Student,
  Ai,
}

impl MessageType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Student => "student",
      Self::Ai => "ai",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "student" => Ok(Self::Student),
      "ai" => Ok(Self::Ai),
      other => Err(Error::UnknownDiscriminant(other.to_owned())),
    }
  }
}

/// Clarification exchanges are free: only `Regular` student messages count
/// as turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSubtype {
  Regular,
  ClarificationQuestion,
  ClarificationResponse,
}

impl MessageSubtype {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Regular => "regular",
      Self::ClarificationQuestion => "clarification_question",
      Self::ClarificationResponse => "clarification_response",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "regular" => Ok(Self::Regular),
      "clarification_question" => Ok(Self::ClarificationQuestion),
      "clarification_response" => Ok(Self::ClarificationResponse),
      other => Err(Error::UnknownDiscriminant(other.to_owned())),
    }
  }
}

/// An immutable entry in an attempt's conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
  pub message_id: Uuid,
  pub attempt_id: Uuid,
  #[serde(rename = "type")]
  pub kind:       MessageType,
  pub subtype:    MessageSubtype,
  pub text:       String,
  /// Server-assigned; defines log order.
  pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
  pub fn is_regular_student(&self) -> bool {
    self.kind == MessageType::Student && self.subtype == MessageSubtype::Regular
  }
}

/// Input to [`crate::store::ConversationStore::append_message`].
/// `created_at` is always set by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
  pub attempt_id: Uuid,
  pub kind:       MessageType,
  pub subtype:    MessageSubtype,
  pub text:       String,
}

impl NewMessage {
  pub fn student(attempt_id: Uuid, subtype: MessageSubtype, text: impl Into<String>) -> Self {
    Self { attempt_id, kind: MessageType::Student, subtype, text: text.into() }
  }

  pub fn ai(attempt_id: Uuid, subtype: MessageSubtype, text: impl Into<String>) -> Self {
    Self { attempt_id, kind: MessageType::Ai, subtype, text: text.into() }
  }
}

// ─── Results ─────────────────────────────────────────────────────────────────

/// The level assigned to one skill when an attempt is finalised. At most one
/// row per `(attempt_id, skill_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentResult {
  pub result_id:      Uuid,
  pub attempt_id:     Uuid,
  pub skill_id:       Uuid,
  pub skill_level_id: Uuid,
  pub feedback:       String,
  /// `None` when the skill did not resolve to a grade; such skills are left
  /// out of the weighted final grade.
  pub grade:          Option<f64>,
  pub created_at:     DateTime<Utc>,
}

/// A result row before the store stamps its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewResult {
  pub skill_id:       Uuid,
  pub skill_level_id: Uuid,
  pub feedback:       String,
  pub grade:          Option<f64>,
}
