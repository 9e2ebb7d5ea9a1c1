//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Timestamps are RFC 3339 strings and UUIDs are hyphenated lowercase
//! strings. Chunk embeddings keep whatever encoding their producer wrote.

use chrono::{DateTime, Utc};
use rusqlite::types::ValueRef;
use tutor_core::{
  assessment::{
    AssessmentConfig, ChunkMetadata, EmbeddingChunk, EmbeddingPayload, Skill, SkillLevel,
    SkillLevelSetting,
  },
  attempt::{
    AssessmentResult, Attempt, AttemptStatus, ConversationMessage, MessageSubtype, MessageType,
  },
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Embeddings ──────────────────────────────────────────────────────────────

/// A chunk's `embedding` column as read, before any decoding.
pub enum StoredEmbedding {
  Text(String),
  Blob(Vec<u8>),
  Missing,
}

impl StoredEmbedding {
  pub fn from_value(v: ValueRef<'_>) -> Self {
    match v {
      ValueRef::Text(t) => Self::Text(String::from_utf8_lossy(t).into_owned()),
      ValueRef::Blob(b) => Self::Blob(b.to_vec()),
      _ => Self::Missing,
    }
  }

  fn into_payload(self) -> EmbeddingPayload {
    match self {
      Self::Text(t) => EmbeddingPayload::Text(t),
      Self::Blob(b) => EmbeddingPayload::Packed(b),
      // Decodes to `Empty` and is skipped during ranking.
      Self::Missing => EmbeddingPayload::Values(Vec::new()),
    }
  }
}

/// The value written to the `embedding` column for an imported chunk.
pub enum EmbeddingColumn {
  Text(String),
  Blob(Vec<u8>),
}

impl rusqlite::ToSql for EmbeddingColumn {
  fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
    match self {
      Self::Text(t) => t.to_sql(),
      Self::Blob(b) => b.to_sql(),
    }
  }
}

pub fn encode_embedding(payload: &EmbeddingPayload) -> Result<EmbeddingColumn> {
  Ok(match payload {
    EmbeddingPayload::Values(v) => EmbeddingColumn::Text(serde_json::to_string(v)?),
    EmbeddingPayload::Text(t) => EmbeddingColumn::Text(t.clone()),
    EmbeddingPayload::Packed(b) => EmbeddingColumn::Blob(b.clone()),
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const ATTEMPT_COLUMNS: &str = "attempt_id, assessment_id, student_id, status, \
   created_at, updated_at, completed_at, final_grade";

/// Raw values read directly from an `attempts` row.
pub struct RawAttempt {
  pub attempt_id:    String,
  pub assessment_id: String,
  pub student_id:    String,
  pub status:        String,
  pub created_at:    String,
  pub updated_at:    String,
  pub completed_at:  Option<String>,
  pub final_grade:   Option<f64>,
}

impl RawAttempt {
  /// Column order must match [`ATTEMPT_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      attempt_id:    row.get(0)?,
      assessment_id: row.get(1)?,
      student_id:    row.get(2)?,
      status:        row.get(3)?,
      created_at:    row.get(4)?,
      updated_at:    row.get(5)?,
      completed_at:  row.get(6)?,
      final_grade:   row.get(7)?,
    })
  }

  pub fn into_attempt(self) -> Result<Attempt> {
    Ok(Attempt {
      attempt_id:    decode_uuid(&self.attempt_id)?,
      assessment_id: decode_uuid(&self.assessment_id)?,
      student_id:    decode_uuid(&self.student_id)?,
      status:        AttemptStatus::parse(&self.status)?,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
      completed_at:  self.completed_at.as_deref().map(decode_dt).transpose()?,
      final_grade:   self.final_grade,
    })
  }
}

pub const MESSAGE_COLUMNS: &str = "message_id, attempt_id, kind, subtype, text, created_at";

pub struct RawMessage {
  pub message_id: String,
  pub attempt_id: String,
  pub kind:       String,
  pub subtype:    String,
  pub text:       String,
  pub created_at: String,
}

impl RawMessage {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      message_id: row.get(0)?,
      attempt_id: row.get(1)?,
      kind:       row.get(2)?,
      subtype:    row.get(3)?,
      text:       row.get(4)?,
      created_at: row.get(5)?,
    })
  }

  pub fn into_message(self) -> Result<ConversationMessage> {
    Ok(ConversationMessage {
      message_id: decode_uuid(&self.message_id)?,
      attempt_id: decode_uuid(&self.attempt_id)?,
      kind:       MessageType::parse(&self.kind)?,
      subtype:    MessageSubtype::parse(&self.subtype)?,
      text:       self.text,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const RESULT_COLUMNS: &str =
  "result_id, attempt_id, skill_id, skill_level_id, feedback, grade, created_at";

pub struct RawResult {
  pub result_id:      String,
  pub attempt_id:     String,
  pub skill_id:       String,
  pub skill_level_id: String,
  pub feedback:       String,
  pub grade:          Option<f64>,
  pub created_at:     String,
}

impl RawResult {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      result_id:      row.get(0)?,
      attempt_id:     row.get(1)?,
      skill_id:       row.get(2)?,
      skill_level_id: row.get(3)?,
      feedback:       row.get(4)?,
      grade:          row.get(5)?,
      created_at:     row.get(6)?,
    })
  }

  pub fn into_result(self) -> Result<AssessmentResult> {
    Ok(AssessmentResult {
      result_id:      decode_uuid(&self.result_id)?,
      attempt_id:     decode_uuid(&self.attempt_id)?,
      skill_id:       decode_uuid(&self.skill_id)?,
      skill_level_id: decode_uuid(&self.skill_level_id)?,
      feedback:       self.feedback,
      grade:          self.grade,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawChunk {
  pub chunk_id:    String,
  pub source_id:   String,
  pub content:     String,
  pub embedding:   StoredEmbedding,
  pub page:        Option<u32>,
  pub section:     Option<String>,
  pub chunk_index: u32,
}

impl RawChunk {
  pub fn into_chunk(self) -> Result<EmbeddingChunk> {
    Ok(EmbeddingChunk {
      chunk_id:  decode_uuid(&self.chunk_id)?,
      source_id: decode_uuid(&self.source_id)?,
      content:   self.content,
      embedding: self.embedding.into_payload(),
      metadata:  ChunkMetadata {
        page:        self.page,
        section:     self.section,
        chunk_index: self.chunk_index,
      },
    })
  }
}

pub struct RawLevelSetting {
  pub institution_id: String,
  pub label:          String,
  pub lower_limit:    f64,
  pub upper_limit:    f64,
}

impl RawLevelSetting {
  pub fn into_setting(self) -> Result<SkillLevelSetting> {
    Ok(SkillLevelSetting {
      institution_id: decode_uuid(&self.institution_id)?,
      label:          self.label,
      lower_limit:    self.lower_limit,
      upper_limit:    self.upper_limit,
    })
  }
}

/// An `assessments` row with its skills and levels, already ordered.
pub struct RawAssessment {
  pub assessment_id:       String,
  pub institution_id:      String,
  pub title:               String,
  pub case_text:           String,
  pub reference_solution:  Option<String>,
  pub questions_per_skill: Option<u32>,
  pub skills:              Vec<RawSkill>,
}

pub struct RawSkill {
  pub skill_id:    String,
  pub name:        String,
  pub description: String,
  pub weight:      f64,
  pub levels:      Vec<RawLevel>,
}

pub struct RawLevel {
  pub level_id:    String,
  pub order:       i32,
  pub label:       String,
  pub description: String,
  pub standard:    bool,
}

impl RawAssessment {
  pub fn into_assessment(self) -> Result<AssessmentConfig> {
    let skills = self
      .skills
      .into_iter()
      .map(|s| -> Result<Skill> {
        let levels = s
          .levels
          .into_iter()
          .map(|l| -> Result<SkillLevel> {
            Ok(SkillLevel {
              level_id:    decode_uuid(&l.level_id)?,
              order:       l.order,
              label:       l.label,
              description: l.description,
              standard:    l.standard,
            })
          })
          .collect::<Result<Vec<_>>>()?;
        Ok(Skill {
          skill_id: decode_uuid(&s.skill_id)?,
          name: s.name,
          description: s.description,
          levels,
          weight: s.weight,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(AssessmentConfig {
      assessment_id: decode_uuid(&self.assessment_id)?,
      institution_id: decode_uuid(&self.institution_id)?,
      title: self.title,
      case_text: self.case_text,
      reference_solution: self.reference_solution,
      questions_per_skill: self.questions_per_skill,
      skills,
    })
  }
}
