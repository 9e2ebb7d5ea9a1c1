//! Assessment configuration as delivered by the external configuration,
//! ingestion and institution-settings collaborators.
//!
//! Everything here is immutable for the lifetime of an attempt. The engine
//! reads it; only the catalog import path writes it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Weight applied to a skill when none is configured.
pub const DEFAULT_SKILL_WEIGHT: f64 = 100.0;

fn default_weight() -> f64 { DEFAULT_SKILL_WEIGHT }

// ─── Skills ──────────────────────────────────────────────────────────────────

/// One rung of a skill's rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillLevel {
  pub level_id:    Uuid,
  /// Ordinal rank; lower is weaker.
  pub order:       i32,
  pub label:       String,
  pub description: String,
  /// Marks the level the assessment certifies. Exactly one per skill.
  #[serde(default)]
  pub standard:    bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
  pub skill_id:    Uuid,
  pub name:        String,
  pub description: String,
  /// Sorted by `order` ascending once loaded through a store.
  pub levels:      Vec<SkillLevel>,
  /// Assessment-scoped weight; `100` means full weight.
  #[serde(default = "default_weight")]
  pub weight:      f64,
}

impl Skill {
  /// The lowest-ordered level, used for conservative forced completions.
  pub fn lowest_level(&self) -> Result<&SkillLevel> {
    self
      .levels
      .iter()
      .min_by_key(|l| l.order)
      .ok_or(Error::EmptySkill(self.skill_id))
  }

  pub fn standard_level(&self) -> Option<&SkillLevel> {
    self.levels.iter().find(|l| l.standard)
  }

  /// A usable rubric: at least one level, and exactly one of them standard.
  pub fn validate(&self) -> Result<()> {
    self.lowest_level()?;
    match self.levels.iter().filter(|l| l.standard).count() {
      1 => Ok(()),
      count => Err(Error::StandardLevel { skill_id: self.skill_id, count }),
    }
  }

  pub fn level(&self, level_id: Uuid) -> Option<&SkillLevel> {
    self.levels.iter().find(|l| l.level_id == level_id)
  }
}

// ─── Assessment ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentConfig {
  pub assessment_id:       Uuid,
  /// Scopes the [`SkillLevelSetting`] lookup.
  pub institution_id:      Uuid,
  pub title:               String,
  pub case_text:           String,
  pub reference_solution:  Option<String>,
  /// Falls back to the engine-wide default when absent.
  pub questions_per_skill: Option<u32>,
  pub skills:              Vec<Skill>,
}

impl AssessmentConfig {
  pub fn skill(&self, skill_id: Uuid) -> Option<&Skill> {
    self.skills.iter().find(|s| s.skill_id == skill_id)
  }

  /// `skillCount × questionsPerSkill`.
  pub fn max_turns(&self, default_questions_per_skill: u32) -> u32 {
    let per_skill = self.questions_per_skill.unwrap_or(default_questions_per_skill);
    (self.skills.len() as u32).saturating_mul(per_skill)
  }
}

// ─── Institution settings ────────────────────────────────────────────────────

/// Numeric sub-range for a level label, used to interpolate fine-grained
/// grades inside the assigned level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillLevelSetting {
  pub institution_id: Uuid,
  pub label:          String,
  pub lower_limit:    f64,
  pub upper_limit:    f64,
}

// ─── Sources & chunks ────────────────────────────────────────────────────────

/// Processing status reported by the ingestion pipeline. Only `Completed`
/// sources contribute chunks to retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
  Pending,
  Processing,
  Completed,
  Failed,
}

impl SourceStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Processing => "processing",
      Self::Completed => "completed",
      Self::Failed => "failed",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "pending" => Ok(Self::Pending),
      "processing" => Ok(Self::Processing),
      "completed" => Ok(Self::Completed),
      "failed" => Ok(Self::Failed),
      other => Err(Error::UnknownDiscriminant(other.to_owned())),
    }
  }
}

/// The embedding vector as it was found in storage. Producers are not
/// consistent about the encoding, so decoding is deferred to retrieval where
/// a bad payload can be skipped instead of failing the whole query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingPayload {
  /// A native numeric sequence.
  Values(Vec<f32>),
  /// Serialised text, normally a JSON array (possibly JSON-encoded twice).
  Text(String),
  /// Little-endian packed `f32`s.
  #[serde(skip)]
  Packed(Vec<u8>),
}

/// Where in the source document a chunk came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
  pub page:        Option<u32>,
  pub section:     Option<String>,
  #[serde(default)]
  pub chunk_index: u32,
}

/// An immutable retrieval unit produced by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingChunk {
  pub chunk_id:  Uuid,
  pub source_id: Uuid,
  pub content:   String,
  pub embedding: EmbeddingPayload,
  pub metadata:  ChunkMetadata,
}

// ─── Import bundle ───────────────────────────────────────────────────────────

/// A chunk as it appears in a [`CatalogBundle`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkBundle {
  pub chunk_id:  Uuid,
  pub content:   String,
  pub embedding: EmbeddingPayload,
  #[serde(flatten)]
  pub metadata:  ChunkMetadata,
}

/// A source document, the skills it supports, and its chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceBundle {
  pub source_id: Uuid,
  pub title:     String,
  pub status:    SourceStatus,
  #[serde(default)]
  pub skill_ids: Vec<Uuid>,
  #[serde(default)]
  pub chunks:    Vec<ChunkBundle>,
}

/// Everything the collaborators deliver for one assessment, in one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogBundle {
  pub assessment:     AssessmentConfig,
  #[serde(default)]
  pub level_settings: Vec<SkillLevelSetting>,
  #[serde(default)]
  pub sources:        Vec<SourceBundle>,
}
