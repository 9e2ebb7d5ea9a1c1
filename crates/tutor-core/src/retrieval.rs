//! Similarity ranking over embedded source chunks.
//!
//! Decoding and scoring are pure; embedding the query and loading candidates
//! happen in the engine. A chunk whose payload cannot be used is reported in
//! [`Ranking::skipped`] instead of failing the ranking.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::assessment::{ChunkMetadata, EmbeddingChunk, EmbeddingPayload};

// ─── Decoding ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
  #[error("embedding text is not a numeric array: {0}")]
  Text(String),

  #[error("packed embedding of {0} bytes is not a whole number of f32s")]
  BlobSize(usize),

  #[error("embedding is empty")]
  Empty,
}

fn decode_text(text: &str) -> Result<Vec<f32>, DecodeError> {
  let value: serde_json::Value =
    serde_json::from_str(text.trim()).map_err(|e| DecodeError::Text(e.to_string()))?;
  match value {
    // Some producers JSON-encode the array a second time.
    serde_json::Value::String(inner) => decode_text(&inner),
    other => serde_json::from_value(other).map_err(|e| DecodeError::Text(e.to_string())),
  }
}

fn decode_packed(bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
  if bytes.len() % 4 != 0 {
    return Err(DecodeError::BlobSize(bytes.len()));
  }
  Ok(
    bytes
      .chunks_exact(4)
      .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect(),
  )
}

/// Decode a stored embedding regardless of how it was encoded.
pub fn decode_embedding(payload: &EmbeddingPayload) -> Result<Vec<f32>, DecodeError> {
  let v = match payload {
    EmbeddingPayload::Values(v) => v.clone(),
    EmbeddingPayload::Text(t) => decode_text(t)?,
    EmbeddingPayload::Packed(b) => decode_packed(b)?,
  };
  if v.is_empty() {
    return Err(DecodeError::Empty);
  }
  Ok(v)
}

/// Little-endian packing, the inverse of the `Packed` decoding.
pub fn encode_packed(v: &[f32]) -> Vec<u8> {
  v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

// ─── Scoring ─────────────────────────────────────────────────────────────────

/// Cosine similarity, or `None` for mismatched dimensions or a zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
  if a.is_empty() || a.len() != b.len() {
    return None;
  }
  let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
  for (x, y) in a.iter().zip(b) {
    let (x, y) = (f64::from(*x), f64::from(*y));
    dot += x * y;
    na += x * x;
    nb += y * y;
  }
  let denom = na.sqrt() * nb.sqrt();
  (denom > 0.0).then(|| dot / denom)
}

/// How many chunks survive ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalLimits {
  /// Cap per source document; `None` disables the cap.
  pub per_source:     Option<usize>,
  /// Aggregate cap across all sources.
  pub total:          usize,
  /// Chunks scoring below this are not considered relevant.
  pub min_similarity: f64,
}

impl Default for RetrievalLimits {
  fn default() -> Self { Self { per_source: Some(3), total: 10, min_similarity: 0.1 } }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
  pub chunk_id:   Uuid,
  pub source_id:  Uuid,
  pub content:    String,
  pub metadata:   ChunkMetadata,
  pub similarity: f64,
}

/// Why a candidate was left out of ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
  Undecodable(DecodeError),
  DimensionMismatch { expected: usize, found: usize },
  ZeroNorm,
}

#[derive(Debug, Clone, Default)]
pub struct Ranking {
  /// Descending by similarity.
  pub scored:  Vec<ScoredChunk>,
  pub skipped: Vec<(Uuid, SkipReason)>,
}

/// Score every candidate against `query` and keep the best, descending.
pub fn rank(query: &[f32], candidates: Vec<EmbeddingChunk>, limits: &RetrievalLimits) -> Ranking {
  let mut ranking = Ranking::default();
  let mut scored = Vec::with_capacity(candidates.len());

  for chunk in candidates {
    let vector = match decode_embedding(&chunk.embedding) {
      Ok(v) => v,
      Err(e) => {
        ranking.skipped.push((chunk.chunk_id, SkipReason::Undecodable(e)));
        continue;
      }
    };
    if vector.len() != query.len() {
      ranking.skipped.push((
        chunk.chunk_id,
        SkipReason::DimensionMismatch { expected: query.len(), found: vector.len() },
      ));
      continue;
    }
    let Some(similarity) = cosine_similarity(query, &vector) else {
      ranking.skipped.push((chunk.chunk_id, SkipReason::ZeroNorm));
      continue;
    };
    if similarity < limits.min_similarity {
      continue;
    }
    scored.push(ScoredChunk {
      chunk_id: chunk.chunk_id,
      source_id: chunk.source_id,
      content: chunk.content,
      metadata: chunk.metadata,
      similarity,
    });
  }

  scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

  let mut per_source: HashMap<Uuid, usize> = HashMap::new();
  for chunk in scored {
    if ranking.scored.len() >= limits.total {
      break;
    }
    let taken = per_source.entry(chunk.source_id).or_default();
    if limits.per_source.is_some_and(|cap| *taken >= cap) {
      continue;
    }
    *taken += 1;
    ranking.scored.push(chunk);
  }

  ranking
}

// ─── Context ─────────────────────────────────────────────────────────────────

/// What the evaluator is grounded on for a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "excerpts", rename_all = "snake_case")]
pub enum RetrievedContext {
  /// Explicit sentinel: nothing matched. Never an error.
  NoRelevantContent,
  Excerpts(Vec<ScoredChunk>),
}

impl From<Ranking> for RetrievedContext {
  fn from(r: Ranking) -> Self {
    if r.scored.is_empty() {
      Self::NoRelevantContent
    } else {
      Self::Excerpts(r.scored)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn chunk(source_id: Uuid, embedding: EmbeddingPayload) -> EmbeddingChunk {
    EmbeddingChunk {
      chunk_id: Uuid::new_v4(),
      source_id,
      content: "text".into(),
      embedding,
      metadata: ChunkMetadata::default(),
    }
  }

  #[test]
  fn decodes_all_encodings() {
    let v = vec![0.25_f32, -1.5, 3.0];
    assert_eq!(decode_embedding(&EmbeddingPayload::Values(v.clone())).unwrap(), v);
    assert_eq!(decode_embedding(&EmbeddingPayload::Text("[0.25, -1.5, 3]".into())).unwrap(), v);
    assert_eq!(
      decode_embedding(&EmbeddingPayload::Text("\"[0.25,-1.5,3.0]\"".into())).unwrap(),
      v
    );
    assert_eq!(decode_embedding(&EmbeddingPayload::Packed(encode_packed(&v))).unwrap(), v);
  }

  #[test]
  fn rejects_garbage() {
    assert!(decode_embedding(&EmbeddingPayload::Text("not a vector".into())).is_err());
    assert_eq!(
      decode_embedding(&EmbeddingPayload::Packed(vec![1, 2, 3])),
      Err(DecodeError::BlobSize(3))
    );
    assert_eq!(decode_embedding(&EmbeddingPayload::Text("[]".into())), Err(DecodeError::Empty));
  }

  #[test]
  fn cosine_identical_is_one() {
    let s = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
    assert!((s - 1.0).abs() < 1e-9);
    assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).is_none());
    assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).is_none());
  }

  #[test]
  fn top_k_are_the_k_most_similar_descending() {
    let query = [1.0_f32, 0.0];
    let source = Uuid::new_v4();
    // Angles spread across the first quadrant: similarity = cos(theta).
    let candidates: Vec<EmbeddingChunk> = (0..20)
      .map(|i| {
        let theta = (i as f32) * 0.07;
        chunk(source, EmbeddingPayload::Values(vec![theta.cos(), theta.sin()]))
      })
      .collect();

    let mut expected: Vec<(Uuid, f64)> = candidates
      .iter()
      .map(|c| {
        let v = decode_embedding(&c.embedding).unwrap();
        (c.chunk_id, cosine_similarity(&query, &v).unwrap())
      })
      .collect();
    expected.sort_by(|a, b| b.1.total_cmp(&a.1));
    expected.truncate(5);

    let limits = RetrievalLimits { per_source: None, total: 5, min_similarity: -1.0 };
    let ranking = rank(&query, candidates, &limits);

    let got: Vec<Uuid> = ranking.scored.iter().map(|c| c.chunk_id).collect();
    let want: Vec<Uuid> = expected.iter().map(|(id, _)| *id).collect();
    assert_eq!(got, want);
    assert!(ranking.scored.windows(2).all(|w| w[0].similarity >= w[1].similarity));
  }

  #[test]
  fn per_source_cap_spreads_results() {
    let query = [1.0_f32, 0.0];
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let mut candidates: Vec<EmbeddingChunk> =
      (0..5).map(|_| chunk(a, EmbeddingPayload::Values(vec![1.0, 0.0]))).collect();
    candidates.push(chunk(b, EmbeddingPayload::Values(vec![0.5, 0.5])));

    let limits = RetrievalLimits { per_source: Some(3), total: 10, min_similarity: 0.0 };
    let ranking = rank(&query, candidates, &limits);
    assert_eq!(ranking.scored.len(), 4);
    assert_eq!(ranking.scored.iter().filter(|c| c.source_id == a).count(), 3);
    assert_eq!(ranking.scored[3].source_id, b);
  }

  #[test]
  fn bad_chunks_are_skipped_not_fatal() {
    let query = [1.0_f32, 0.0];
    let s = Uuid::new_v4();
    let candidates = vec![
      chunk(s, EmbeddingPayload::Text("{oops".into())),
      chunk(s, EmbeddingPayload::Values(vec![1.0, 0.0, 0.0])),
      chunk(s, EmbeddingPayload::Values(vec![0.0, 0.0])),
      chunk(s, EmbeddingPayload::Values(vec![1.0, 0.1])),
    ];
    let ranking = rank(&query, candidates, &RetrievalLimits::default());
    assert_eq!(ranking.scored.len(), 1);
    assert_eq!(ranking.skipped.len(), 3);
    assert!(matches!(ranking.skipped[1].1, SkipReason::DimensionMismatch { expected: 2, found: 3 }));
    assert_eq!(ranking.skipped[2].1, SkipReason::ZeroNorm);
  }

  #[test]
  fn nothing_relevant_is_the_sentinel() {
    let query = [1.0_f32, 0.0];
    let candidates = vec![chunk(Uuid::new_v4(), EmbeddingPayload::Values(vec![-1.0, 0.0]))];
    let ranking = rank(&query, candidates, &RetrievalLimits::default());
    assert_eq!(RetrievedContext::from(ranking), RetrievedContext::NoRelevantContent);
    assert_eq!(
      RetrievedContext::from(Ranking::default()),
      RetrievedContext::NoRelevantContent
    );
  }
}
