//! Retrieval Engine: embed the query and rank the assessment's chunks.

use tracing::{debug, warn};
use tutor_core::{
  retrieval::{rank, RetrievedContext},
  service::{Embedder, Evaluator},
};
use uuid::Uuid;

use crate::{
  engine::{Engine, TutorStore},
  error::{transient, Result},
};

impl<S, V, M> Engine<S, V, M>
where
  S: TutorStore,
  V: Evaluator,
  M: Embedder,
{
  /// Ground `query` in the assessment's completed sources.
  ///
  /// Never fails on content: bad chunks are skipped and an unavailable
  /// embedding service degrades to [`RetrievedContext::NoRelevantContent`].
  /// Only a storage failure is an error.
  pub(crate) async fn retrieve(&self, assessment_id: Uuid, query: &str) -> Result<RetrievedContext> {
    let candidates = self.store.candidate_chunks(assessment_id).await.map_err(transient)?;
    if candidates.is_empty() {
      debug!(%assessment_id, "no candidate chunks");
      return Ok(RetrievedContext::NoRelevantContent);
    }

    let query_vector = match self.embedder.embed(query).await {
      Ok(v) => v,
      Err(e) => {
        warn!(error = %e, "embedding service failed; continuing without source excerpts");
        return Ok(RetrievedContext::NoRelevantContent);
      }
    };

    let candidate_count = candidates.len();
    let ranking = rank(&query_vector, candidates, &self.config.retrieval);
    for (chunk_id, reason) in &ranking.skipped {
      warn!(%chunk_id, ?reason, "skipping unusable chunk");
    }
    debug!(
      candidates = candidate_count,
      kept = ranking.scored.len(),
      skipped = ranking.skipped.len(),
      "ranked source chunks"
    );

    Ok(ranking.into())
  }
}
