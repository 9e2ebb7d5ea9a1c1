//! Handlers for `/attempts` endpoints.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use tutor_core::{
  attempt::Attempt,
  service::{Embedder, Evaluator},
};
use tutor_engine::{Completion, Engine, TutorStore};
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /attempts/{id}`
pub async fn get_one<S, V, M>(
  State(engine): State<Arc<Engine<S, V, M>>>,
  Path(attempt_id): Path<Uuid>,
) -> Result<Json<Attempt>, ApiError>
where
  S: TutorStore,
  V: Evaluator,
  M: Embedder,
{
  Ok(Json(engine.attempt(attempt_id).await?))
}

/// `GET /attempts/{id}/results`: 404 until the attempt is completed.
pub async fn results<S, V, M>(
  State(engine): State<Arc<Engine<S, V, M>>>,
  Path(attempt_id): Path<Uuid>,
) -> Result<Json<Completion>, ApiError>
where
  S: TutorStore,
  V: Evaluator,
  M: Embedder,
{
  Ok(Json(engine.results(attempt_id).await?))
}
