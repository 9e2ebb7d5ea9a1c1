//! Handlers for `/assessments/{id}/conversation` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/assessments/{id}/conversation` | `?student_id` required; empty list if no attempt |
//! | `POST` | `/assessments/{id}/conversation` | Body: [`SubmitBody`]; runs one turn |
//! | `POST` | `/assessments/{id}/conversation/retry` | Body: [`RetryBody`]; re-runs the unanswered turn |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use tutor_core::{
  attempt::ConversationMessage,
  service::{Embedder, Evaluator},
};
use tutor_engine::{Engine, SubmissionOutcome, TutorStore};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Read ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ConversationParams {
  pub student_id: Uuid,
}

/// `GET /assessments/{id}/conversation?student_id=<id>`
pub async fn get<S, V, M>(
  State(engine): State<Arc<Engine<S, V, M>>>,
  Path(assessment_id): Path<Uuid>,
  Query(params): Query<ConversationParams>,
) -> Result<Json<Vec<ConversationMessage>>, ApiError>
where
  S: TutorStore,
  V: Evaluator,
  M: Embedder,
{
  let messages = engine.conversation(assessment_id, params.student_id).await?;
  Ok(Json(messages))
}

// ─── Submit ──────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /assessments/{id}/conversation`.
#[derive(Debug, Deserialize)]
pub struct SubmitBody {
  pub student_id: Uuid,
  pub message:    String,
}

/// `POST /assessments/{id}/conversation`
pub async fn submit<S, V, M>(
  State(engine): State<Arc<Engine<S, V, M>>>,
  Path(assessment_id): Path<Uuid>,
  Json(body): Json<SubmitBody>,
) -> Result<Json<SubmissionOutcome>, ApiError>
where
  S: TutorStore,
  V: Evaluator,
  M: Embedder,
{
  let outcome = engine.submit(assessment_id, body.student_id, &body.message).await?;
  Ok(Json(outcome))
}

// ─── Retry ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RetryBody {
  pub student_id: Uuid,
}

/// `POST /assessments/{id}/conversation/retry`
pub async fn retry<S, V, M>(
  State(engine): State<Arc<Engine<S, V, M>>>,
  Path(assessment_id): Path<Uuid>,
  Json(body): Json<RetryBody>,
) -> Result<Json<SubmissionOutcome>, ApiError>
where
  S: TutorStore,
  V: Evaluator,
  M: Embedder,
{
  let outcome = engine.retry(assessment_id, body.student_id).await?;
  Ok(Json(outcome))
}
