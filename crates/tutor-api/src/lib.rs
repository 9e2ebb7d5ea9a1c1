//! JSON REST API for the conversation engine.
//!
//! Exposes an axum [`Router`] backed by any [`Engine`]. Auth, TLS, and
//! transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", tutor_api::api_router(engine.clone()))
//! ```

pub mod attempts;
pub mod conversation;
pub mod error;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use tutor_core::service::{Embedder, Evaluator};
use tutor_engine::{Engine, TutorStore};

pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
pub fn api_router<S, V, M>(engine: Arc<Engine<S, V, M>>) -> Router<()>
where
  S: TutorStore + 'static,
  V: Evaluator + 'static,
  M: Embedder + 'static,
{
  Router::new()
    // Conversations
    .route(
      "/assessments/{id}/conversation",
      get(conversation::get::<S, V, M>).post(conversation::submit::<S, V, M>),
    )
    .route("/assessments/{id}/conversation/retry", post(conversation::retry::<S, V, M>))
    // Attempts
    .route("/attempts/{id}", get(attempts::get_one::<S, V, M>))
    .route("/attempts/{id}/results", get(attempts::results::<S, V, M>))
    .with_state(engine)
}
