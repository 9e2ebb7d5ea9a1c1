//! The two network-bound collaborators: the evaluation service and the
//! embedding service.
//!
//! Both are the only suspension points in a turn. Implementations live in
//! `tutor-evaluator`; tests substitute scripted ones.

use std::future::Future;

use crate::prompt::EvaluationRequest;

/// Calls the external evaluation service once and returns its raw reply.
///
/// The reply is untrusted text; [`crate::reply::parse_reply`] validates it.
pub trait Evaluator: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn evaluate<'a>(
    &'a self,
    request: &'a EvaluationRequest,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;
}

/// Turns free text into a vector comparable with stored chunk embeddings.
pub trait Embedder: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn embed<'a>(
    &'a self,
    text: &'a str,
  ) -> impl Future<Output = Result<Vec<f32>, Self::Error>> + Send + 'a;
}
