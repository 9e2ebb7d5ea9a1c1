//! The embedding service, used to embed the retrieval query.

use serde::{Deserialize, Serialize};
use tracing::instrument;
use tutor_core::service::Embedder;

use crate::{EmbedderConfig, Result, ServiceError, client::HttpClient};

const EMBEDDINGS_PATH: &str = "/v1/embeddings";

/// [`Embedder`] backed by an OpenAI-compatible embeddings endpoint.
#[derive(Clone)]
pub struct EmbeddingClient {
  http:  HttpClient,
  model: String,
}

impl EmbeddingClient {
  pub fn new(config: EmbedderConfig) -> Result<Self> {
    let http = HttpClient::new(&config.base_url, config.api_key, config.timeout_secs)?;
    Ok(Self { http, model: config.model })
  }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
  #[serde(default)]
  data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
  embedding: Vec<f32>,
}

impl Embedder for EmbeddingClient {
  type Error = ServiceError;

  #[instrument(skip_all, fields(model = %self.model, chars = text.len()))]
  async fn embed<'a>(&'a self, text: &'a str) -> Result<Vec<f32>> {
    let body = EmbeddingRequest { model: &self.model, input: text };
    let response: EmbeddingResponse = self.http.post_json(EMBEDDINGS_PATH, &body).await?;
    response
      .data
      .into_iter()
      .next()
      .map(|d| d.embedding)
      .filter(|v| !v.is_empty())
      .ok_or(ServiceError::EmptyResponse)
  }
}
