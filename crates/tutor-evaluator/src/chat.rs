//! The evaluation service: one chat completion per turn, JSON output.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use tutor_core::{prompt::EvaluationRequest, service::Evaluator};

use crate::{EvaluatorConfig, Result, ServiceError, client::HttpClient};

const CHAT_PATH: &str = "/v1/chat/completions";

/// [`Evaluator`] backed by an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct ChatEvaluator {
  http:   HttpClient,
  config: EvaluatorConfig,
}

impl ChatEvaluator {
  pub fn new(config: EvaluatorConfig) -> Result<Self> {
    let http = HttpClient::new(&config.base_url, config.api_key.clone(), config.timeout_secs)?;
    Ok(Self { http, config })
  }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
  model:           &'a str,
  temperature:     f64,
  max_tokens:      u32,
  response_format: ResponseFormat,
  messages:        [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ResponseFormat {
  #[serde(rename = "type")]
  kind: &'static str,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
  role:    &'static str,
  content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
  #[serde(default)]
  choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
  message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
  #[serde(default)]
  content: Option<String>,
}

impl Evaluator for ChatEvaluator {
  type Error = ServiceError;

  #[instrument(skip_all, fields(model = %self.config.model))]
  async fn evaluate<'a>(&'a self, request: &'a EvaluationRequest) -> Result<String> {
    let body = ChatRequest {
      model:           &self.config.model,
      temperature:     self.config.temperature,
      max_tokens:      self.config.max_tokens,
      response_format: ResponseFormat { kind: "json_object" },
      messages:        [
        ChatMessage { role: "system", content: &request.system },
        ChatMessage { role: "user", content: &request.user },
      ],
    };

    let response: ChatResponse = self.http.post_json(CHAT_PATH, &body).await?;
    let content = response
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .filter(|c| !c.trim().is_empty())
      .ok_or(ServiceError::EmptyResponse)?;

    debug!(bytes = content.len(), "evaluator replied");
    Ok(content)
  }
}
