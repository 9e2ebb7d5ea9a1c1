//! Connection settings, deserialised from the server's config file.

use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

fn default_base_url() -> String { DEFAULT_BASE_URL.to_owned() }
fn default_chat_model() -> String { "gpt-4o-mini".to_owned() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_owned() }
fn default_temperature() -> f64 { 0.2 }
fn default_max_tokens() -> u32 { 1500 }
fn default_timeout_secs() -> u64 { 60 }

/// The evaluation (chat completion) service.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluatorConfig {
  #[serde(default = "default_base_url")]
  pub base_url:     String,
  #[serde(default)]
  pub api_key:      Option<String>,
  #[serde(default = "default_chat_model")]
  pub model:        String,
  #[serde(default = "default_temperature")]
  pub temperature:  f64,
  #[serde(default = "default_max_tokens")]
  pub max_tokens:   u32,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for EvaluatorConfig {
  fn default() -> Self {
    Self {
      base_url:     default_base_url(),
      api_key:      None,
      model:        default_chat_model(),
      temperature:  default_temperature(),
      max_tokens:   default_max_tokens(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

/// The embedding service used to embed retrieval queries.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbedderConfig {
  #[serde(default = "default_base_url")]
  pub base_url:     String,
  #[serde(default)]
  pub api_key:      Option<String>,
  #[serde(default = "default_embedding_model")]
  pub model:        String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for EmbedderConfig {
  fn default() -> Self {
    Self {
      base_url:     default_base_url(),
      api_key:      None,
      model:        default_embedding_model(),
      timeout_secs: default_timeout_secs(),
    }
  }
}
