//! HTTP clients for the external services the engine calls each turn.
//!
//! Both speak the OpenAI-compatible wire format: [`ChatEvaluator`] posts to
//! `/v1/chat/completions` and [`EmbeddingClient`] to `/v1/embeddings`.

mod chat;
mod client;
mod config;
mod embeddings;

pub mod error;

pub use chat::ChatEvaluator;
pub use config::{EmbedderConfig, EvaluatorConfig};
pub use embeddings::EmbeddingClient;
pub use error::{Result, ServiceError};
