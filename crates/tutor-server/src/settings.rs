//! Runtime configuration, layered from `config.toml` and `TUTOR__*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use tutor_engine::EngineConfig;
use tutor_evaluator::{EmbedderConfig, EvaluatorConfig};

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/tutor/tutor.db") }

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default)]
  pub evaluator:  EvaluatorConfig,
  #[serde(default)]
  pub embedder:   EmbedderConfig,
  #[serde(default)]
  pub engine:     EngineConfig,
}

impl ServerConfig {
  /// Read `path` (if it exists) and overlay the environment, e.g.
  /// `TUTOR__EVALUATOR__API_KEY`.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("TUTOR")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use config::{Config, File, FileFormat};

  use super::*;

  fn parse(toml: &str) -> ServerConfig {
    Config::builder()
      .add_source(File::from_str(toml, FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn empty_file_uses_defaults() {
    let cfg = parse("");
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.engine.questions_per_skill, 3);
    assert_eq!(cfg.engine.finish_sentinel, "[finish]");
    assert_eq!(cfg.engine.retrieval.total, 10);
    assert_eq!(cfg.evaluator.model, "gpt-4o-mini");
  }

  #[test]
  fn nested_tables_override_defaults() {
    let cfg = parse(
      r#"
        port = 9000

        [evaluator]
        base_url = "http://localhost:11434"
        model    = "llama3"

        [engine]
        questions_per_skill = 4

        [engine.retrieval]
        per_source     = 2
        min_similarity = 0.3
      "#,
    );
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.evaluator.base_url, "http://localhost:11434");
    assert_eq!(cfg.evaluator.timeout_secs, 60);
    assert_eq!(cfg.engine.questions_per_skill, 4);
    assert_eq!(cfg.engine.retrieval.per_source, Some(2));
    assert_eq!(cfg.engine.retrieval.total, 10);
    assert_eq!(cfg.engine.grading.neutral_grade, 3.0);
  }

  #[test]
  fn tilde_expands_against_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/db.sqlite")), PathBuf::from(home).join("db.sqlite"));
    assert_eq!(expand_tilde(Path::new("/abs/db")), PathBuf::from("/abs/db"));
  }
}
