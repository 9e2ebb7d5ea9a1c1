//! tutor-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, and either serves the conversation API over
//! HTTP or imports a catalog bundle.
//!
//! ```text
//! tutor-server serve
//! tutor-server import assessment.json
//! ```

mod settings;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tutor_core::assessment::CatalogBundle;
use tutor_engine::Engine;
use tutor_evaluator::{ChatEvaluator, EmbeddingClient};
use tutor_store_sqlite::SqliteStore;

use crate::settings::{ServerConfig, expand_tilde};

#[derive(Parser)]
#[command(author, version, about = "Assessment tutor conversation server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API.
  Serve,
  /// Load an assessment bundle (JSON) into the store.
  Import {
    /// Path to the bundle file.
    bundle: PathBuf,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let server_cfg = ServerConfig::load(&cli.config)?;

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Import { bundle } => import(&store, &bundle).await,
    Command::Serve => serve(store, server_cfg).await,
  }
}

async fn import(store: &SqliteStore, path: &Path) -> anyhow::Result<()> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read {}", path.display()))?;
  let bundle: CatalogBundle =
    serde_json::from_str(&raw).with_context(|| format!("invalid bundle {}", path.display()))?;
  let assessment_id = bundle.assessment.assessment_id;

  let summary = store.import_bundle(bundle).await.context("import failed")?;
  tracing::info!(
    %assessment_id,
    skills = summary.skills,
    levels = summary.levels,
    sources = summary.sources,
    chunks = summary.chunks,
    "bundle imported"
  );
  Ok(())
}

async fn serve(store: SqliteStore, server_cfg: ServerConfig) -> anyhow::Result<()> {
  let evaluator = ChatEvaluator::new(server_cfg.evaluator.clone())
    .context("failed to build evaluation client")?;
  let embedder = EmbeddingClient::new(server_cfg.embedder.clone())
    .context("failed to build embedding client")?;
  let engine = Arc::new(Engine::new(store, evaluator, embedder, server_cfg.engine.clone()));

  let app = tutor_api::api_router(engine).layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
