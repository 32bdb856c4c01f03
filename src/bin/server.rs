//! Clearpath API server.
//!
//! Usage:
//!   clearpath-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Path to configuration file (default: clearpath.toml)

use std::path::PathBuf;
use std::sync::Arc;

use clearpath_core::api::{start_server, AppState};
use clearpath_core::config::AppConfig;
use clearpath_core::embedder::Embedder;
use clearpath_core::error::CoreError;
use clearpath_core::generation::GenerationClient;
use clearpath_core::log_writer::LogWriter;
use clearpath_core::vector_store::VectorStore;
use tracing::info;

fn parse_config_path() -> PathBuf {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return PathBuf::from(path);
            }
        }
    }
    PathBuf::from("clearpath.toml")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = parse_config_path();
    let config = AppConfig::from_file(&config_path)?;
    info!(config_path = %config_path.display(), "configuration loaded");

    let embedder = Embedder::new()?;

    let store = VectorStore::new(&config.index_dir);
    store.load().await.map_err(|e| {
        if let CoreError::DimensionMismatch { expected, actual } = &e {
            tracing::error!(
                expected,
                actual,
                "persisted index dimension mismatch, refusing to start"
            );
        }
        e
    })?;

    let generation = GenerationClient::new(config.groq_base_url.clone(), config.groq_api_key.clone());
    let logs = LogWriter::new(config.log_file_path.clone());

    let state = AppState {
        config: Arc::new(config.clone()),
        embedder: Arc::new(embedder),
        store: Arc::new(store),
        generation: Arc::new(generation),
        logs: Arc::new(logs),
    };

    start_server(state, &config.host, config.port).await?;
    Ok(())
}
