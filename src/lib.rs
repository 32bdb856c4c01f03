//! Clearpath core: a retrieval-augmented question-answering engine for a
//! document-grounded customer-support service.
//!
//! Documents are ingested into a flat inner-product vector index; queries
//! are classified, retrieved against, assembled into a prompt, and answered
//! by an upstream chat-completions model, with a non-blocking evaluator pass
//! and structured query logging throughout.
//!
//! # Example
//!
//! ```rust,no_run
//! use clearpath_core::config::AppConfig;
//! use clearpath_core::embedder::Embedder;
//! use clearpath_core::vector_store::VectorStore;
//! use clearpath_core::generation::GenerationClient;
//! use clearpath_core::log_writer::LogWriter;
//! use clearpath_core::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_file("clearpath.toml")?;
//!     let embedder = Embedder::new()?;
//!     let store = VectorStore::new(&config.index_dir);
//!     store.load().await?;
//!     let generation = GenerationClient::new(&config.groq_base_url, &config.groq_api_key);
//!     let logs = LogWriter::new(&config.log_file_path);
//!
//!     let pipeline = Pipeline {
//!         config: &config,
//!         embedder: &embedder,
//!         store: &store,
//!         generation: &generation,
//!         logs: &logs,
//!     };
//!
//!     let response = pipeline.run("What plans do you offer?").await?;
//!     println!("{}", response.answer);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod embedder;
pub mod error;
pub mod evaluator;
pub mod generation;
pub mod ingestion;
pub mod log_writer;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod router;
pub mod sanitize;
pub mod tokenizer;
pub mod vector_store;

pub use config::AppConfig;
pub use error::{CoreError, Result};
pub use pipeline::{Pipeline, PipelineEvent, QueryResponse};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with(char::is_numeric));
    }
}
