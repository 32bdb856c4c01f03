//! Batch-ingest every PDF in the configured directory.
//!
//! Usage:
//!   clearpath-ingest-all [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Path to configuration file (default: clearpath.toml)

use std::path::PathBuf;
use std::time::Instant;

use clearpath_core::config::AppConfig;
use clearpath_core::embedder::Embedder;
use clearpath_core::ingestion::ingest_pdf;
use clearpath_core::vector_store::VectorStore;

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

    let config = AppConfig::from_file(parse_config_path())?;
    let pdf_dir = PathBuf::from(&config.pdf_dir);

    if !pdf_dir.exists() {
        println!("Directory {} does not exist.", pdf_dir.display());
        return Ok(());
    }

    let mut pdf_files: Vec<PathBuf> = std::fs::read_dir(&pdf_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("pdf"))
        .collect();
    pdf_files.sort();

    if pdf_files.is_empty() {
        println!("No PDF files found in {}.", pdf_dir.display());
        return Ok(());
    }

    println!("Found {} PDF files. Starting ingestion...", pdf_files.len());

    let embedder = Embedder::new()?;
    let store = VectorStore::new(&config.index_dir);
    store.load().await?;

    let total_start = Instant::now();
    for (i, path) in pdf_files.iter().enumerate() {
        let filename = path.file_name().unwrap_or_default().to_string_lossy();
        print!("[{}/{}] Ingesting {}...", i + 1, pdf_files.len(), filename);

        let start = Instant::now();
        match ingest_pdf(&embedder, &store, path).await {
            Ok(ids) => {
                println!(" Done! ({} chunks, {:.2}s)", ids.len(), start.elapsed().as_secs_f64());
            }
            Err(e) => {
                println!(" Failed! Error: {e}");
            }
        }
    }

    println!("\nIngestion complete. Total time: {:.2}s", total_start.elapsed().as_secs_f64());
    Ok(())
}
