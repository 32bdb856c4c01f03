//! Verify vector index integrity.
//!
//! Usage:
//!   clearpath-validate-index [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Path to configuration file (default: clearpath.toml)

use std::path::PathBuf;
use std::process::ExitCode;

use clearpath_core::config::AppConfig;
use clearpath_core::vector_store::{VectorStore, DIMENSION};

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
async fn main() -> anyhow::Result<ExitCode> {
    let config = AppConfig::from_file(parse_config_path())?;
    let index_dir = PathBuf::from(&config.index_dir);

    println!("Validating vector index at: {}", index_dir.display());
    println!("{}", "-".repeat(60));

    let index_file = index_dir.join("index.faiss");
    let sidecar_file = index_dir.join("index.pkl");

    if !index_file.exists() {
        println!("[FAIL] index.faiss not found at: {}", index_file.display());
        println!("       Run the ingestion pipeline first to create the index.");
        return Ok(ExitCode::FAILURE);
    }
    if !sidecar_file.exists() {
        println!("[FAIL] index.pkl not found at: {}", sidecar_file.display());
        println!("       Metadata sidecar is missing -- re-ingest all documents.");
        return Ok(ExitCode::FAILURE);
    }

    println!(
        "[OK]   index.faiss exists ({} bytes)",
        std::fs::metadata(&index_file)?.len()
    );
    println!(
        "[OK]   index.pkl exists    ({} bytes)",
        std::fs::metadata(&sidecar_file)?.len()
    );

    let store = VectorStore::new(&index_dir);
    if let Err(e) = store.load().await {
        println!("[FAIL] Failed to load vector index: {e}");
        return Ok(ExitCode::FAILURE);
    }

    let dimension = store.get_dimension();
    if dimension != DIMENSION {
        println!("[FAIL] Dimension mismatch: expected {DIMENSION}, got {dimension}.");
        println!("       Re-ingest all documents to rebuild with correct embeddings.");
        return Ok(ExitCode::FAILURE);
    }
    println!("[OK]   Dimensionality: {dimension} (matches expected {DIMENSION})");

    let total = store.get_total_chunks().await;
    println!("[OK]   Chunk metadata entries: {total}");

    if total > 0 {
        println!("\nSample metadata (first 3 entries):");
        for (i, entry) in store.sample_metadata(3).await.iter().enumerate() {
            println!(
                "  [{i}] chunk_id={:?}  source={:?}  page={}",
                entry.chunk_id, entry.source_file, entry.page_number
            );
        }
    }

    println!("\n[PASS] Vector index is valid and ready.");
    Ok(ExitCode::SUCCESS)
}
