//! Flat inner-product vector index with a parallel metadata sidecar (C3).
//!
//! No approximate nearest-neighbour structure: search is an exhaustive dot
//! product scan. Since inputs are unit-L2-normalized, this is equivalent to
//! cosine similarity.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};

pub const DIMENSION: usize = 384;
const INDEX_FILE_NAME: &str = "index.faiss";
const SIDECAR_FILE_NAME: &str = "index.pkl";
const MAGIC: &[u8; 4] = b"CPVI";

/// A Chunk as stored in the metadata sidecar (no embedding — that lives only
/// in the vector index).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMeta {
    pub chunk_id: String,
    pub text: String,
    pub source_file: String,
    pub page_number: usize,
    pub chunk_index: usize,
}

/// A Chunk plus its embedding, as produced by ingestion before it is added to
/// the store.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub text: String,
    pub source_file: String,
    pub page_number: usize,
    pub chunk_index: usize,
    pub embedding: Vec<f32>,
}

impl NewChunk {
    pub fn new(
        text: String,
        source_file: String,
        page_number: usize,
        chunk_index: usize,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            text,
            source_file,
            page_number,
            chunk_index,
            embedding,
        }
    }
}

/// A search hit: the stored metadata plus a similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub text: String,
    pub source_file: String,
    pub page_number: usize,
    pub chunk_index: usize,
    pub score: f32,
}

struct Inner {
    vectors: Vec<Vec<f32>>,
    metadata: Vec<ChunkMeta>,
    loaded: bool,
}

impl Inner {
    fn empty() -> Self {
        Self {
            vectors: Vec::new(),
            metadata: Vec::new(),
            loaded: true,
        }
    }
}

/// The process-wide vector store: a flat index plus its metadata sidecar,
/// guarded by a single readers-writer lock so that `sidecar.len() ==
/// vectors.len()` is always observed by readers.
pub struct VectorStore {
    dir: PathBuf,
    inner: RwLock<Inner>,
}

impl VectorStore {
    /// Construct a store bound to `dir` without touching disk. Call `load()`
    /// before serving traffic.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            inner: RwLock::new(Inner {
                vectors: Vec::new(),
                metadata: Vec::new(),
                loaded: false,
            }),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE_NAME)
    }

    fn sidecar_path(&self) -> PathBuf {
        self.dir.join(SIDECAR_FILE_NAME)
    }

    /// Load the persisted pair from disk if present; otherwise initialize an
    /// empty index. Idempotent — repeated calls are a no-op once loaded.
    pub async fn load(&self) -> Result<()> {
        {
            let inner = self.inner.read().await;
            if inner.loaded {
                return Ok(());
            }
        }

        let index_path = self.index_path();
        let sidecar_path = self.sidecar_path();

        if !index_path.exists() || !sidecar_path.exists() {
            info!(
                dir = %self.dir.display(),
                "no persisted vector index found, starting with an empty index"
            );
            let mut inner = self.inner.write().await;
            *inner = Inner::empty();
            return Ok(());
        }

        let (dimension, vectors) = read_index_file(&index_path)?;
        if dimension != DIMENSION {
            return Err(CoreError::DimensionMismatch {
                expected: DIMENSION,
                actual: dimension,
            });
        }

        let raw = std::fs::read(&sidecar_path)?;
        let metadata: Vec<ChunkMeta> = serde_json::from_slice(&raw)?;

        if metadata.len() != vectors.len() {
            return Err(CoreError::Internal(format!(
                "metadata sidecar length {} does not match index vector count {}",
                metadata.len(),
                vectors.len()
            )));
        }

        info!(
            chunks = vectors.len(),
            dimension, "vector index loaded from disk"
        );

        let mut inner = self.inner.write().await;
        inner.vectors = vectors;
        inner.metadata = metadata;
        inner.loaded = true;
        Ok(())
    }

    /// Append new chunks, validating embedding dimensions. The i-th appended
    /// embedding's internal id equals its resulting sidecar position.
    pub async fn add(&self, records: Vec<NewChunk>) -> Result<Vec<String>> {
        let mut inner = self.inner.write().await;
        let mut ids = Vec::with_capacity(records.len());

        for record in &records {
            if record.embedding.len() != DIMENSION {
                return Err(CoreError::DimensionMismatch {
                    expected: DIMENSION,
                    actual: record.embedding.len(),
                });
            }
        }

        for record in records {
            let chunk_id = Uuid::new_v4().to_string();
            inner.vectors.push(record.embedding);
            inner.metadata.push(ChunkMeta {
                chunk_id: chunk_id.clone(),
                text: record.text,
                source_file: record.source_file,
                page_number: record.page_number,
                chunk_index: record.chunk_index,
            });
            ids.push(chunk_id);
        }

        Ok(ids)
    }

    /// Exact top-k inner-product search. Returns an empty list when the index
    /// is empty; never returns more than `k` results.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if query.len() != DIMENSION {
            return Err(CoreError::DimensionMismatch {
                expected: DIMENSION,
                actual: query.len(),
            });
        }

        let inner = self.inner.read().await;
        if inner.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = inner
            .vectors
            .iter()
            .enumerate()
            .map(|(id, v)| (id, dot(query, v)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .filter_map(|(id, score)| {
                inner.metadata.get(id).map(|meta| ScoredChunk {
                    chunk_id: meta.chunk_id.clone(),
                    text: meta.text.clone(),
                    source_file: meta.source_file.clone(),
                    page_number: meta.page_number,
                    chunk_index: meta.chunk_index,
                    score,
                })
            })
            .collect())
    }

    /// Persist the index and sidecar to disk atomically (write-to-temp then
    /// rename). Existing files are left untouched on failure; in-memory state
    /// is never rolled back.
    pub async fn persist(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let inner = self.inner.read().await;

        write_atomic(&self.index_path(), |f| {
            write_index_file(f, DIMENSION, &inner.vectors)
        })?;
        write_atomic(&self.sidecar_path(), |f| {
            let json = serde_json::to_vec(&inner.metadata)?;
            f.write_all(&json)?;
            Ok(())
        })?;

        Ok(())
    }

    pub async fn get_total_chunks(&self) -> usize {
        self.inner.read().await.vectors.len()
    }

    pub fn get_dimension(&self) -> usize {
        DIMENSION
    }

    pub async fn is_loaded(&self) -> bool {
        self.inner.read().await.loaded
    }

    /// First three metadata entries, used by the index-validation CLI tool.
    pub async fn sample_metadata(&self, n: usize) -> Vec<ChunkMeta> {
        self.inner
            .read()
            .await
            .metadata
            .iter()
            .take(n)
            .cloned()
            .collect()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn write_atomic(path: &Path, write_fn: impl FnOnce(&mut std::fs::File) -> Result<()>) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        write_fn(&mut file)?;
        file.flush()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn write_index_file(file: &mut std::fs::File, dimension: usize, vectors: &[Vec<f32>]) -> Result<()> {
    file.write_all(MAGIC)?;
    file.write_all(&(dimension as u32).to_le_bytes())?;
    file.write_all(&(vectors.len() as u64).to_le_bytes())?;
    for vector in vectors {
        for component in vector {
            file.write_all(&component.to_le_bytes())?;
        }
    }
    Ok(())
}

fn read_index_file(path: &Path) -> Result<(usize, Vec<Vec<f32>>)> {
    let bytes = std::fs::read(path)?;
    if bytes.len() < 16 || &bytes[0..4] != MAGIC {
        return Err(CoreError::Internal("malformed vector index file".into()));
    }

    let dimension = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let count = u64::from_le_bytes(bytes[8..16].try_into().unwrap()) as usize;

    let mut vectors = Vec::with_capacity(count);
    let mut offset = 16;
    for _ in 0..count {
        let mut vector = Vec::with_capacity(dimension);
        for _ in 0..dimension {
            if offset + 4 > bytes.len() {
                return Err(CoreError::Internal("truncated vector index file".into()));
            }
            let component = f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
            vector.push(component);
            offset += 4;
        }
        vectors.push(vector);
    }

    Ok((dimension, vectors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn unit_vector(pos: usize, dim: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[pos % dim] = 1.0;
        v
    }

    fn chunk(text: &str, dim_vec: Vec<f32>) -> NewChunk {
        NewChunk::new(text.to_string(), "doc.pdf".to_string(), 1, 0, dim_vec)
    }

    #[tokio::test]
    async fn add_and_search_returns_nearest_first() {
        let dir = tempdir().unwrap();
        let store = VectorStore::new(dir.path());
        store.load().await.unwrap();

        let a = unit_vector(0, DIMENSION);
        let b = unit_vector(1, DIMENSION);
        store
            .add(vec![chunk("alpha", a.clone()), chunk("beta", b.clone())])
            .await
            .unwrap();

        let results = store.search(&a, 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "alpha");
    }

    #[tokio::test]
    async fn search_on_empty_index_returns_empty() {
        let dir = tempdir().unwrap();
        let store = VectorStore::new(dir.path());
        store.load().await.unwrap();

        let probe = unit_vector(0, DIMENSION);
        let results = store.search(&probe, 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn add_rejects_wrong_dimension() {
        let dir = tempdir().unwrap();
        let store = VectorStore::new(dir.path());
        store.load().await.unwrap();

        let bad = chunk("oops", vec![0.0; 10]);
        let err = store.add(vec![bad]).await.unwrap_err();
        assert!(matches!(err, CoreError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn persist_then_reload_round_trips() {
        let dir = tempdir().unwrap();
        let store = VectorStore::new(dir.path());
        store.load().await.unwrap();

        let a = unit_vector(0, DIMENSION);
        store.add(vec![chunk("alpha", a.clone())]).await.unwrap();
        store.persist().await.unwrap();

        let reloaded = VectorStore::new(dir.path());
        reloaded.load().await.unwrap();

        assert_eq!(reloaded.get_total_chunks().await, 1);
        let results = reloaded.search(&a, 1).await.unwrap();
        assert_eq!(results[0].text, "alpha");
    }

    #[tokio::test]
    async fn sidecar_length_matches_vector_count() {
        let dir = tempdir().unwrap();
        let store = VectorStore::new(dir.path());
        store.load().await.unwrap();

        store
            .add(vec![
                chunk("one", unit_vector(0, DIMENSION)),
                chunk("two", unit_vector(1, DIMENSION)),
            ])
            .await
            .unwrap();

        let inner = store.inner.read().await;
        assert_eq!(inner.vectors.len(), inner.metadata.len());
    }

    #[tokio::test]
    async fn load_with_mismatched_dimension_fails() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(SIDECAR_FILE_NAME), b"[]").unwrap();

        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&256u32.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        std::fs::write(dir.path().join(INDEX_FILE_NAME), bytes).unwrap();

        let store = VectorStore::new(dir.path());
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, CoreError::DimensionMismatch { .. }));
    }
}
