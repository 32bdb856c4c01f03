//! Embedding model wrapper (C2).
//!
//! Wraps an all-MiniLM-L6-v2-family sentence embedding model for single-text
//! and batch embedding, applying the core's own L2 normalization afterward
//! (the inference backend's own normalization is left off so this step is
//! under the core's explicit control, matching the zero-norm guard below).

use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use crate::error::{CoreError, Result};

pub const EMBEDDING_DIM: usize = 384;
pub const INGESTION_BATCH_SIZE: usize = 32;

/// Thin wrapper around `fastembed::TextEmbedding` that owns the model handle
/// and applies unit-L2 normalization with a zero-norm guard.
pub struct Embedder {
    model: Mutex<TextEmbedding>,
}

impl Embedder {
    /// Load the embedding model. This is a one-time, potentially slow
    /// operation (model weights are fetched/cached on first use).
    pub fn new() -> Result<Self> {
        info!("loading embedding model: all-MiniLM-L6-v2");
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
        )
        .map_err(|e| CoreError::Internal(format!("failed to load embedding model: {e}")))?;
        info!(dimension = EMBEDDING_DIM, "embedding model loaded");
        Ok(Self {
            model: Mutex::new(model),
        })
    }

    /// Embed a single text, returning a unit-L2 384-dim vector.
    pub fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.encode_batch(&[text.to_string()], 1)?;
        Ok(batch.pop().unwrap_or_default())
    }

    /// Embed a batch of texts, returning one unit-L2 384-dim vector per input,
    /// in the same order.
    pub fn encode_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| CoreError::Internal("embedder lock poisoned".into()))?;

        let raw = model
            .embed(texts.to_vec(), Some(batch_size))
            .map_err(|e| CoreError::Internal(format!("embedding inference failed: {e}")))?;

        Ok(raw.into_iter().map(|v| l2_normalize(&v)).collect())
    }
}

/// Divide a vector by its L2 norm, leaving zero-norm vectors as zeros rather
/// than dividing by zero (which would otherwise produce NaN).
fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        vec![0.0; v.len()]
    } else {
        v.iter().map(|x| x / norm).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_zero_vector_stays_zero() {
        let v = vec![0.0_f32; 384];
        let out = l2_normalize(&v);
        assert!(out.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn l2_normalize_produces_unit_norm() {
        let v = vec![3.0_f32, 4.0];
        let out = l2_normalize(&v);
        let norm = out.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
