//! Structured query log writer (C11): append-only JSONL, one object per
//! line. No rotation or retention — out of scope.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::error;
use utoipa::ToSchema;

use crate::error::Result;

/// A single structured log entry, matching the fixed query-log schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct LogEntry {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub classification: String,
    pub model_used: String,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub latency_ms: f64,
    pub retrieval_count: usize,
    pub retrieval_scores: Vec<f32>,
    pub evaluator_flags: Vec<String>,
    pub error: Option<String>,
}

/// Append-only JSONL query logger. Writers are serialized through an async
/// mutex so concurrent appends never interleave within a line.
pub struct LogWriter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LogWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Append one log entry. Failures are logged and swallowed — a logging
    /// fault must never fail the query it is describing.
    pub async fn append(&self, entry: &LogEntry) {
        if let Err(e) = self.try_append(entry).await {
            error!(request_id = %entry.request_id, error = %e, "failed to write query log entry");
        }
    }

    async fn try_append(&self, entry: &LogEntry) -> Result<()> {
        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Read and parse every entry in file order, silently skipping malformed
    /// lines.
    pub async fn get_all_logs(&self) -> Result<Vec<LogEntry>> {
        read_all(&self.path).await
    }

    /// The last `n` entries, most recent first.
    pub async fn get_recent_logs(&self, n: usize) -> Result<Vec<LogEntry>> {
        let all = read_all(&self.path).await?;
        let start = all.len().saturating_sub(n);
        Ok(all[start..].iter().rev().cloned().collect())
    }
}

async fn read_all(path: &Path) -> Result<Vec<LogEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let contents = tokio::fs::read_to_string(path).await?;
    Ok(contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<LogEntry>(line).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_entry(request_id: &str) -> LogEntry {
        LogEntry {
            request_id: request_id.to_string(),
            timestamp: Utc::now(),
            query: "what is clearpath?".to_string(),
            classification: "simple".to_string(),
            model_used: "llama-3.1-8b-instant".to_string(),
            tokens_input: 120,
            tokens_output: 40,
            latency_ms: 532.1,
            retrieval_count: 3,
            retrieval_scores: vec![0.8, 0.6, 0.4],
            evaluator_flags: vec![],
            error: None,
        }
    }

    #[tokio::test]
    async fn append_then_read_all_round_trips() {
        let dir = tempdir().unwrap();
        let writer = LogWriter::new(dir.path().join("queries.jsonl"));

        writer.append(&sample_entry("req-1")).await;
        writer.append(&sample_entry("req-2")).await;

        let all = writer.get_all_logs().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].request_id, "req-1");
        assert_eq!(all[1].request_id, "req-2");
    }

    #[tokio::test]
    async fn recent_logs_are_reverse_chronological() {
        let dir = tempdir().unwrap();
        let writer = LogWriter::new(dir.path().join("queries.jsonl"));

        for i in 0..5 {
            writer.append(&sample_entry(&format!("req-{i}"))).await;
        }

        let recent = writer.get_recent_logs(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].request_id, "req-4");
        assert_eq!(recent[1].request_id, "req-3");
    }

    #[tokio::test]
    async fn missing_file_returns_empty_list() {
        let dir = tempdir().unwrap();
        let writer = LogWriter::new(dir.path().join("nonexistent.jsonl"));
        assert!(writer.get_all_logs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queries.jsonl");
        tokio::fs::write(&path, "not json\n").await.unwrap();

        let writer = LogWriter::new(&path);
        writer.append(&sample_entry("req-ok")).await;

        let all = writer.get_all_logs().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].request_id, "req-ok");
    }
}
