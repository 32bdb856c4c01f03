//! Pipeline orchestrator (C10): wires C5–C9 into the non-streaming and
//! streaming query paths, timing, and structured logging.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::embedder::Embedder;
use crate::error::Result;
use crate::evaluator::evaluate_output;
use crate::generation::{GenerationClient, StreamEvent};
use crate::log_writer::{LogEntry, LogWriter};
use crate::prompt::assemble_prompt;
use crate::retriever::{retrieve, RetrievedChunk, DEFAULT_THRESHOLD, DEFAULT_TOP_K};
use crate::router::{classify, Classification};
use crate::vector_store::VectorStore;

const SIMPLE_MAX_TOKENS: u32 = 512;
const COMPLEX_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Source {
    pub source_file: String,
    pub page_number: usize,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DebugInfo {
    pub classification: String,
    pub model_used: String,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub latency_ms: f64,
    pub retrieval_count: usize,
    pub evaluator_flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueryResponse {
    pub request_id: String,
    pub answer: String,
    pub sources: Vec<Source>,
    pub debug: DebugInfo,
}

fn sources_from(chunks: &[RetrievedChunk]) -> Vec<Source> {
    chunks
        .iter()
        .map(|c| Source {
            source_file: c.source_file.clone(),
            page_number: c.page_number,
            score: c.score,
        })
        .collect()
}

fn model_and_budget(classification: Classification, config: &AppConfig) -> (String, u32) {
    match classification {
        Classification::Simple => (config.simple_model.clone(), SIMPLE_MAX_TOKENS),
        Classification::Complex => (config.complex_model.clone(), COMPLEX_MAX_TOKENS),
    }
}

/// The assembled process-wide dependencies a pipeline run needs. `logs` is
/// borrowed as an `Arc` (rather than a plain reference) so a cancellation
/// guard can clone an owned, `'static` handle to finish a log write after
/// the borrow that produced it has gone away.
pub struct Pipeline<'a> {
    pub config: &'a AppConfig,
    pub embedder: &'a Embedder,
    pub store: &'a VectorStore,
    pub generation: &'a GenerationClient,
    pub logs: &'a Arc<LogWriter>,
}

/// Guards a streaming query's log entry against the consumer dropping the
/// stream before it completes. Armed on construction; `disarm()` once the
/// normal completion/error path has already appended its own log entry. If
/// still armed when dropped, records a single partial-state entry so every
/// query attempt still writes exactly one log line.
struct CancellationGuard {
    armed: bool,
    logs: Arc<LogWriter>,
    request_id: String,
    query: String,
    classification: Classification,
    model_used: String,
    started: Instant,
}

impl CancellationGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancellationGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let entry = LogEntry {
            request_id: self.request_id.clone(),
            timestamp: chrono::Utc::now(),
            query: self.query.clone(),
            classification: self.classification.as_str().to_string(),
            model_used: self.model_used.clone(),
            tokens_input: 0,
            tokens_output: 0,
            latency_ms: self.started.elapsed().as_secs_f64() * 1000.0,
            retrieval_count: 0,
            retrieval_scores: vec![],
            evaluator_flags: vec![],
            error: Some("stream cancelled before completion".to_string()),
        };
        let logs = self.logs.clone();
        tokio::spawn(async move {
            logs.append(&entry).await;
        });
    }
}

impl<'a> Pipeline<'a> {
    /// Run the full non-streaming query sequence: classify, retrieve, assemble, generate, evaluate, log.
    pub async fn run(&self, query: &str) -> Result<QueryResponse> {
        let request_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let query = query.trim();

        let classification = classify(query);
        let (model_used, max_tokens) = model_and_budget(classification, self.config);

        let result = self.run_inner(query, &model_used, max_tokens).await;

        match result {
            Ok((answer, chunks, tokens_input, tokens_output)) => {
                let flags = evaluate_output(
                    &answer,
                    chunks.len(),
                    &chunks.iter().map(|c| c.text.clone()).collect::<Vec<_>>(),
                );
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

                self.logs
                    .append(&LogEntry {
                        request_id: request_id.clone(),
                        timestamp: chrono::Utc::now(),
                        query: query.to_string(),
                        classification: classification.as_str().to_string(),
                        model_used: model_used.clone(),
                        tokens_input,
                        tokens_output,
                        latency_ms,
                        retrieval_count: chunks.len(),
                        retrieval_scores: chunks.iter().map(|c| c.score).collect(),
                        evaluator_flags: flags.clone(),
                        error: None,
                    })
                    .await;

                Ok(QueryResponse {
                    request_id,
                    answer,
                    sources: sources_from(&chunks),
                    debug: DebugInfo {
                        classification: classification.as_str().to_string(),
                        model_used,
                        tokens_input,
                        tokens_output,
                        latency_ms,
                        retrieval_count: chunks.len(),
                        evaluator_flags: flags,
                    },
                })
            }
            Err(e) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.logs
                    .append(&LogEntry {
                        request_id: request_id.clone(),
                        timestamp: chrono::Utc::now(),
                        query: query.to_string(),
                        classification: classification.as_str().to_string(),
                        model_used,
                        tokens_input: 0,
                        tokens_output: 0,
                        latency_ms,
                        retrieval_count: 0,
                        retrieval_scores: vec![],
                        evaluator_flags: vec![],
                        error: Some(e.log_cause()),
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        query: &str,
        model_used: &str,
        max_tokens: u32,
    ) -> Result<(String, Vec<RetrievedChunk>, u32, u32)> {
        let chunks = retrieve(
            self.embedder,
            self.store,
            query,
            DEFAULT_TOP_K,
            DEFAULT_THRESHOLD,
        )
        .await?;

        let messages = assemble_prompt(query, &chunks);
        let (answer, tokens_input, tokens_output) = self
            .generation
            .generate(model_used, &messages, max_tokens)
            .await?;

        Ok((answer, chunks, tokens_input, tokens_output))
    }

    /// Run the streaming query sequence. Events are yielded lazily;
    /// the full answer is accumulated internally so the evaluator and log
    /// entry can run once the upstream stream ends.
    pub fn run_stream(&'a self, query: &'a str) -> impl Stream<Item = PipelineEvent> + 'a {
        async_stream::stream! {
            let request_id = Uuid::new_v4().to_string();
            let started = Instant::now();
            let query = query.trim();

            let classification = classify(query);
            let (model_used, max_tokens) = model_and_budget(classification, self.config);

            let mut guard = CancellationGuard {
                armed: true,
                logs: Arc::clone(self.logs),
                request_id: request_id.clone(),
                query: query.to_string(),
                classification,
                model_used: model_used.clone(),
                started,
            };

            let chunks = match retrieve(self.embedder, self.store, query, DEFAULT_TOP_K, DEFAULT_THRESHOLD).await {
                Ok(c) => c,
                Err(e) => {
                    self.log_error(&request_id, query, classification, &model_used, started, &e).await;
                    guard.disarm();
                    let status_code = e.status_code();
                    yield PipelineEvent::Error { request_id, error: e.log_cause(), status_code };
                    return;
                }
            };

            let messages = assemble_prompt(query, &chunks);

            let upstream = match self.generation.generate_stream(&model_used, &messages, max_tokens).await {
                Ok(s) => s,
                Err(e) => {
                    self.log_error(&request_id, query, classification, &model_used, started, &e).await;
                    guard.disarm();
                    let status_code = e.status_code();
                    yield PipelineEvent::Error { request_id, error: e.log_cause(), status_code };
                    return;
                }
            };

            let mut upstream = Box::pin(upstream);
            let mut accumulated = String::new();
            let mut tokens_input = 0u32;
            let mut tokens_output = 0u32;

            while let Some(event) = upstream.next().await {
                match event {
                    StreamEvent::Token(fragment) => {
                        if !fragment.is_empty() {
                            accumulated.push_str(&fragment);
                            yield PipelineEvent::Token(fragment);
                        }
                    }
                    StreamEvent::Usage { tokens_input: ti, tokens_output: to } => {
                        tokens_input = ti;
                        tokens_output = to;
                    }
                    StreamEvent::Done => break,
                    StreamEvent::Error(cause) => {
                        self.log_error_str(&request_id, query, classification, &model_used, started, &cause).await;
                        guard.disarm();
                        // Mid-stream failures originate from the same upstream
                        // generation call as CoreError::UpstreamUnavailable.
                        yield PipelineEvent::Error { request_id, error: cause, status_code: 503 };
                        return;
                    }
                }
            }

            let flags = evaluate_output(
                &accumulated,
                chunks.len(),
                &chunks.iter().map(|c| c.text.clone()).collect::<Vec<_>>(),
            );
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            self.logs.append(&LogEntry {
                request_id: request_id.clone(),
                timestamp: chrono::Utc::now(),
                query: query.to_string(),
                classification: classification.as_str().to_string(),
                model_used: model_used.clone(),
                tokens_input,
                tokens_output,
                latency_ms,
                retrieval_count: chunks.len(),
                retrieval_scores: chunks.iter().map(|c| c.score).collect(),
                evaluator_flags: flags.clone(),
                error: None,
            }).await;

            guard.disarm();
            yield PipelineEvent::Done {
                request_id,
                sources: sources_from(&chunks),
                debug: DebugInfo {
                    classification: classification.as_str().to_string(),
                    model_used,
                    tokens_input,
                    tokens_output,
                    latency_ms,
                    retrieval_count: chunks.len(),
                    evaluator_flags: flags,
                },
            };
        }
    }

    async fn log_error(
        &self,
        request_id: &str,
        query: &str,
        classification: Classification,
        model_used: &str,
        started: Instant,
        error: &crate::error::CoreError,
    ) {
        self.log_error_str(request_id, query, classification, model_used, started, &error.log_cause())
            .await;
    }

    async fn log_error_str(
        &self,
        request_id: &str,
        query: &str,
        classification: Classification,
        model_used: &str,
        started: Instant,
        cause: &str,
    ) {
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.logs
            .append(&LogEntry {
                request_id: request_id.to_string(),
                timestamp: chrono::Utc::now(),
                query: query.to_string(),
                classification: classification.as_str().to_string(),
                model_used: model_used.to_string(),
                tokens_input: 0,
                tokens_output: 0,
                latency_ms,
                retrieval_count: 0,
                retrieval_scores: vec![],
                evaluator_flags: vec![],
                error: Some(cause.to_string()),
            })
            .await;
    }
}

/// One event of a streaming query's event sequence.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Token(String),
    Done {
        request_id: String,
        sources: Vec<Source>,
        debug: DebugInfo,
    },
    Error {
        request_id: String,
        error: String,
        status_code: u16,
    },
}
