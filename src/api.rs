//! Thin HTTP transport (C13) exposing the five public operations: query,
//! ingest, health, recent logs, and all logs. Ambient — not scoped out by
//! the pipeline's Non-goals.

use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::{OpenApi, ToSchema};

use crate::config::AppConfig;
use crate::embedder::Embedder;
use crate::error::CoreError;
use crate::generation::GenerationClient;
use crate::ingestion::ingest_pdf;
use crate::log_writer::{LogEntry, LogWriter};
use crate::pipeline::{DebugInfo, Pipeline, PipelineEvent, QueryResponse, Source};
use crate::vector_store::VectorStore;

/// Shared process-wide singletons.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub embedder: Arc<Embedder>,
    pub store: Arc<VectorStore>,
    pub generation: Arc<GenerationClient>,
    pub logs: Arc<LogWriter>,
}

impl AppState {
    fn pipeline(&self) -> Pipeline<'_> {
        Pipeline {
            config: &self.config,
            embedder: &self.embedder,
            store: &self.store,
            generation: &self.generation,
            logs: &self.logs,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub chunks_indexed: usize,
}

#[derive(Debug, Deserialize)]
pub struct RecentLogsParams {
    #[serde(default = "default_recent_n")]
    n: usize,
}

fn default_recent_n() -> usize {
    10
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(OpenApi)]
#[openapi(
    paths(health_handler, query_handler, ingest_handler, recent_logs_handler, logs_handler),
    components(schemas(
        QueryRequest,
        QueryResponse,
        Source,
        DebugInfo,
        HealthResponse,
        ErrorResponse,
        LogEntry
    )),
    tags((name = "clearpath", description = "Retrieval-augmented support Q&A"))
)]
struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/query", post(query_handler))
        .route("/api/v1/query/stream", post(query_stream_handler))
        .route("/api/v1/ingest", post(ingest_handler))
        .route("/api/v1/logs/recent", get(recent_logs_handler))
        .route("/api/v1/logs", get(logs_handler))
        .route("/api-docs/openapi.json", get(openapi_spec_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn openapi_spec_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Health check: reports process liveness plus index size.
#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthResponse)))]
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        chunks_indexed: state.store.get_total_chunks().await,
    })
}

/// Answer a support question against the indexed documents.
#[utoipa::path(
    post,
    path = "/api/v1/query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Answer produced", body = QueryResponse),
        (status = 400, description = "Empty or invalid query", body = ErrorResponse),
        (status = 503, description = "Upstream generation unavailable", body = ErrorResponse)
    )
)]
async fn query_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Json<QueryResponse>> {
    let query = crate::sanitize::sanitize_input(&request.query);
    if query.is_empty() {
        return Err(CoreError::Validation("query must not be empty".into()).into());
    }

    info!(query = %query, "handling query");
    let response = state.pipeline().run(&query).await?;
    Ok(Json(response))
}

async fn query_stream_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>> {
    let query = crate::sanitize::sanitize_input(&request.query);
    if query.is_empty() {
        return Err(CoreError::Validation("query must not be empty".into()).into());
    }

    // The pipeline borrows its dependencies from `state`; cloning state is
    // cheap (an Arc bundle) and keeps the stream's lifetime independent of
    // this handler's stack frame.
    let events = pipeline_event_stream(state, query);
    Ok(Sse::new(events))
}

fn pipeline_event_stream(
    state: AppState,
    query: String,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        let pipeline = state.pipeline();
        let mut events = Box::pin(pipeline.run_stream(&query));

        while let Some(event) = events.next().await {
            let sse_event = match event {
                PipelineEvent::Token(fragment) => {
                    Event::default().event("token").json_data(serde_json::json!({ "token": fragment }))
                }
                PipelineEvent::Done { request_id, sources, debug } => {
                    Event::default().event("done").json_data(serde_json::json!({
                        "request_id": request_id,
                        "sources": sources,
                        "debug": debug,
                    }))
                }
                PipelineEvent::Error { request_id, error, status_code } => {
                    Event::default().event("error").json_data(serde_json::json!({
                        "request_id": request_id,
                        "error": error,
                        "status_code": status_code,
                    }))
                }
            };

            if let Ok(sse_event) = sse_event {
                yield Ok(sse_event);
            }
        }
    }
}

/// Ingest a single uploaded PDF into the index.
#[utoipa::path(
    post,
    path = "/api/v1/ingest",
    responses(
        (status = 200, description = "Document ingested"),
        (status = 400, description = "No extractable text or invalid upload", body = ErrorResponse)
    )
)]
async fn ingest_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<serde_json::Value>> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| CoreError::Validation(format!("malformed multipart body: {e}")))?
        .ok_or_else(|| CoreError::Validation("no file field in upload".into()))?;

    let filename = field
        .file_name()
        .map(|f| f.to_string())
        .unwrap_or_else(|| "upload.pdf".to_string());

    let bytes = field
        .bytes()
        .await
        .map_err(|e| CoreError::Validation(format!("failed to read upload: {e}")))?;

    let tmp_dir = std::env::temp_dir();
    let tmp_path = tmp_dir.join(format!("{}-{}", uuid::Uuid::new_v4(), filename));
    tokio::fs::write(&tmp_path, &bytes).await?;

    let result = ingest_pdf(&state.embedder, &state.store, &tmp_path).await;
    let _ = tokio::fs::remove_file(&tmp_path).await;

    let ids = result?;
    info!(filename = %filename, chunks = ids.len(), "ingested document");

    Ok(Json(serde_json::json!({
        "source_file": filename,
        "chunks_added": ids.len(),
    })))
}

/// The most recent `n` query log entries, most recent first.
#[utoipa::path(
    get,
    path = "/api/v1/logs/recent",
    responses((status = 200, description = "Recent log entries", body = [LogEntry]))
)]
async fn recent_logs_handler(
    State(state): State<AppState>,
    Query(params): Query<RecentLogsParams>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    Ok(Json(state.logs.get_recent_logs(params.n).await?))
}

/// All query log entries in chronological order.
#[utoipa::path(
    get,
    path = "/api/v1/logs",
    responses((status = 200, description = "All log entries", body = [LogEntry]))
)]
async fn logs_handler(State(state): State<AppState>) -> ApiResult<Json<Vec<LogEntry>>> {
    Ok(Json(state.logs.get_all_logs().await?))
}

/// Bind and serve the API on `host:port`.
pub async fn start_server(state: AppState, host: &str, port: u16) -> crate::error::Result<()> {
    let addr = format!("{host}:{port}");
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CoreError::Internal(format!("failed to bind to {addr}: {e}")))?;

    info!(%addr, "clearpath API listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| CoreError::Internal(format!("server error: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_maps_to_bad_request() {
        let err: ApiError = CoreError::Validation("bad".into()).into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn no_extractable_text_maps_to_bad_request() {
        let err: ApiError = CoreError::NoExtractableText.into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upstream_unavailable_maps_to_service_unavailable() {
        let err: ApiError = CoreError::UpstreamUnavailable("timeout".into()).into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn internal_error_maps_to_internal_server_error() {
        let err: ApiError = CoreError::Internal("oops".into()).into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn default_recent_n_is_ten() {
        assert_eq!(default_recent_n(), 10);
    }
}
