//! Error handling for the Clearpath RAG core.

use thiserror::Error;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, CoreError>;

/// The four error kinds a caller of the public operations can observe, plus the
/// narrower causes nested inside `Internal` for logging.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("vector store dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("no extractable text in document")]
    NoExtractableText,

    #[error("upstream generation service unreachable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("PDF extraction error: {0}")]
    PdfExtraction(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// Whether this error kind should never be retried by a caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::UpstreamUnavailable(_))
    }

    /// The HTTP status a caller should observe for this error kind. Shared by
    /// the non-streaming `IntoResponse` mapping and the streaming `error`
    /// SSE event's `status_code` field, so both paths agree.
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::Validation(_) | CoreError::NoExtractableText => 400,
            CoreError::DimensionMismatch { .. } | CoreError::UpstreamUnavailable(_) => 503,
            _ => 500,
        }
    }

    /// Short category tag, used in structured log lines and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation",
            CoreError::DimensionMismatch { .. } => "dimension_mismatch",
            CoreError::NoExtractableText => "no_extractable_text",
            CoreError::UpstreamUnavailable(_) => "upstream_unavailable",
            CoreError::Internal(_) => "internal",
            CoreError::Io(_) => "io",
            CoreError::Serialization(_) => "serialization",
            CoreError::Http(_) => "http",
            CoreError::PdfExtraction(_) => "pdf_extraction",
            CoreError::Config(_) => "config",
        }
    }

    /// Short, user-safe cause string for the structured log `error` field.
    pub fn log_cause(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_unavailable_is_retryable() {
        let err = CoreError::UpstreamUnavailable("timeout".into());
        assert!(err.is_retryable());
    }

    #[test]
    fn validation_is_not_retryable() {
        let err = CoreError::Validation("empty query".into());
        assert!(!err.is_retryable());
    }

    #[test]
    fn category_matches_kind() {
        let err = CoreError::DimensionMismatch {
            expected: 384,
            actual: 256,
        };
        assert_eq!(err.category(), "dimension_mismatch");
    }

    #[test]
    fn status_code_matches_kind() {
        assert_eq!(CoreError::Validation("x".into()).status_code(), 400);
        assert_eq!(CoreError::NoExtractableText.status_code(), 400);
        assert_eq!(CoreError::UpstreamUnavailable("x".into()).status_code(), 503);
        assert_eq!(
            CoreError::DimensionMismatch { expected: 1, actual: 2 }.status_code(),
            503
        );
        assert_eq!(CoreError::Internal("x".into()).status_code(), 500);
    }
}
