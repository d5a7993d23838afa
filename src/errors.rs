//! Error types for RepoLens
//!
//! One `thiserror` enum per layer: the context subsystem, the language
//! model, and the repository data source. `AnalyzerError` ties them
//! together for the analysis session.

use thiserror::Error;

/// Main error type for the analysis session
#[derive(Error, Debug)]
pub enum AnalyzerError {
    /// Session state machine transition errors
    #[error("Invalid session transition from {from} via {event}: {reason}")]
    InvalidTransition {
        from: String,
        event: String,
        reason: String,
    },

    /// Context window management errors
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Language model invocation errors
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Repository data source errors
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Input validation errors (URLs, names, analysis types)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for analyzer operations
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// The pluggable token counter could not produce a count
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Token counting unavailable: {reason}")]
pub struct MeasurementError {
    pub reason: String,
}

impl MeasurementError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The summarization collaborator failed or timed out
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompressionFailed {
    #[error("summarizer failed: {0}")]
    Summarizer(String),

    #[error("summarizer returned an empty summary")]
    EmptySummary,

    #[error("summarizer timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

/// Errors raised by the context window subsystem
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// The buffer is held by an in-flight operation (fail-fast policy)
    #[error("Conversation buffer is busy: {operation} rejected while another operation holds it")]
    ConcurrentMutation { operation: &'static str },

    /// Summary turns are produced by the compressor only
    #[error("Turns with the summary role are reserved for the compressor")]
    SummaryRoleReserved,
}

/// Result type alias for the context subsystem
pub type ContextResult<T> = std::result::Result<T, ContextError>;

/// Language model invocation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Model rate limit reached{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Model request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Invalid model request: {0}")]
    InvalidRequest(String),

    #[error("Model API error: {0}")]
    Api(String),
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    }
}

/// Repository data source errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Repository resource not found: {0}")]
    NotFound(String),

    #[error("Repository access denied: {0}")]
    Unauthorized(String),

    #[error("Repository API rate limit reached: {0}")]
    RateLimited(String),

    #[error("Repository API unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected repository API response: {0}")]
    InvalidResponse(String),
}

impl SourceError {
    /// Whether the caller may retry the failed request
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::RateLimited(_) | SourceError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AnalyzerError::Timeout { duration_ms: 300_000 };
        assert!(err.to_string().contains("300000"));
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = AnalyzerError::InvalidTransition {
            from: "Completed".to_string(),
            event: "BeginFetch".to_string(),
            reason: "terminal phase".to_string(),
        };
        assert!(err.to_string().contains("Completed"));
        assert!(err.to_string().contains("BeginFetch"));
    }

    #[test]
    fn test_context_error_converts() {
        let err: AnalyzerError = ContextError::ConcurrentMutation { operation: "append" }.into();
        assert!(matches!(err, AnalyzerError::Context(_)));
        assert!(err.to_string().contains("append"));
    }

    #[test]
    fn test_rate_limit_hint() {
        let err = ModelError::RateLimited {
            retry_after_secs: Some(12),
        };
        assert!(err.to_string().contains("retry after 12s"));

        let err = ModelError::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(err.to_string(), "Model rate limit reached");
    }

    #[test]
    fn test_source_error_retryable() {
        assert!(SourceError::Unavailable("502".into()).is_retryable());
        assert!(SourceError::RateLimited("403".into()).is_retryable());
        assert!(!SourceError::NotFound("repo".into()).is_retryable());
        assert!(!SourceError::Unauthorized("token".into()).is_retryable());
    }
}
