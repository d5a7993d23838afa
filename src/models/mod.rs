//! Language model module
//!
//! The `LanguageModel` seam used for the analysis itself and for history
//! summarization, plus an HTTP client for OpenAI-compatible chat APIs.

pub mod client;

use crate::errors::ModelError;
use crate::types::Turn;
use async_trait::async_trait;

// Re-export key types for convenience
pub use client::{ChatClient, ChatClientConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Turns in, one assistant turn out
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, turns: &[Turn]) -> Result<Turn, ModelError>;

    /// Model identifier, for logs and reports
    fn model_name(&self) -> &str;
}
