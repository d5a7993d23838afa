//! Summarization collaborator used by the compressor
//!
//! The compressor hands the head of the conversation (and any earlier
//! summary) to a `Summarizer` and gets back the text of the new summary
//! turn. `ModelSummarizer` asks the language model to do it.

use crate::errors::Result;
use crate::models::LanguageModel;
use crate::types::Turn;
use async_trait::async_trait;
use std::sync::Arc;

const SUMMARIZER_SYSTEM_PROMPT: &str = "You condense conversations about a GitHub repository analysis. \
Keep every concrete fact: file paths, dependency names and versions, languages, \
findings, risks and open questions. Drop greetings and repetition.";

/// Input handed to the summarizer
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRequest {
    /// Text of the summary turn being replaced, if any
    pub previous_summary: Option<String>,

    /// Turns being compressed, oldest first
    pub turns: Vec<Turn>,
}

impl SummaryRequest {
    /// Concatenated transcript of the turns being compressed
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(Turn::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Full instruction text for a model-backed summarizer
    pub fn prompt(&self) -> String {
        let mut prompt = String::new();
        if let Some(previous) = &self.previous_summary {
            prompt.push_str("Summary of the conversation so far:\n");
            prompt.push_str(previous);
            prompt.push_str("\n\nExtend that summary with the following newer messages. ");
            prompt.push_str("The result must replace both.\n\n");
        } else {
            prompt.push_str("Summarize the following conversation.\n\n");
        }
        prompt.push_str("Conversation:\n");
        prompt.push_str(&self.transcript());
        prompt
    }
}

/// Produces the text of a synthetic summary turn
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String>;
}

/// Summarizer backed by the analysis language model
pub struct ModelSummarizer {
    model: Arc<dyn LanguageModel>,
}

impl ModelSummarizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Summarizer for ModelSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String> {
        let turns = [
            Turn::system(SUMMARIZER_SYSTEM_PROMPT),
            Turn::user(request.prompt()),
        ];
        let reply = self.model.complete(&turns).await?;
        Ok(reply.content().trim().to_string())
    }
}
