//! Context management module
//!
//! Token accounting, the compressing conversation buffer, and the
//! summarization collaborator it calls.

pub mod counter;
pub mod compressor;
pub mod summarizer;
pub mod shared;

// Re-export commonly used types
pub use counter::{HeuristicCounter, TokenAccountant, TokenCounter, TokenizerCounter, PER_TURN_OVERHEAD};
pub use compressor::{
    AppendReport, CompressionOutcome, CompressionStats, CompressorConfig, CompressorPhase,
    ContextCompressor, ContextInfo,
};
pub use compressor::{DEFAULT_MAX_TOKENS, DEFAULT_PRESERVED_MESSAGES, DEFAULT_SUMMARY_TIMEOUT, DEFAULT_TRIGGER_RATIO};
pub use shared::SharedContext;
pub use summarizer::{ModelSummarizer, Summarizer, SummaryRequest};
