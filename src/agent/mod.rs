//! Analysis agent module
//!
//! Session phase machine, analysis types and the session that drives a
//! repository analysis through the context compressor.

pub mod analysis;
pub mod session;
pub mod state;

// Re-export commonly used types
pub use analysis::{
    extract_recommendations, system_prompt, AnalysisOutput, AnalysisReport, AnalysisType, FollowUp,
};
pub use session::{AnalysisRequest, AnalysisSession, Analyzer, SessionConfig, DEFAULT_ANALYSIS_TIMEOUT};
pub use state::{SessionEvent, SessionPhase};
