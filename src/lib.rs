//! RepoLens - GitHub repository analysis agent
//!
//! Fetches a repository's metadata and key files, feeds them to a language
//! model and reports the analysis. The conversation is held in a
//! compressing buffer so it never outgrows the model's context window.
//!
//! # Architecture
//!
//! - **context**: token accounting and the context compressor
//! - **agent**: session phase machine and the analysis session
//! - **repository**: GitHub data source and file selection
//! - **models**: language model seam and chat client
//! - **telemetry**: trace events and collectors

pub mod errors;
pub mod types;
pub mod context;
pub mod agent;
pub mod repository;
pub mod models;
pub mod telemetry;
pub mod validation;
pub mod cli;

// Re-export commonly used types
pub use errors::{AnalyzerError, Result};
