//! Repository data source module
//!
//! The `RepositorySource` seam, the GitHub REST implementation, and the
//! bounded file selection that decides which files reach the model.

pub mod github;
pub mod retry;
pub mod selection;
pub mod types;

use crate::errors::SourceError;
use async_trait::async_trait;

// Re-export commonly used types
pub use github::{GitHubClient, GitHubConfig, DEFAULT_API_URL};
pub use retry::RetryPolicy;
pub use selection::{collect_files, FileSelector};
pub use types::{FileEntry, FileLimits, RepositoryFile, RepositoryInfo};

/// Supplies repository metadata and file contents on demand
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Metadata, including the language breakdown
    async fn fetch_repository(&self, owner: &str, name: &str) -> Result<RepositoryInfo, SourceError>;

    /// Every file path in the default branch, with sizes
    async fn list_files(&self, repository: &RepositoryInfo) -> Result<Vec<FileEntry>, SourceError>;

    /// Raw text content of one file
    async fn fetch_file(&self, repository: &RepositoryInfo, path: &str) -> Result<String, SourceError>;
}
