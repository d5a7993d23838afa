//! Input validation for repository URLs, names and analysis types

use crate::agent::analysis::AnalysisType;
use crate::errors::{AnalyzerError, Result};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};
use url::Url;

/// GitHub caps user and repository names at 39 characters
pub const MAX_NAME_LEN: usize = 39;

const GITHUB_HOSTS: &[&str] = &["github.com", "www.github.com"];

static NAME_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

/// A validated repository location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubTarget {
    /// URL exactly as given, trimmed
    pub url: String,
    pub owner: String,
    pub repo: String,
}

/// Whether `name` is a legal GitHub user or repository name
///
/// 1 to 39 alphanumerics or hyphens, no leading, trailing or doubled hyphen.
pub fn is_valid_github_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains("--") {
        return false;
    }
    NAME_PATTERN
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?$").ok())
        .as_ref()
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}

/// Parse a github.com repository URL into owner and repository name
///
/// Extra path segments (`/tree/main`) are ignored and a `.git` suffix is
/// stripped from the repository name.
pub fn validate_github_url(url: &str) -> Result<GitHubTarget> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(invalid_url("URL cannot be empty"));
    }

    let parsed = Url::parse(trimmed).map_err(|e| invalid_url(&format!("{}: {}", trimmed, e)))?;

    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    if !GITHUB_HOSTS.contains(&host.as_str()) {
        return Err(invalid_url("URL must be from github.com"));
    }
    if parsed.scheme() != "https" {
        warn!(url = trimmed, "non-HTTPS GitHub URL");
    }

    let parts: Vec<&str> = parsed
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    if parts.len() < 2 {
        return Err(invalid_url("URL must include both owner and repository name"));
    }

    let owner = parts[0];
    let repo = parts[1].strip_suffix(".git").unwrap_or(parts[1]);

    if !is_valid_github_name(owner) {
        return Err(invalid_url(&format!("Invalid GitHub username: {}", owner)));
    }
    if !is_valid_github_name(repo) {
        return Err(invalid_url(&format!("Invalid GitHub repository name: {}", repo)));
    }

    debug!(url = trimmed, owner, repo, "GitHub URL validated");
    Ok(GitHubTarget {
        url: trimmed.to_string(),
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

/// Parse an analysis type name, case-insensitively
pub fn validate_analysis_type(value: &str) -> Result<AnalysisType> {
    value.parse()
}

fn invalid_url(reason: &str) -> AnalyzerError {
    AnalyzerError::Validation(format!("Invalid GitHub URL: {}", reason))
}
