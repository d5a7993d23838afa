//! Repository data types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-file size cap (bytes)
pub const MAX_FILE_SIZE: u64 = 100_000;

/// Maximum number of files fed to the model
pub const MAX_FILES_TO_ANALYZE: usize = 50;

/// GitHub repository metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub url: String,
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    /// Primary language
    pub language: Option<String>,
    /// Bytes of code per language
    pub languages: BTreeMap<String, u64>,
    pub stars: u64,
    pub forks: u64,
    /// Repository size in kilobytes, as GitHub reports it
    pub size: u64,
    pub default_branch: String,
    pub files_analyzed: Vec<String>,
    pub security_files: Vec<String>,
    pub readme_content: Option<String>,
}

impl RepositoryInfo {
    pub fn new(url: impl Into<String>, owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            owner: owner.into(),
            name: name.into(),
            description: None,
            language: None,
            languages: BTreeMap::new(),
            stars: 0,
            forks: 0,
            size: 0,
            default_branch: "main".to_string(),
            files_analyzed: Vec::new(),
            security_files: Vec::new(),
            readme_content: None,
        }
    }

    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Languages with their share of the code base, largest first
    pub fn language_breakdown(&self) -> Vec<(String, f64)> {
        let total: u64 = self.languages.values().sum();
        if total == 0 {
            return Vec::new();
        }
        let mut shares: Vec<(String, f64)> = self
            .languages
            .iter()
            .map(|(lang, bytes)| (lang.clone(), *bytes as f64 * 100.0 / total as f64))
            .collect();
        shares.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        shares
    }

    /// Plain-text overview handed to the model
    pub fn overview(&self) -> String {
        let mut lines = vec![format!("Repository: {} ({})", self.full_name(), self.url)];
        if let Some(description) = &self.description {
            lines.push(format!("Description: {}", description));
        }
        if let Some(language) = &self.language {
            lines.push(format!("Primary language: {}", language));
        }
        let breakdown = self.language_breakdown();
        if !breakdown.is_empty() {
            let langs: Vec<String> = breakdown
                .iter()
                .map(|(lang, pct)| format!("{} {:.1}%", lang, pct))
                .collect();
            lines.push(format!("Languages: {}", langs.join(", ")));
        }
        lines.push(format!(
            "Stars: {} | Forks: {} | Size: {} KB | Default branch: {}",
            self.stars, self.forks, self.size, self.default_branch
        ));
        if !self.files_analyzed.is_empty() {
            lines.push(format!("Files provided: {}", self.files_analyzed.join(", ")));
        }
        lines.join("\n")
    }
}

/// One path in the repository tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    /// Last path component
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Number of directories above the file
    pub fn depth(&self) -> usize {
        self.path.matches('/').count()
    }
}

/// A fetched file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryFile {
    pub path: String,
    pub content: String,
    pub size: u64,
    /// Matched a security-relevant pattern
    pub security_relevant: bool,
}

/// Bounds on what is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLimits {
    pub max_file_size: u64,
    pub max_files: usize,
}

impl Default for FileLimits {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            max_files: MAX_FILES_TO_ANALYZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_breakdown() {
        let mut repo = RepositoryInfo::new("https://github.com/a/b", "a", "b");
        repo.languages.insert("Rust".to_string(), 750);
        repo.languages.insert("Shell".to_string(), 250);

        let breakdown = repo.language_breakdown();
        assert_eq!(breakdown[0].0, "Rust");
        assert!((breakdown[0].1 - 75.0).abs() < f64::EPSILON);
        assert!((breakdown[1].1 - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_breakdown() {
        let repo = RepositoryInfo::new("https://github.com/a/b", "a", "b");
        assert!(repo.language_breakdown().is_empty());
    }

    #[test]
    fn test_overview() {
        let mut repo = RepositoryInfo::new("https://github.com/rust-lang/cargo", "rust-lang", "cargo");
        repo.description = Some("The Rust package manager".to_string());
        repo.languages.insert("Rust".to_string(), 100);
        repo.stars = 12;

        let overview = repo.overview();
        assert!(overview.starts_with("Repository: rust-lang/cargo"));
        assert!(overview.contains("Description: The Rust package manager"));
        assert!(overview.contains("Rust 100.0%"));
        assert!(overview.contains("Stars: 12"));
    }

    #[test]
    fn test_file_entry_helpers() {
        let entry = FileEntry::new("src/bin/main.rs", 10);
        assert_eq!(entry.file_name(), "main.rs");
        assert_eq!(entry.depth(), 2);
        assert_eq!(FileEntry::new("README.md", 1).depth(), 0);
    }
}
