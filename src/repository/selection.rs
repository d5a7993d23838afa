//! Bounded file selection
//!
//! Picks which repository files are worth sending to the model. Names are
//! matched case-insensitively against glob patterns on the base name:
//!
//! - README first, then other important files, then security files
//! - shallower paths before deeper ones
//! - files over the size cap are skipped, never truncated

use super::types::{FileEntry, FileLimits, RepositoryFile, RepositoryInfo};
use super::RepositorySource;
use crate::errors::SourceError;
use glob::{MatchOptions, Pattern};
use tracing::{debug, warn};

/// Files that describe the project or hold its entry points
pub const IMPORTANT_FILE_PATTERNS: &[&str] = &[
    "README*",
    "CHANGELOG*",
    "LICENSE*",
    "CONTRIBUTING*",
    "SECURITY*",
    "setup.py",
    "main.*",
    "index.*",
    "app.*",
    "server.*",
    "client.*",
];

/// Dependency manifests, credentials and configuration
pub const SECURITY_FILE_PATTERNS: &[&str] = &[
    "requirements.txt",
    "package.json",
    "package-lock.json",
    "Pipfile",
    "Pipfile.lock",
    "composer.json",
    "pom.xml",
    "go.mod",
    "Cargo.toml",
    "yarn.lock",
    "*.lock",
    "*secret*",
    "*config*",
    "*env*",
    ".docker*",
    "Dockerfile",
    "*.key",
    "*.pem",
    "*.cert",
    "auth*",
    "login*",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

fn compile(patterns: &[&str]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|p| match Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!(pattern = p, error = %e, "ignoring invalid file pattern");
                None
            }
        })
        .collect()
}

fn matches_any(patterns: &[Pattern], name: &str) -> bool {
    patterns.iter().any(|p| p.matches_with(name, MATCH_OPTIONS))
}

/// Ranks and bounds the files of a repository tree
#[derive(Debug, Clone)]
pub struct FileSelector {
    important: Vec<Pattern>,
    security: Vec<Pattern>,
    include_security: bool,
    limits: FileLimits,
}

impl FileSelector {
    /// `include_security` adds dependency and credential files to the selection
    pub fn new(include_security: bool, limits: FileLimits) -> Self {
        Self {
            important: compile(IMPORTANT_FILE_PATTERNS),
            security: compile(SECURITY_FILE_PATTERNS),
            include_security,
            limits,
        }
    }

    pub fn limits(&self) -> FileLimits {
        self.limits
    }

    pub fn is_readme(&self, entry: &FileEntry) -> bool {
        entry.file_name().to_ascii_uppercase().starts_with("README")
    }

    pub fn is_important(&self, entry: &FileEntry) -> bool {
        matches_any(&self.important, entry.file_name())
    }

    pub fn is_security_relevant(&self, entry: &FileEntry) -> bool {
        matches_any(&self.security, entry.file_name())
    }

    fn rank(&self, entry: &FileEntry) -> Option<u8> {
        if self.is_readme(entry) {
            Some(0)
        } else if self.is_important(entry) {
            Some(1)
        } else if self.include_security && self.is_security_relevant(entry) {
            Some(2)
        } else {
            None
        }
    }

    /// Matching entries in fetch order, capped at `max_files`
    pub fn select(&self, entries: &[FileEntry]) -> Vec<FileEntry> {
        let mut ranked: Vec<(u8, &FileEntry)> = entries
            .iter()
            .filter(|entry| {
                if entry.size > self.limits.max_file_size {
                    debug!(path = %entry.path, size = entry.size, "skipping oversized file");
                    false
                } else {
                    true
                }
            })
            .filter_map(|entry| self.rank(entry).map(|rank| (rank, entry)))
            .collect();

        ranked.sort_by(|(ra, a), (rb, b)| {
            ra.cmp(rb)
                .then_with(|| a.depth().cmp(&b.depth()))
                .then_with(|| a.path.cmp(&b.path))
        });

        ranked
            .into_iter()
            .take(self.limits.max_files)
            .map(|(_, entry)| entry.clone())
            .collect()
    }
}

/// Fetch the selected files and record them on `repository`
///
/// Sets `files_analyzed`, `security_files` and the root README content.
/// A failed fetch aborts the whole collection.
pub async fn collect_files(
    source: &dyn RepositorySource,
    repository: &mut RepositoryInfo,
    selector: &FileSelector,
) -> Result<Vec<RepositoryFile>, SourceError> {
    let entries = source.list_files(repository).await?;
    let selected = selector.select(&entries);
    debug!(
        total = entries.len(),
        selected = selected.len(),
        repository = %repository.full_name(),
        "selected files for analysis"
    );

    let mut files = Vec::with_capacity(selected.len());
    for entry in selected {
        let content = source.fetch_file(repository, &entry.path).await?;
        let security_relevant = selector.is_security_relevant(&entry);

        if selector.is_readme(&entry) && entry.depth() == 0 && repository.readme_content.is_none() {
            repository.readme_content = Some(content.clone());
        }
        if security_relevant {
            repository.security_files.push(entry.path.clone());
        }
        repository.files_analyzed.push(entry.path.clone());

        files.push(RepositoryFile {
            path: entry.path,
            size: entry.size,
            content,
            security_relevant,
        });
    }

    Ok(files)
}
