//! Analysis types, prompt templates and the final report

use crate::agent::state::SessionPhase;
use crate::context::ContextInfo;
use crate::errors::AnalyzerError;
use crate::repository::RepositoryInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of analysis requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Summary,
    Security,
    /// Driven entirely by the caller's prompt
    Custom,
    CodeReview,
    Dependencies,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 5] = [
        AnalysisType::Summary,
        AnalysisType::Security,
        AnalysisType::Custom,
        AnalysisType::CodeReview,
        AnalysisType::Dependencies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Summary => "summary",
            AnalysisType::Security => "security",
            AnalysisType::Custom => "custom",
            AnalysisType::CodeReview => "code_review",
            AnalysisType::Dependencies => "dependencies",
        }
    }

    /// Whether dependency manifests and credential files are fetched
    pub fn includes_security_files(&self) -> bool {
        matches!(self, AnalysisType::Security | AnalysisType::Dependencies)
    }

    pub fn requires_prompt(&self) -> bool {
        matches!(self, AnalysisType::Custom)
    }

    /// Instructions for the model; `None` for custom analyses
    pub fn template(&self) -> Option<&'static str> {
        match self {
            AnalysisType::Summary => Some(SUMMARY_PROMPT),
            AnalysisType::Security => Some(SECURITY_PROMPT),
            AnalysisType::CodeReview => Some(CODE_REVIEW_PROMPT),
            AnalysisType::Dependencies => Some(DEPENDENCIES_PROMPT),
            AnalysisType::Custom => None,
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = AnalyzerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        AnalysisType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| {
                let mut valid: Vec<&str> = AnalysisType::ALL.iter().map(|t| t.as_str()).collect();
                valid.sort_unstable();
                AnalyzerError::Validation(format!(
                    "Invalid analysis type '{}'. Valid types: {}",
                    s,
                    valid.join(", ")
                ))
            })
    }
}

const SUMMARY_PROMPT: &str = "Produce a complete overview of this GitHub repository:
1. What the project is and who it is for
2. Languages, frameworks and notable dependencies
3. Project layout and the key files
4. Main features
5. How to install and use it
6. Code and documentation quality";

const SECURITY_PROMPT: &str = "Perform a security review of this GitHub repository:
1. Potential vulnerabilities in the code
2. Dependency management and known-risky libraries
3. Secure coding practices
4. Secrets, encryption and security configuration
5. Authentication and access control
6. Overall risk level with concrete mitigations";

const CODE_REVIEW_PROMPT: &str = "Review the code in this GitHub repository:
1. Architecture and module boundaries
2. Readability, naming and consistency
3. Error handling and edge cases
4. Test coverage and testability
5. Performance hot spots";

const DEPENDENCIES_PROMPT: &str = "Analyze the dependencies of this GitHub repository:
1. Direct dependencies per ecosystem and their purpose
2. Version pinning and lock files
3. Outdated, unmaintained or duplicated packages
4. Licensing concerns";

const REPORT_FORMAT: &str = "Answer in Markdown. End with a section titled \"Recommendations\" \
containing one bullet point per actionable recommendation.";

/// System prompt for a session
pub fn system_prompt(analysis_type: AnalysisType, custom_prompt: Option<&str>) -> String {
    let task = match (analysis_type.template(), custom_prompt) {
        (Some(template), Some(extra)) => format!("{}\n\nAdditional instructions:\n{}", template, extra),
        (Some(template), None) => template.to_string(),
        (None, Some(prompt)) => prompt.to_string(),
        (None, None) => String::new(),
    };
    format!(
        "You are an expert software analyst reviewing a GitHub repository.\n\n{}\n\n{}",
        task.trim(),
        REPORT_FORMAT
    )
}

/// Bullet items under the first "Recommendations" heading
///
/// Collection stops at the next Markdown heading.
pub fn extract_recommendations(text: &str) -> Vec<String> {
    let mut recommendations = Vec::new();
    let mut in_section = false;

    for line in text.lines() {
        let trimmed = line.trim();
        let is_heading = trimmed.starts_with('#')
            || (trimmed.starts_with("**") && trimmed.ends_with("**") && trimmed.len() > 4)
            || (trimmed.ends_with(':') && !is_list_item(trimmed));

        if is_heading {
            if in_section {
                break;
            }
            in_section = trimmed.to_ascii_lowercase().contains("recommendation");
            continue;
        }

        if in_section {
            if let Some(item) = strip_list_marker(trimmed) {
                if !item.is_empty() {
                    recommendations.push(item.to_string());
                }
            }
        }
    }

    recommendations
}

fn is_list_item(line: &str) -> bool {
    strip_list_marker(line).is_some()
}

fn strip_list_marker(line: &str) -> Option<&str> {
    for marker in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(rest.trim());
        }
    }
    None
}

/// Final outcome of an analysis session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub session_id: String,
    pub trace_id: String,
    pub analysis_type: AnalysisType,
    pub status: SessionPhase,
    /// Model output
    pub summary: Option<String>,
    pub recommendations: Vec<String>,
    pub processing_time_ms: u64,
    pub error_message: Option<String>,
    pub repository: Option<RepositoryInfo>,
    pub context: ContextInfo,
    pub created_at: DateTime<Utc>,
}

impl AnalysisReport {
    pub fn is_success(&self) -> bool {
        self.status == SessionPhase::Completed
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// A follow-up question asked after the analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    pub question: String,
    pub answer: String,
}

/// Machine-readable result of one analysis run
///
/// A failed follow-up does not hide the completed report: the answers
/// gathered so far are kept and the failure is carried alongside.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutput<'a> {
    pub report: &'a AnalysisReport,
    pub follow_ups: &'a [FollowUp],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_error: Option<String>,
}

impl AnalysisOutput<'_> {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
