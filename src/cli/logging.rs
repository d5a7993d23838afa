//! Log subscriber setup
//!
//! Filter precedence: `-v`/`-q` flags, then `RUST_LOG`, then `LOG_LEVEL`,
//! then the `[logging]` config section. Logs go to stderr so `--json`
//! output on stdout stays clean.

use crate::errors::{AnalyzerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable with timestamps and fields
    Structured,
    /// One JSON object per line
    Json,
    /// Compact, no timestamps
    Simple,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Structured => "structured",
            LogFormat::Json => "json",
            LogFormat::Simple => "simple",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = AnalyzerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structured" => Ok(LogFormat::Structured),
            "json" => Ok(LogFormat::Json),
            "simple" => Ok(LogFormat::Simple),
            other => Err(AnalyzerError::ConfigError(format!(
                "Invalid log format: {} (expected structured, json or simple)",
                other
            ))),
        }
    }
}

/// Pick the filter directive by precedence
pub fn resolve_filter(
    flag_level: Option<&str>,
    rust_log: Option<String>,
    log_level: Option<String>,
    config_level: &str,
) -> String {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    flag_level
        .map(str::to_string)
        .or_else(|| non_empty(rust_log))
        .or_else(|| non_empty(log_level))
        .unwrap_or_else(|| config_level.to_string())
}

/// Install the global subscriber
pub fn init(directive: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(directive)
        .map_err(|e| AnalyzerError::ConfigError(format!("Invalid log filter '{}': {}", directive, e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Simple => builder.compact().without_time().with_target(false).try_init(),
        LogFormat::Structured => builder.with_target(true).try_init(),
    };

    installed.map_err(|e| AnalyzerError::ConfigError(format!("Failed to install log subscriber: {}", e)))
}
