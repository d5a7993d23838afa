//! Command-line argument parsing for RepoLens
//!
//! Provides clap-based CLI with a config subcommand and verbosity control.

use crate::agent::AnalysisType;
use crate::cli::logging::LogFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// RepoLens - analyze GitHub repositories with a language model
#[derive(Parser, Debug)]
#[command(name = "repolens")]
#[command(version)]
#[command(about = "Analyze a GitHub repository with an LLM, within a bounded context window", long_about = None)]
pub struct Args {
    /// GitHub repository URL, e.g. https://github.com/owner/repo
    #[arg(value_name = "REPO_URL")]
    pub repo_url: Option<String>,

    /// Analysis type: summary, security, custom, code_review, dependencies
    #[arg(short = 't', long = "type", default_value = "summary", value_parser = parse_analysis_type)]
    pub analysis_type: AnalysisType,

    /// Instructions for a custom analysis, or extra instructions for the others
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Follow-up question to ask after the analysis (repeatable)
    #[arg(long = "ask", value_name = "QUESTION")]
    pub ask: Vec<String>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Model name, overriding the configuration
    #[arg(short, long)]
    pub model: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Display the effective configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

fn parse_analysis_type(value: &str) -> Result<AnalysisType, String> {
    value.parse().map_err(|e: crate::errors::AnalyzerError| e.to_string())
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Check that an analysis or a subcommand was requested
    pub fn validate(&self) -> Result<(), String> {
        if self.command.is_none() && self.repo_url.is_none() {
            return Err("Repository URL required. Use 'repolens <REPO_URL>' or run a subcommand.".to_string());
        }

        if self.command.is_some() && self.repo_url.is_some() {
            return Err("Cannot specify a repository URL with a subcommand.".to_string());
        }

        if self.analysis_type.requires_prompt() && self.prompt.is_none() {
            return Err("--type custom requires --prompt".to_string());
        }

        Ok(())
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Log level forced by the flags; `None` defers to env and config
    pub fn log_level(&self) -> Option<&'static str> {
        match self {
            Verbosity::Quiet => Some("error"),
            Verbosity::Normal => None,
            Verbosity::Verbose => Some("info"),
            Verbosity::VeryVerbose => Some("debug"),
        }
    }

    /// Check if should show the progress spinner
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Check if should show the telemetry summary
    pub fn show_stats(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
