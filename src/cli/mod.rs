//! CLI module for RepoLens
//!
//! Handles command-line argument parsing, configuration management and
//! log subscriber setup.

pub mod args;
pub mod config;
pub mod logging;

pub use args::{Args, Commands, Verbosity};
pub use config::{Config, Credentials};
pub use logging::LogFormat;
