//! Configuration management for RepoLens
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.repolens/config.toml
//!
//! Secrets never live in the file: API keys come from the environment
//! (a `.env` file is honored by the binary).

use crate::agent::SessionConfig;
use crate::cli::logging::LogFormat;
use crate::context::{CompressorConfig, TokenAccountant, TokenizerCounter};
use crate::errors::{AnalyzerError, Result};
use crate::models::{ChatClientConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::repository::{FileLimits, GitHubConfig, RetryPolicy, DEFAULT_API_URL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Model API key variables, first match wins
pub const MODEL_API_KEY_VARS: &[&str] = &["REPOLENS_MODEL_API_KEY", "OPENAI_API_KEY"];

/// GitHub token variable
pub const GITHUB_TOKEN_VAR: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";

/// Complete configuration for RepoLens
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub context: ContextSettings,
    pub model: ModelSettings,
    pub github: GitHubSettings,
    pub session: SessionSettings,
    pub logging: LoggingSettings,
}

/// Context window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    pub max_tokens: usize,
    pub trigger_ratio: f64,
    pub preserved_messages: usize,
    pub per_turn_overhead: usize,
    /// Falls back to the session timeout when unset
    pub summary_timeout_secs: Option<u64>,
    /// HuggingFace `tokenizer.json`; the character heuristic is used without it
    pub tokenizer_path: Option<String>,
}

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
    pub request_timeout_secs: u64,
}

/// GitHub data source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubSettings {
    pub api_url: String,
    pub max_file_size: u64,
    pub max_files: usize,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub analysis_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

/// Secrets read from the environment
#[derive(Clone, Default)]
pub struct Credentials {
    pub model_api_key: Option<String>,
    pub github_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "set" } else { "unset" };
        f.debug_struct("Credentials")
            .field("model_api_key", &mask(&self.model_api_key))
            .field("github_token", &mask(&self.github_token))
            .finish()
    }
}

impl Credentials {
    /// Read credentials through `lookup` (normally `std::env::var`)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            model_api_key: MODEL_API_KEY_VARS.iter().find_map(|name| non_empty(name)),
            github_token: non_empty(GITHUB_TOKEN_VAR),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

impl Default for ContextSettings {
    fn default() -> Self {
        let compressor = CompressorConfig::default();
        Self {
            max_tokens: compressor.max_tokens,
            trigger_ratio: compressor.trigger_ratio,
            preserved_messages: compressor.preserved_messages,
            per_turn_overhead: crate::context::PER_TURN_OVERHEAD,
            summary_timeout_secs: None,
            tokenizer_path: None,
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            max_output_tokens: Some(4_096),
            request_timeout_secs: 120,
        }
    }
}

impl Default for GitHubSettings {
    fn default() -> Self {
        let limits = FileLimits::default();
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            max_file_size: limits.max_file_size,
            max_files: limits.max_files,
            request_timeout_secs: 30,
            max_attempts: crate::repository::retry::MAX_ATTEMPTS,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            analysis_timeout_secs: crate::agent::DEFAULT_ANALYSIS_TIMEOUT.as_secs(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Structured.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AnalyzerError::ConfigError(format!("Failed to read config {}: {}", path.display(), e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| AnalyzerError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from the standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Config::default())
    }

    /// `~/.repolens/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".repolens").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.context.max_tokens == 0 {
            return Err(AnalyzerError::ConfigError(
                "context.max_tokens must be greater than 0".to_string(),
            ));
        }

        if !(self.context.trigger_ratio > 0.0 && self.context.trigger_ratio <= 1.0) {
            return Err(AnalyzerError::ConfigError(format!(
                "context.trigger_ratio must be in (0, 1], got {}",
                self.context.trigger_ratio
            )));
        }

        if self.context.summary_timeout_secs == Some(0) {
            return Err(AnalyzerError::ConfigError(
                "context.summary_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.model.model.trim().is_empty() {
            return Err(AnalyzerError::ConfigError("model.model must not be empty".to_string()));
        }

        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(AnalyzerError::ConfigError(
                "model.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.model.request_timeout_secs == 0
            || self.github.request_timeout_secs == 0
            || self.session.analysis_timeout_secs == 0
        {
            return Err(AnalyzerError::ConfigError("timeouts must be greater than 0".to_string()));
        }

        if self.github.max_files == 0 || self.github.max_file_size == 0 {
            return Err(AnalyzerError::ConfigError(
                "github.max_files and github.max_file_size must be greater than 0".to_string(),
            ));
        }

        self.log_format()?;
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| AnalyzerError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AnalyzerError::ConfigError(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| AnalyzerError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// TOML rendering for `repolens config`
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AnalyzerError::ConfigError(format!("Failed to serialize config: {}", e)))
    }

    /// Apply `LOG_LEVEL` / `LOG_FORMAT` through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT").filter(|v| !v.trim().is_empty()) {
            self.logging.format = format;
        }
    }

    pub fn log_format(&self) -> Result<LogFormat> {
        self.logging.format.parse()
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.session.analysis_timeout_secs)
    }

    pub fn compressor_config(&self) -> CompressorConfig {
        CompressorConfig {
            max_tokens: self.context.max_tokens,
            trigger_ratio: self.context.trigger_ratio,
            preserved_messages: self.context.preserved_messages,
            summary_timeout: self
                .context
                .summary_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| self.analysis_timeout()),
        }
    }

    pub fn file_limits(&self) -> FileLimits {
        FileLimits {
            max_file_size: self.github.max_file_size,
            max_files: self.github.max_files,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            analysis_timeout: self.analysis_timeout(),
            compressor: self.compressor_config(),
            file_limits: self.file_limits(),
        }
    }

    /// Accountant using the configured tokenizer, if any
    ///
    /// A tokenizer that cannot be loaded is not fatal: the accountant
    /// counts with the character heuristic instead.
    pub fn token_accountant(&self) -> TokenAccountant {
        let accountant = match &self.context.tokenizer_path {
            Some(path) => match TokenizerCounter::from_file(Self::expand_path(path)) {
                Ok(counter) => TokenAccountant::new(Arc::new(counter)),
                Err(e) => {
                    warn!(path = %path, error = %e, "tokenizer unavailable, counting with the character heuristic");
                    TokenAccountant::heuristic()
                }
            },
            None => TokenAccountant::heuristic(),
        };
        accountant.with_overhead(self.context.per_turn_overhead)
    }

    pub fn chat_config(&self, credentials: &Credentials) -> ChatClientConfig {
        ChatClientConfig {
            base_url: self.model.base_url.clone(),
            model: self.model.model.clone(),
            api_key: credentials.model_api_key.clone(),
            temperature: self.model.temperature,
            max_output_tokens: self.model.max_output_tokens,
            request_timeout: Duration::from_secs(self.model.request_timeout_secs),
        }
    }

    pub fn github_config(&self, credentials: &Credentials) -> GitHubConfig {
        GitHubConfig {
            api_url: self.github.api_url.clone(),
            token: credentials.github_token.clone(),
            timeout: Duration::from_secs(self.github.request_timeout_secs),
            retry: RetryPolicy::with_config(self.github.max_attempts, 500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Turn;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.context.max_tokens, 200_000);
        assert_eq!(config.context.trigger_ratio, 0.85);
        assert_eq!(config.context.preserved_messages, 5);
        assert_eq!(config.github.max_file_size, 100_000);
        assert_eq!(config.github.max_files, 50);
        assert_eq!(config.session.analysis_timeout_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_summary_timeout_defaults_to_session_timeout() {
        let mut config = Config::default();
        config.session.analysis_timeout_secs = 90;
        assert_eq!(config.compressor_config().summary_timeout, Duration::from_secs(90));

        config.context.summary_timeout_secs = Some(20);
        assert_eq!(config.compressor_config().summary_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_config_validation_zero_tokens() {
        let mut config = Config::default();
        config.context.max_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_ratio() {
        for ratio in [0.0, -0.5, 1.01, f64::NAN] {
            let mut config = Config::default();
            config.context.trigger_ratio = ratio;
            assert!(config.validate().is_err(), "ratio {} accepted", ratio);
        }
        let mut config = Config::default();
        config.context.trigger_ratio = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_timeouts() {
        let mut config = Config::default();
        config.session.analysis_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.context.summary_timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[context]\nmax_tokens = 1000\n\n[model]\nmodel = \"llama3\"\n").unwrap();

        let config = Config::load(Some(path)).unwrap();
        assert_eq!(config.context.max_tokens, 1000);
        assert_eq!(config.context.preserved_messages, 5);
        assert_eq!(config.model.model, "llama3");
        assert_eq!(config.model.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[context]\ntrigger_ratio = 1.5\n").unwrap();
        assert!(matches!(
            Config::load_from_file(&path),
            Err(AnalyzerError::ConfigError(_))
        ));
    }

    #[test]
    fn test_missing_file_rejected() {
        let result = Config::load(Some(PathBuf::from("/nonexistent/repolens.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.context.tokenizer_path = Some("~/tokenizer.json".to_string());
        config.logging.format = "json".to_string();

        config.save(&path).unwrap();
        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.context.tokenizer_path.as_deref(), Some("~/tokenizer.json"));
        assert_eq!(loaded.log_format().unwrap(), LogFormat::Json);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([("LOG_LEVEL", "debug"), ("LOG_FORMAT", "simple")]);
        let mut config = Config::default();
        config.apply_env_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.log_format().unwrap(), LogFormat::Simple);
    }

    #[test]
    fn test_credentials_lookup_order() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-openai"),
            ("REPOLENS_MODEL_API_KEY", ""),
            ("GITHUB_PERSONAL_ACCESS_TOKEN", "ghp_token"),
        ]);
        let credentials = Credentials::from_lookup(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(credentials.model_api_key.as_deref(), Some("sk-openai"));
        assert_eq!(credentials.github_token.as_deref(), Some("ghp_token"));
        assert!(!format!("{:?}", credentials).contains("ghp_token"));
    }

    #[test]
    fn test_converters() {
        let config = Config::default();
        let credentials = Credentials {
            model_api_key: Some("key".to_string()),
            github_token: None,
        };

        let chat = config.chat_config(&credentials);
        assert_eq!(chat.api_key.as_deref(), Some("key"));
        assert_eq!(chat.request_timeout, Duration::from_secs(120));

        let session = config.session_config();
        assert_eq!(session.compressor.trigger_tokens(), 170_000);
        assert_eq!(session.file_limits, FileLimits::default());

        let accountant = config.token_accountant();
        assert_eq!(accountant.counter_name(), "heuristic");
    }

    #[test]
    fn test_missing_tokenizer_falls_back_to_heuristic() {
        let mut config = Config::default();
        config.context.tokenizer_path = Some("/nonexistent/tokenizer.json".to_string());
        config.context.per_turn_overhead = 3;

        let accountant = config.token_accountant();
        assert_eq!(accountant.counter_name(), "heuristic");
        // 41 chars → ⌈41 / 4⌉ = 11
        let turn = Turn::user("a".repeat(41));
        assert_eq!(accountant.measure_turn(&turn), 3 + 11);
    }

    #[test]
    fn test_expand_path() {
        assert!(!Config::expand_path("~/.repolens").to_string_lossy().contains('~'));
        assert_eq!(Config::expand_path("/absolute/path"), PathBuf::from("/absolute/path"));
    }
}
