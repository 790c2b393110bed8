//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/leadscope/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/leadscope/` (~/.config/leadscope/)
//! - Data: `$XDG_DATA_HOME/leadscope/` (~/.local/share/leadscope/)
//! - State/Logs: `$XDG_STATE_HOME/leadscope/` (~/.local/state/leadscope/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// LLM configuration for insight generation (optional; templates only when absent)
    #[serde(default)]
    pub llm: Option<LlmConfig>,

    /// Viewer telemetry timing configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Ingestion endpoint configuration (viewer side)
    #[serde(default)]
    pub ingest: IngestConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// LLM provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider type
    pub provider: LlmProvider,
    /// Model to use
    pub model: String,
    /// API endpoint (optional, uses default for provider)
    pub endpoint: Option<String>,
    /// API key (can also use env var)
    pub api_key: Option<String>,
    /// HTTP request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Supported LLM providers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    Claude,
    OpenAI,
}

impl LlmProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Claude => "https://api.anthropic.com",
            LlmProvider::OpenAI => "https://api.openai.com",
        }
    }
}

fn default_llm_timeout() -> u64 {
    30
}

/// Viewer telemetry timing configuration
///
/// The defaults mirror the behavior expected of the document viewer: a
/// 1-second accrual tick, a 2-second write debounce, a 60-second periodic
/// flush backstop, and a 2-minute idle threshold swept every 10 seconds.
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    /// Seconds between time-accrual ticks
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Seconds of quiet after a mutation before a debounced flush fires
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,

    /// Seconds between unconditional periodic flushes
    #[serde(default = "default_periodic_flush_secs")]
    pub periodic_flush_secs: u64,

    /// Seconds between idle-state sweeps
    #[serde(default = "default_idle_check_secs")]
    pub idle_check_secs: u64,

    /// Seconds without input before the user counts as idle
    #[serde(default = "default_idle_threshold_secs")]
    pub idle_threshold_secs: u64,

    /// Seconds of accrued time that latch the significant-time milestone
    #[serde(default = "default_significant_time_secs")]
    pub significant_time_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            debounce_secs: default_debounce_secs(),
            periodic_flush_secs: default_periodic_flush_secs(),
            idle_check_secs: default_idle_check_secs(),
            idle_threshold_secs: default_idle_threshold_secs(),
            significant_time_secs: default_significant_time_secs(),
        }
    }
}

fn default_tick_secs() -> u64 {
    1
}

fn default_debounce_secs() -> u64 {
    2
}

fn default_periodic_flush_secs() -> u64 {
    60
}

fn default_idle_check_secs() -> u64 {
    10
}

fn default_idle_threshold_secs() -> u64 {
    120
}

fn default_significant_time_secs() -> u64 {
    900
}

/// Ingestion endpoint configuration
///
/// Points the viewer-side scheduler at the engagement ingestion service.
#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Ingestion server URL (e.g., `https://leadscope.example.com`)
    pub server_url: Option<String>,

    /// API key for the ingestion endpoint (optional)
    pub api_key: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_ingest_timeout")]
    pub timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            timeout_secs: default_ingest_timeout(),
        }
    }
}

impl IngestConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.server_url.is_none() {
            return Err(Error::Config(
                "ingest.server_url is required for snapshot publishing".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_ingest_timeout() -> u64 {
    30
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Bind address for the engagement API
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Database path override (defaults to the XDG data dir)
    pub database_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            database_path: None,
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:5730".to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/leadscope/config.toml` (~/.config/leadscope/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("leadscope").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite database)
    ///
    /// `$XDG_DATA_HOME/leadscope/` (~/.local/share/leadscope/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("leadscope")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/leadscope/` (~/.local/state/leadscope/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("leadscope")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/leadscope/data.db` (~/.local/share/leadscope/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/leadscope/leadscope.log` (~/.local/state/leadscope/leadscope.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("leadscope.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.llm.is_none());
        assert_eq!(config.telemetry.debounce_secs, 2);
        assert_eq!(config.telemetry.periodic_flush_secs, 60);
        assert_eq!(config.telemetry.idle_threshold_secs, 120);
        assert_eq!(config.telemetry.significant_time_secs, 900);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[llm]
provider = "ollama"
model = "llama3.2"

[telemetry]
debounce_secs = 5
periodic_flush_secs = 120

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        let llm = config.llm.unwrap();
        assert_eq!(llm.provider, LlmProvider::Ollama);
        assert_eq!(llm.model, "llama3.2");
        assert_eq!(llm.timeout_secs, 30);
        assert_eq!(config.telemetry.debounce_secs, 5);
        assert_eq!(config.telemetry.periodic_flush_secs, 120);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_llm_provider_endpoints() {
        assert_eq!(
            LlmProvider::Ollama.default_endpoint(),
            "http://localhost:11434"
        );
        assert_eq!(
            LlmProvider::Claude.default_endpoint(),
            "https://api.anthropic.com"
        );
    }

    #[test]
    fn test_ingest_config_validation() {
        let config = IngestConfig::default();
        assert!(config.validate().is_err());

        let config = IngestConfig {
            server_url: Some("https://leadscope.example.com".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_ingest_config() {
        let toml = r#"
[ingest]
server_url = "https://leadscope.example.com"
api_key = "ls_live_xxxxxxxxxxxx"
timeout_secs = 10
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.ingest.server_url.as_deref(),
            Some("https://leadscope.example.com")
        );
        assert_eq!(config.ingest.timeout_secs, 10);
    }
}
