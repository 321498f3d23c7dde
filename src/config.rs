//! Configuration management for FalLab
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{FallabError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for FalLab
///
/// Holds the API connection settings, generation polling behavior,
/// catalog browsing limits, and logging preferences.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// API connection settings
    #[serde(default)]
    pub api: ApiConfig,
    /// Generation submission and polling settings
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Model catalog settings
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// API connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the FalLab API, including the version prefix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("fallab/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl ApiConfig {
    /// Request timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// How many generations may be in flight at once
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
    /// At most one in-flight generation per session
    #[default]
    PerSession,
    /// At most one in-flight generation across the whole store
    Global,
}

/// Generation submission and polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model used when none is selected explicitly
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Maximum time to wait for a terminal status (milliseconds)
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Wait between status queries (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// In-flight generation policy for the conversation store
    #[serde(default)]
    pub concurrency: ConcurrencyPolicy,
}

fn default_model() -> String {
    "flux-kontext".to_string()
}

fn default_max_wait_ms() -> u64 {
    600_000
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            max_wait_ms: default_max_wait_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            concurrency: ConcurrencyPolicy::default(),
        }
    }
}

/// Model catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Page size for category listings
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// Maximum results per search
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,

    /// Quiet period before a search query is sent (milliseconds)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How long cached category listings stay fresh (seconds)
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
}

fn default_page_limit() -> u32 {
    100
}

fn default_search_limit() -> u32 {
    100
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_cache_ttl() -> u64 {
    300
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
            search_limit: default_search_limit(),
            debounce_ms: default_debounce_ms(),
            cache_ttl_seconds: default_cache_ttl(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON-formatted logs
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FallabError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| FallabError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("FALLAB_API_URL") {
            tracing::debug!(base_url = %base_url, "Env override: FALLAB_API_URL");
            self.api.base_url = base_url;
        }

        if let Ok(model) = std::env::var("FALLAB_DEFAULT_MODEL") {
            self.generation.default_model = model;
        }

        if let Ok(max_wait) = std::env::var("FALLAB_MAX_WAIT_MS") {
            match max_wait.parse() {
                Ok(v) => self.generation.max_wait_ms = v,
                Err(_) => tracing::warn!("Invalid FALLAB_MAX_WAIT_MS: {}", max_wait),
            }
        }

        if let Ok(interval) = std::env::var("FALLAB_POLL_INTERVAL_MS") {
            match interval.parse() {
                Ok(v) => self.generation.poll_interval_ms = v,
                Err(_) => tracing::warn!("Invalid FALLAB_POLL_INTERVAL_MS: {}", interval),
            }
        }

        if let Ok(level) = std::env::var("FALLAB_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(json_logs) = std::env::var("FALLAB_JSON_LOGS") {
            match json_logs.parse::<bool>() {
                Ok(v) => self.logging.json_format = v,
                Err(_) => tracing::warn!("Invalid value for FALLAB_JSON_LOGS: {}", json_logs),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(api_url) = &cli.api_url {
            self.api.base_url = api_url.clone();
        }
        if cli.verbose {
            self.logging.level = "debug".to_string();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `FallabError::Config` describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(FallabError::Config("api.base_url cannot be empty".to_string()).into());
        }

        let parsed = url::Url::parse(&self.api.base_url).map_err(|e| {
            FallabError::Config(format!("Invalid api.base_url {}: {}", self.api.base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FallabError::Config(format!(
                "api.base_url must use http or https, got {}",
                parsed.scheme()
            ))
            .into());
        }

        if self.api.timeout_seconds == 0 {
            return Err(FallabError::Config(
                "api.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.generation.default_model.trim().is_empty() {
            return Err(FallabError::Config(
                "generation.default_model cannot be empty".to_string(),
            )
            .into());
        }

        if self.generation.poll_interval_ms == 0 {
            return Err(FallabError::Config(
                "generation.poll_interval_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.generation.poll_interval_ms > self.generation.max_wait_ms {
            return Err(FallabError::Config(
                "generation.poll_interval_ms must not exceed generation.max_wait_ms".to_string(),
            )
            .into());
        }

        if self.catalog.page_limit == 0 || self.catalog.search_limit == 0 {
            return Err(FallabError::Config(
                "catalog limits must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
