use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chain node endpoints and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// JSON-RPC endpoint URL
    pub endpoint: String,
    /// GraphQL endpoint URL
    pub graphql_endpoint: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Maximum number of attempts per call or block
    pub max_retries: u32,
    /// Initial retry delay in seconds
    pub retry_delay_seconds: u64,
    /// Maximum retry delay in seconds
    pub max_retry_delay_seconds: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file path
    pub path: String,
    /// Enable WAL mode for better concurrency
    pub enable_wal_mode: bool,
    /// Database busy timeout in milliseconds
    pub busy_timeout_ms: u64,
}

/// Ingestion behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Fetch call traces to populate internal calls
    pub trace_internal_calls: bool,
    /// Classify newly created contracts by token standard
    pub classify_contracts: bool,
    /// Candidate addresses classified concurrently per transaction
    pub classification_concurrency: usize,
    /// First block to ingest when the store is empty
    pub start_block: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:22000".to_string(),
            graphql_endpoint: "http://localhost:8547/graphql".to_string(),
            timeout_seconds: 30,
            max_retries: 5,
            retry_delay_seconds: 2,
            max_retry_delay_seconds: 60,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./chain-report.db".to_string(),
            enable_wal_mode: true,
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            trace_internal_calls: true,
            classify_contracts: true,
            classification_concurrency: 4,
            start_block: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

fn env_override<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl AppConfig {
    /// Load configuration from file and environment variables.
    /// Environment variables take precedence over file values.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the TOML file named by `CONFIG_FILE`
    pub fn load_from_file() -> Result<Self, ConfigError> {
        let config_path = env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        if !Path::new(&config_path).exists() {
            return Ok(Self::default());
        }

        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(endpoint) = env_override("CHAIN_RPC_URL")? {
            self.rpc.endpoint = endpoint;
        }
        if let Some(endpoint) = env_override("CHAIN_GRAPHQL_URL")? {
            self.rpc.graphql_endpoint = endpoint;
        }
        if let Some(timeout) = env_override("RPC_TIMEOUT_SECONDS")? {
            self.rpc.timeout_seconds = timeout;
        }
        if let Some(retries) = env_override("RPC_MAX_RETRIES")? {
            self.rpc.max_retries = retries;
        }

        if let Some(path) = env_override("DATABASE_PATH")? {
            self.database.path = path;
        }
        if let Some(wal_mode) = env_override("DATABASE_WAL_MODE")? {
            self.database.enable_wal_mode = wal_mode;
        }

        if let Some(trace) = env_override("TRACE_INTERNAL_CALLS")? {
            self.processing.trace_internal_calls = trace;
        }
        if let Some(classify) = env_override("CLASSIFY_CONTRACTS")? {
            self.processing.classify_contracts = classify;
        }
        if let Some(concurrency) = env_override("CLASSIFICATION_CONCURRENCY")? {
            self.processing.classification_concurrency = concurrency;
        }

        if let Some(level) = env_override("LOG_LEVEL")? {
            self.logging.level = level;
        }
        if let Some(format) = env_override("LOG_FORMAT")? {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_url(&self.rpc.endpoint) {
            return Err(ConfigError::InvalidUrl(self.rpc.endpoint.clone()));
        }
        if !is_http_url(&self.rpc.graphql_endpoint) {
            return Err(ConfigError::InvalidUrl(self.rpc.graphql_endpoint.clone()));
        }

        if self.rpc.timeout_seconds == 0 || self.rpc.timeout_seconds > 300 {
            return Err(invalid("rpc.timeout_seconds", self.rpc.timeout_seconds));
        }

        if self.rpc.max_retries == 0 || self.rpc.max_retries > 20 {
            return Err(invalid("rpc.max_retries", self.rpc.max_retries));
        }

        if self.rpc.retry_delay_seconds > self.rpc.max_retry_delay_seconds {
            return Err(invalid("rpc.retry_delay_seconds", self.rpc.retry_delay_seconds));
        }

        if self.processing.classification_concurrency == 0 || self.processing.classification_concurrency > 64 {
            return Err(invalid(
                "processing.classification_concurrency",
                self.processing.classification_concurrency,
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(invalid("logging.level", &self.logging.level));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(invalid("logging.format", &self.logging.format));
        }

        if self.database.path.trim().is_empty() {
            return Err(invalid("database.path", &self.database.path));
        }

        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample_config() -> Result<String, ConfigError> {
        let config = Self::default();
        toml::to_string_pretty(&config).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parsing(e.to_string()))?;
        fs::write(path, content).map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        Ok(())
    }
}
