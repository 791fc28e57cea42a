use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level configuration
///
/// Every section has defaults, so a file only needs to mention what it
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    /// Model catalog served verbatim by `GET /api/llms`
    #[serde(default)]
    pub llms: serde_json::Value,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            llms: serde_json::Value::Null,
            staging: StagingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// HTTP / WebSocket listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: bool,
    /// Sessions allowed to stream at once on one connection; extra requests queue
    pub max_sessions_per_connection: usize,
    /// Outbound frames buffered per connection before writers wait
    pub outbound_buffer: usize,
    /// Largest accepted `/api/upload-image` request body
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors: true,
            max_sessions_per_connection: 16,
            outbound_buffer: 64,
            max_upload_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Generation engine endpoint (OpenAI-compatible)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub headers: HashMap<String, String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            timeout_seconds: 120,
            headers: HashMap::new(),
        }
    }
}

/// Image staging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StagingConfig {
    /// Directory for staged files; a process-scoped temp dir when unset
    pub directory: Option<String>,
    /// Lifetime of a staged image; `None` keeps images until exit
    pub ttl_secs: Option<u64>,
    pub sweep_interval_secs: u64,
    /// Prefix for returned image URLs; relative paths when unset
    pub public_base_url: Option<String>,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            ttl_secs: Some(3600),
            sweep_interval_secs: 60,
            public_base_url: None,
        }
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Logging 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub json_format: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Watch error: {0}")]
    #[cfg(feature = "hot-reload")]
    Watch(#[from] notify::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
