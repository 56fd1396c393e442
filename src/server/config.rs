//! Server configuration types
//!
//! All settings flow through [`AppConfig`]: embedded defaults, optional
//! file overrides, then `LOANFLOW_*` environment variables.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Remote key/value cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Connection URL (redis://[:password@]host:port).
    pub url: String,
    /// Per-operation timeout in milliseconds.
    #[serde(default = "default_cache_timeout_ms")]
    pub op_timeout_ms: u64,
}

fn default_cache_timeout_ms() -> u64 {
    5
}

/// System-of-record configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Per-query timeout in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

fn default_pool_size() -> u32 {
    8
}

fn default_query_timeout_ms() -> u64 {
    5
}

/// Write-back message-queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Connection URL.
    pub url: String,
    /// Stream the answer records land on.
    #[serde(default = "default_stream")]
    pub stream: String,
    /// Per-publish timeout in milliseconds.
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

fn default_stream() -> String {
    "loanflow:answers".to_string()
}

fn default_publish_timeout_ms() -> u64 {
    50
}

/// Evaluation-engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Root of the sections/questions configuration tree.
    #[serde(default = "default_config_root")]
    pub config_root: String,
    /// Evaluator latency budget in milliseconds.
    #[serde(default = "default_budget_ms")]
    pub budget_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            config_root: default_config_root(),
            budget_ms: default_budget_ms(),
        }
    }
}

fn default_config_root() -> String {
    "config/catalog".to_string()
}

fn default_budget_ms() -> u64 {
    8
}
