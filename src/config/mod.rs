//! Configuration management
//!
//! This module handles loading and parsing configuration for MeshMart.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Upload configuration
    #[serde(default)]
    pub upload: UploadConfig,
    /// Session configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Catalog client configuration
    #[serde(default)]
    pub client: ClientConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/meshmart.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_cache_capacity")]
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_entries: default_cache_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    300
}

fn default_cache_capacity() -> u64 {
    10_000
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Upload root directory; models and thumbnails live in subdirectories
    #[serde(default = "default_upload_path")]
    pub path: PathBuf,
    /// Maximum size of a single uploaded file in bytes (default: 50MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Maximum number of files per submission
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            max_file_size: default_max_file_size(),
            max_files: default_max_files(),
        }
    }
}

fn default_upload_path() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024 // 50MB
}

fn default_max_files() -> usize {
    2
}

impl UploadConfig {
    /// Upper bound for a whole multipart request body.
    ///
    /// Leaves one megabyte of headroom for the text fields.
    pub fn request_body_limit(&self) -> usize {
        let files = self.max_file_size.saturating_mul(self.max_files as u64);
        usize::try_from(files.saturating_add(1024 * 1024)).unwrap_or(usize::MAX)
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in days
    #[serde(default = "default_session_days")]
    pub expiration_days: i64,
    /// Interval between expired-session purges, in seconds
    #[serde(default = "default_purge_interval")]
    pub purge_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiration_days: default_session_days(),
            purge_interval_seconds: default_purge_interval(),
        }
    }
}

fn default_session_days() -> i64 {
    7
}

fn default_purge_interval() -> u64 {
    3600
}

/// Catalog client configuration (used by `meshmart-feed`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of a running MeshMart API
    #[serde(default = "default_client_base_url")]
    pub base_url: String,
    /// Retries after the first failed attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Backoff ceiling in milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Window in which loads of the same endpoint share one request
    #[serde(default = "default_dedup_window")]
    pub dedup_window_seconds: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_client_base_url(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            dedup_window_seconds: default_dedup_window(),
        }
    }
}

fn default_client_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_dedup_window() -> u64 {
    5
}

impl ClientConfig {
    /// De-duplication window, clamped to 5..=10 seconds
    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_seconds.clamp(5, 10))
    }
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - MESHMART_SERVER_HOST
    /// - MESHMART_SERVER_PORT
    /// - MESHMART_SERVER_CORS_ORIGIN
    /// - MESHMART_DATABASE_DRIVER
    /// - MESHMART_DATABASE_URL
    /// - MESHMART_CACHE_TTL_SECONDS
    /// - MESHMART_UPLOAD_PATH
    /// - MESHMART_UPLOAD_MAX_FILE_SIZE
    /// - MESHMART_SESSION_EXPIRATION_DAYS
    /// - MESHMART_CLIENT_BASE_URL
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Values that fail to parse are ignored and the file value is kept.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("MESHMART_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("MESHMART_SERVER_PORT") {
            self.server.port = port;
        }
        if let Ok(cors_origin) = std::env::var("MESHMART_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(driver) = std::env::var("MESHMART_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("MESHMART_DATABASE_URL") {
            self.database.url = url;
        }

        if let Some(ttl) = env_parse::<u64>("MESHMART_CACHE_TTL_SECONDS") {
            self.cache.ttl_seconds = ttl;
        }

        if let Ok(path) = std::env::var("MESHMART_UPLOAD_PATH") {
            self.upload.path = PathBuf::from(path);
        }
        if let Some(size) = env_parse::<u64>("MESHMART_UPLOAD_MAX_FILE_SIZE") {
            self.upload.max_file_size = size;
        }

        if let Some(days) = env_parse::<i64>("MESHMART_SESSION_EXPIRATION_DAYS") {
            self.session.expiration_days = days;
        }

        if let Ok(base_url) = std::env::var("MESHMART_CLIENT_BASE_URL") {
            self.client.base_url = base_url;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
