//! Configuration management
//!
//! This module handles loading and parsing configuration for the coursehub service.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

use crate::models::UserRole;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// User export configuration
    #[serde(default)]
    pub export: ExportSettings,
    /// Nonce (anti-forgery token) configuration
    #[serde(default)]
    pub nonce: NonceConfig,
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
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
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
    "data/coursehub.db".to_string()
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

/// User export configuration
///
/// These are the file-level knobs for the export module. Programmatic
/// overrides (filename and CSV-header hooks) live on
/// [`crate::export::ExportConfig`], which is built from this at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Number of users fetched per batch
    #[serde(default = "default_export_page_size")]
    pub page_size: i64,
    /// Role required to run an export
    #[serde(default = "default_export_role")]
    pub required_role: UserRole,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            page_size: default_export_page_size(),
            required_role: default_export_role(),
        }
    }
}

fn default_export_page_size() -> i64 {
    200
}

fn default_export_role() -> UserRole {
    UserRole::Administrator
}

/// Nonce configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceConfig {
    /// HMAC secret. Empty means a random per-process secret is generated,
    /// so nonces do not survive restarts.
    #[serde(default)]
    pub secret: String,
    /// Nonce lifetime in seconds
    #[serde(default = "default_nonce_lifetime")]
    pub lifetime_seconds: u64,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            lifetime_seconds: default_nonce_lifetime(),
        }
    }
}

fn default_nonce_lifetime() -> u64 {
    86400
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
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file.
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

        // Handle empty file - return defaults
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides.
    ///
    /// Environment variables follow the pattern:
    /// - COURSEHUB_SERVER_HOST
    /// - COURSEHUB_SERVER_PORT
    /// - COURSEHUB_DATABASE_DRIVER
    /// - COURSEHUB_DATABASE_URL
    /// - COURSEHUB_EXPORT_PAGE_SIZE
    /// - COURSEHUB_NONCE_SECRET
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("COURSEHUB_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("COURSEHUB_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("COURSEHUB_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        // Database configuration
        if let Ok(driver) = std::env::var("COURSEHUB_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("COURSEHUB_DATABASE_URL") {
            self.database.url = url;
        }

        // Export configuration
        if let Ok(page_size) = std::env::var("COURSEHUB_EXPORT_PAGE_SIZE") {
            if let Ok(page_size) = page_size.parse::<i64>() {
                self.export.page_size = page_size;
            }
        }

        // Nonce configuration
        if let Ok(secret) = std::env::var("COURSEHUB_NONCE_SECRET") {
            self.nonce.secret = secret;
        }
    }

    /// Validate cross-field constraints
    fn validate(&self) -> Result<(), ConfigError> {
        if self.export.page_size < 1 {
            return Err(ConfigError::ValidationError(format!(
                "export.page_size must be at least 1, got {}",
                self.export.page_size
            )));
        }
        if self.nonce.lifetime_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "nonce.lifetime_seconds must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
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

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::path::Path::new("nonexistent_config.yml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.export.page_size, 200);
        assert_eq!(config.export.required_role, UserRole::Administrator);
        assert_eq!(config.nonce.lifetime_seconds, 86400);
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "   \n  ").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "server:\n  port: 9090\nexport:\n  page_size: 50\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.export.page_size, 50);
        assert_eq!(config.export.required_role, UserRole::Administrator);
    }

    #[test]
    fn test_load_export_role_override() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "export:\n  required_role: editor\n").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.export.required_role, UserRole::Editor);
    }

    #[test]
    fn test_load_invalid_yaml_fails() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: [not a number\n").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_invalid_page_size_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "export:\n  page_size: 0\n").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let _guard = lock_env();
        std::env::set_var("COURSEHUB_SERVER_PORT", "3001");
        std::env::set_var("COURSEHUB_EXPORT_PAGE_SIZE", "25");

        let config =
            Config::load_with_env(std::path::Path::new("nonexistent_config.yml")).unwrap();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.export.page_size, 25);

        std::env::remove_var("COURSEHUB_SERVER_PORT");
        std::env::remove_var("COURSEHUB_EXPORT_PAGE_SIZE");
    }

    #[test]
    fn test_env_invalid_port_ignored() {
        let _guard = lock_env();
        std::env::set_var("COURSEHUB_SERVER_PORT", "not-a-port");

        let config =
            Config::load_with_env(std::path::Path::new("nonexistent_config.yml")).unwrap();
        assert_eq!(config.server.port, 8080);

        std::env::remove_var("COURSEHUB_SERVER_PORT");
    }
}
