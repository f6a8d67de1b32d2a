//! Configuration for the echo server and the clients.
//!
//! Library users build [`ServerConfig`] and [`ClientConfig`] directly (both
//! have sensible defaults). The binary additionally reads a TOML file into
//! [`TomlConfig`] and converts its sections; CLI arguments take precedence
//! over file values.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Echo server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to (e.g., 127.0.0.1:12345). Port 0 picks a free port.
    pub listen: String,
    /// Maximum bytes read (and echoed) per chunk.
    pub receive_bytes: usize,
    /// Set SO_REUSEADDR on the listening socket.
    pub reuse_address: bool,
    /// Upper bound on how long a connection handler waits for data before
    /// re-checking whether the server is still alive.
    pub poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerSection::default().into()
    }
}

/// Client retry and reconnect settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Retry window used by reconnects triggered from send/receive.
    pub connect_timeout: Duration,
    /// Pause between two connection attempts.
    pub retry_interval: Duration,
    /// Reconnect transparently when send/receive hits a transport error.
    pub auto_reconnect: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientSection::default().into()
    }
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl TomlConfig {
    /// Read and parse a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        toml::from_str(&contents).map_err(|e| ConfigError::TomlParse(path.to_path_buf(), e))
    }
}

/// `[server]` section
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_receive_bytes")]
    pub receive_bytes: usize,
    #[serde(default = "default_reuse_address")]
    pub reuse_address: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            receive_bytes: default_receive_bytes(),
            reuse_address: default_reuse_address(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl From<ServerSection> for ServerConfig {
    fn from(section: ServerSection) -> Self {
        Self {
            listen: section.listen,
            receive_bytes: section.receive_bytes,
            reuse_address: section.reuse_address,
            poll_interval: Duration::from_millis(section.poll_interval_ms),
        }
    }
}

/// `[client]` section
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            auto_reconnect: default_auto_reconnect(),
        }
    }
}

impl From<ClientSection> for ClientConfig {
    fn from(section: ClientSection) -> Self {
        Self {
            connect_timeout: Duration::from_millis(section.connect_timeout_ms),
            retry_interval: Duration::from_millis(section.retry_interval_ms),
            auto_reconnect: section.auto_reconnect,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:12345".to_string()
}

fn default_receive_bytes() -> usize {
    4096
}

fn default_reuse_address() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_retry_interval_ms() -> u64 {
    500
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let server = ServerConfig::default();
        assert_eq!(server.listen, "127.0.0.1:12345");
        assert_eq!(server.receive_bytes, 4096);
        assert!(server.reuse_address);
        assert_eq!(server.poll_interval, Duration::from_secs(1));

        let client = ClientConfig::default();
        assert_eq!(client.connect_timeout, Duration::from_secs(10));
        assert_eq!(client.retry_interval, Duration::from_millis(500));
        assert!(client.auto_reconnect);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "0.0.0.0:9000"
            receive_bytes = 1024
            reuse_address = false
            poll_interval_ms = 250

            [client]
            connect_timeout_ms = 2000
            auto_reconnect = false

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.logging.level, "debug");

        let server = ServerConfig::from(config.server);
        assert_eq!(server.listen, "0.0.0.0:9000");
        assert_eq!(server.receive_bytes, 1024);
        assert!(!server.reuse_address);
        assert_eq!(server.poll_interval, Duration::from_millis(250));

        let client = ClientConfig::from(config.client);
        assert_eq!(client.connect_timeout, Duration::from_secs(2));
        // Unset keys fall back to defaults.
        assert_eq!(client.retry_interval, Duration::from_millis(500));
        assert!(!client.auto_reconnect);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(ServerConfig::from(config.server), ServerConfig::default());
        assert_eq!(ClientConfig::from(config.client), ClientConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file() {
        let err = TomlConfig::from_file(Path::new("/nonexistent/tcp-fixture.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(..)));
        assert!(err.to_string().contains("/nonexistent/tcp-fixture.toml"));
    }
}
