//! Configuration management for the RAX share server
//!
//! Settings are layered: built-in defaults, then an optional `config.toml`,
//! then `RAX_SHARE_*` environment variables, then command-line overrides.

use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONTROL_PORT: u16 = 5555;
pub const DEFAULT_SERVER_ROOT: &str = "ToShare";
pub const DEFAULT_CONFIG_PATH: &str = "config";

/// Complete server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind the control listener
    pub bind_address: String,

    /// Port for the control connection
    pub control_port: u16,

    /// First port tried for per-session data listeners (defaults to control + 1)
    pub data_port: Option<u16>,

    /// Number of consecutive ports tried for data listeners
    pub data_port_span: u16,

    /// Sandbox root folder, created at startup if absent
    pub server_root: String,

    /// Chunk size used when writing frames
    pub chunk_size: usize,

    /// How long a handler waits for the session's data connection
    pub data_connection_timeout_secs: u64,

    /// Maximum control command length
    pub max_command_length: usize,

    /// Optional append-only log file
    pub log_file: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            control_port: DEFAULT_CONTROL_PORT,
            data_port: None,
            data_port_span: 100,
            server_root: DEFAULT_SERVER_ROOT.to_string(),
            chunk_size: 1024,
            data_connection_timeout_secs: 30,
            max_command_length: 512,
            log_file: None,
        }
    }
}

/// Values supplied on the command line; `None` leaves the lower layers alone.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub bind_address: Option<String>,
    pub control_port: Option<u16>,
    pub data_port: Option<u16>,
    pub server_root: Option<String>,
    pub log_file: Option<String>,
}

impl ServerConfig {
    /// Load configuration from `config_path` (extension optional) with
    /// environment and command-line overrides applied on top.
    pub fn load(config_path: &str, overrides: &ConfigOverrides) -> Result<Self, config::ConfigError> {
        let settings = Self::defaults_builder()?
            .add_source(File::with_name(config_path).required(false))
            .add_source(Environment::with_prefix("RAX_SHARE").try_parsing(true))
            .set_override_option("bind_address", overrides.bind_address.clone())?
            .set_override_option("control_port", overrides.control_port.map(u64::from))?
            .set_override_option("data_port", overrides.data_port.map(u64::from))?
            .set_override_option("server_root", overrides.server_root.clone())?
            .set_override_option("log_file", overrides.log_file.clone())?
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn defaults_builder() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
        let defaults = ServerConfig::default();
        Config::builder()
            .set_default("bind_address", defaults.bind_address)?
            .set_default("control_port", u64::from(defaults.control_port))?
            .set_default("data_port_span", u64::from(defaults.data_port_span))?
            .set_default("server_root", defaults.server_root)?
            .set_default("chunk_size", defaults.chunk_size as u64)?
            .set_default(
                "data_connection_timeout_secs",
                defaults.data_connection_timeout_secs,
            )?
            .set_default("max_command_length", defaults.max_command_length as u64)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.server_root.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "server_root cannot be empty".into(),
            ));
        }

        if self.chunk_size == 0 {
            return Err(config::ConfigError::Message(
                "chunk_size must be greater than 0".into(),
            ));
        }

        if self.data_port_span == 0 {
            return Err(config::ConfigError::Message(
                "data_port_span must be greater than 0".into(),
            ));
        }

        if self.data_connection_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "data_connection_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Get bind address and control port as socket address
    pub fn control_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.control_port)
    }

    /// First data port; an ephemeral control port implies ephemeral data ports.
    pub fn data_port(&self) -> u16 {
        match self.data_port {
            Some(port) => port,
            None if self.control_port == 0 => 0,
            None => self.control_port.saturating_add(1),
        }
    }

    /// Get server root as PathBuf
    pub fn server_root_path(&self) -> PathBuf {
        PathBuf::from(&self.server_root)
    }

    /// Get data connection timeout as Duration
    pub fn data_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.data_connection_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol() {
        let config = ServerConfig::default();
        assert_eq!(config.control_port, 5555);
        assert_eq!(config.data_port(), 5556);
        assert_eq!(config.server_root, "ToShare");
        assert_eq!(config.chunk_size, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn ephemeral_control_port_gives_ephemeral_data_port() {
        let config = ServerConfig {
            control_port: 0,
            ..ServerConfig::default()
        };
        assert_eq!(config.data_port(), 0);
    }

    #[test]
    fn explicit_data_port_wins() {
        let config = ServerConfig {
            data_port: Some(7000),
            ..ServerConfig::default()
        };
        assert_eq!(config.data_port(), 7000);
    }

    #[test]
    fn rejects_empty_root() {
        let config = ServerConfig {
            server_root: "  ".into(),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_without_file_uses_defaults_and_overrides() {
        let overrides = ConfigOverrides {
            control_port: Some(6000),
            server_root: Some("Shared".into()),
            ..ConfigOverrides::default()
        };
        let config = ServerConfig::load("does-not-exist/config", &overrides).unwrap();
        assert_eq!(config.control_port, 6000);
        assert_eq!(config.data_port(), 6001);
        assert_eq!(config.server_root, "Shared");
        assert_eq!(config.max_command_length, 512);
    }
}
