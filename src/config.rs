//! Configuration management for the RAX FTP engine
//!
//! Separates startup configuration (requires restart) from runtime configuration
//! (shared behind a lock and readable by every session).

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use tokio::sync::RwLock;

/// Complete server configuration with startup/runtime separation
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServerConfig {
    #[serde(flatten)]
    pub startup: StartupConfig,

    #[serde(flatten)]
    pub runtime: RuntimeConfig,
}

/// Credentials of one configured user.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub password: String,
    /// When set, login also requires a matching ACCT.
    #[serde(default)]
    pub account: Option<String>,
}

/// Configuration that requires server restart to take effect
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StartupConfig {
    // ═══ NETWORK ═══
    /// IP address to bind the FTP control connection
    pub bind_address: String,

    /// Port for FTP control connection
    pub control_port: u16,

    /// Address announced in PASV/EPSV replies; defaults to the control connection's local IP
    pub passive_address: Option<String>,

    /// Port range for passive listeners
    pub data_port_min: u16,
    pub data_port_max: u16,

    /// Root directory for FTP operations
    pub server_root: String,

    // ═══ PROTOCOL ═══
    /// Maximum FTP command line length
    pub max_command_length: usize,

    /// Bound on establishing a data connection
    pub data_connect_timeout_secs: u64,

    /// How long a closing session waits for its transfer to finish
    pub close_wait_millis: u64,

    /// Read size for file content moved over the data channel
    pub block_size: usize,

    /// Security limits
    pub max_username_length: usize,

    // ═══ TLS ═══
    pub tls_cert_file: Option<String>,
    pub tls_key_file: Option<String>,

    // ═══ USERS ═══
    pub users: HashMap<String, UserEntry>,
}

/// Configuration that can be changed while the server is running
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum concurrent clients
    /// Environment: RAX_FTP__MAX_CLIENTS
    pub max_clients: usize,

    /// Server-wide data bandwidth in bytes per second, 0 for unlimited
    pub global_rate_limit_bps: u64,

    /// Per-session data bandwidth in bytes per second, 0 for unlimited
    pub session_rate_limit_bps: u64,
}

/// Thread-safe runtime configuration wrapper
pub type SharedRuntimeConfig = Arc<RwLock<RuntimeConfig>>;

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            control_port: 2121,
            passive_address: None,
            data_port_min: 2122,
            data_port_max: 2222,
            server_root: "./server_root".to_string(),
            max_command_length: crate::protocol::codec::MAX_LINE_LENGTH,
            data_connect_timeout_secs: 10,
            close_wait_millis: 1000,
            block_size: 8192,
            max_username_length: 32,
            tls_cert_file: None,
            tls_key_file: None,
            users: HashMap::new(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_clients: 10,
            global_rate_limit_bps: 0,
            session_rate_limit_bps: 0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from ./config.toml (if present) with environment overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from the named file (extension optional) with environment overrides
    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("RAX_FTP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Split into startup (immutable) and runtime (mutable) parts
    pub fn split(self) -> (StartupConfig, SharedRuntimeConfig) {
        let runtime = Arc::new(RwLock::new(self.runtime));
        (self.startup, runtime)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.startup.control_port == 0 {
            return Err(config::ConfigError::Message(
                "Control port cannot be 0".into(),
            ));
        }

        let (min, max) = (self.startup.data_port_min, self.startup.data_port_max);
        if min > max || (min == 0) != (max == 0) {
            return Err(config::ConfigError::Message(
                "data ports must satisfy 0 < data_port_min <= data_port_max, or both be 0".into(),
            ));
        }

        if self.startup.server_root.is_empty() {
            return Err(config::ConfigError::Message(
                "server_root cannot be empty".into(),
            ));
        }

        if self.startup.tls_cert_file.is_some() != self.startup.tls_key_file.is_some() {
            return Err(config::ConfigError::Message(
                "tls_cert_file and tls_key_file must be set together".into(),
            ));
        }

        if let Some(addr) = &self.startup.passive_address {
            if addr.parse::<IpAddr>().is_err() {
                return Err(config::ConfigError::Message(format!(
                    "passive_address is not an IP address: {addr}"
                )));
            }
        }

        if self.runtime.max_clients == 0 {
            return Err(config::ConfigError::Message(
                "max_clients must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

impl StartupConfig {
    /// Get bind address and control port as socket address
    pub fn control_socket(&self) -> String {
        match self.bind_address.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{ip}]:{}", self.control_port),
            _ => format!("{}:{}", self.bind_address, self.control_port),
        }
    }

    /// Get data port range for passive listeners, both ends inclusive; 0..=0 lets the OS choose
    pub fn data_port_range(&self) -> std::ops::RangeInclusive<u16> {
        self.data_port_min..=self.data_port_max
    }

    /// Get server root as PathBuf
    pub fn server_root_path(&self) -> PathBuf {
        PathBuf::from(&self.server_root)
    }

    pub fn passive_ip(&self) -> Option<IpAddr> {
        self.passive_address.as_deref().and_then(|a| a.parse().ok())
    }

    pub fn data_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.data_connect_timeout_secs)
    }

    pub fn close_wait(&self) -> Duration {
        Duration::from_millis(self.close_wait_millis)
    }

    pub fn tls_files(&self) -> Option<(PathBuf, PathBuf)> {
        match (&self.tls_cert_file, &self.tls_key_file) {
            (Some(cert), Some(key)) => Some((PathBuf::from(cert), PathBuf::from(key))),
            _ => None,
        }
    }
}
