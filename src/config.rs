//! Configuration module for passthrough.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Which side of the exchange to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Interactive request client
    Client,
    /// Echo server
    Server,
}

/// Wire format used for every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// Bare payload, one message per read
    Passthrough,
    /// u32 big-endian length header plus payload
    LengthPrefixed,
}

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "passthrough")]
#[command(version = "0.1.0")]
#[command(about = "User-defined message framing over TCP", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Run as client or server
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Host to connect to (client) or bind to (server)
    #[arg(long)]
    pub host: Option<String>,

    /// TCP port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Message framing
    #[arg(short, long, value_enum)]
    pub framing: Option<Framing>,

    /// Number of server worker threads (0 = number of CPU cores)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Maximum inbound body size in bytes
    #[arg(short, long)]
    pub size_limit: Option<usize>,

    /// Client retries per request
    #[arg(short, long)]
    pub retry_max: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub framing: Option<Framing>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of worker threads (0 = number of CPU cores)
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Per-connection read buffer size
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Events handled per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum request body size in bytes
    #[serde(default = "default_server_size_limit")]
    pub size_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: 0,
            max_connections: default_max_connections(),
            buffer_size: default_buffer_size(),
            batch_size: default_batch_size(),
            size_limit: default_server_size_limit(),
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub retry_max: usize,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_io_timeout_ms")]
    pub send_timeout_ms: u64,
    #[serde(default = "default_io_timeout_ms")]
    pub receive_timeout_ms: u64,
    /// Idle connection reuse window (0 = close after every request)
    #[serde(default = "default_keep_alive_ms")]
    pub keep_alive_ms: u64,
    /// Maximum response body size in bytes
    #[serde(default = "default_response_size_limit")]
    pub response_size_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            retry_max: 0,
            connect_timeout_ms: default_connect_timeout_ms(),
            send_timeout_ms: default_io_timeout_ms(),
            receive_timeout_ms: default_io_timeout_ms(),
            keep_alive_ms: default_keep_alive_ms(),
            response_size_limit: default_response_size_limit(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6688
}

fn default_max_connections() -> usize {
    1024
}

fn default_buffer_size() -> usize {
    16 * 1024 // 16 KB
}

fn default_batch_size() -> usize {
    256
}

fn default_server_size_limit() -> usize {
    16 * 1024 // matches one read buffer
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_io_timeout_ms() -> u64 {
    10_000
}

fn default_keep_alive_ms() -> u64 {
    30_000
}

fn default_response_size_limit() -> usize {
    4 * 1024 // 4 KB
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub framing: Framing,
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub max_connections: usize,
    pub buffer_size: usize,
    pub batch_size: usize,
    /// Inbound body limit on the server side
    pub size_limit: usize,
    pub retry_max: usize,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    pub receive_timeout: Duration,
    pub keep_alive: Duration,
    pub response_size_limit: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Resolve already-parsed CLI args, reading the TOML file they name.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    /// Merge CLI args with TOML config (CLI takes precedence).
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let mode = cli.mode.or(toml_config.mode).unwrap_or(Mode::Client);
        let client = toml_config.client;
        let server = toml_config.server;

        // Host and port come from the section matching the mode.
        let (file_host, file_port) = match mode {
            Mode::Server => (server.host, server.port),
            Mode::Client => (client.host, client.port),
        };

        Config {
            mode,
            framing: cli
                .framing
                .or(toml_config.framing)
                .unwrap_or(Framing::Passthrough),
            host: cli.host.unwrap_or(file_host),
            port: cli.port.unwrap_or(file_port),
            workers: cli.workers.unwrap_or(server.workers),
            max_connections: server.max_connections,
            buffer_size: server.buffer_size,
            batch_size: server.batch_size,
            size_limit: match mode {
                Mode::Server => cli.size_limit.unwrap_or(server.size_limit),
                Mode::Client => server.size_limit,
            },
            retry_max: cli.retry_max.unwrap_or(client.retry_max),
            connect_timeout: Duration::from_millis(client.connect_timeout_ms),
            send_timeout: Duration::from_millis(client.send_timeout_ms),
            receive_timeout: Duration::from_millis(client.receive_timeout_ms),
            keep_alive: Duration::from_millis(client.keep_alive_ms),
            response_size_limit: match mode {
                Mode::Client => cli.size_limit.unwrap_or(client.response_size_limit),
                Mode::Server => client.response_size_limit,
            },
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    /// `host:port` string for binding or connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {1}", path = .0.display())]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{path}': {1}", path = .0.display())]
    TomlParse(PathBuf, #[source] toml::de::Error),
}
