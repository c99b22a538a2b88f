//! Configuration loading and typed config structures for the Game of Life
//! engine, gateway, and controller.
//!
//! The canonical configuration lives in `gol-config.yaml`. Every section and
//! field has a default, so a missing file or a partial file is valid.
//! Selected values can be overridden from the environment (see
//! [`GolConfig::apply_env_overrides`]).

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for {variable}")]
    Env {
        /// The environment variable name.
        variable: &'static str,
        /// The rejected value.
        value: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `gol-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GolConfig {
    /// Engine tuning (workers, rendezvous timeout, ticker).
    #[serde(default)]
    pub engine: EngineConfig,

    /// Remote gateway listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// Remote gateway caller.
    #[serde(default)]
    pub client: ClientConfig,

    /// The run the controller performs.
    #[serde(default)]
    pub run: RunConfig,

    /// Image directories.
    #[serde(default)]
    pub io: IoConfig,

    /// Logging defaults.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GolConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment overrides are applied after parsing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Env`] if an override is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults. Environment
    /// overrides are applied either way.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::from_file(path);
        }
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override selected values with environment variables when set.
    ///
    /// - `GOL_SERVER_URL` overrides `client.server_url`
    /// - `GOL_PORT` overrides `server.port`
    /// - `GOL_MODE` overrides `run.mode` (`local` or `remote`)
    /// - `GOL_TURNS` overrides `run.turns`
    /// - `GOL_WORKERS` overrides `engine.workers`
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("GOL_SERVER_URL") {
            self.client.server_url = val;
        }
        if let Some(port) = env_parse("GOL_PORT")? {
            self.server.port = port;
        }
        if let Ok(val) = std::env::var("GOL_MODE") {
            self.run.mode = match val.to_ascii_lowercase().as_str() {
                "local" => RunMode::Local,
                "remote" => RunMode::Remote,
                _ => {
                    return Err(ConfigError::Env {
                        variable: "GOL_MODE",
                        value: val,
                    });
                }
            };
        }
        if let Some(turns) = env_parse("GOL_TURNS")? {
            self.run.turns = turns;
        }
        if let Some(workers) = env_parse("GOL_WORKERS")? {
            self.engine.workers = workers;
        }
        Ok(())
    }
}

/// Read and parse an environment variable, if set.
fn env_parse<T: core::str::FromStr>(variable: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(variable) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_parse| ConfigError::Env { variable, value }),
        Err(_missing) => Ok(None),
    }
}

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Number of parallel row partitions per turn.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Bounded wait for every rendezvous query, in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Interval of the alive-cell ticker, in milliseconds.
    #[serde(default = "default_ticker_interval_ms")]
    pub ticker_interval_ms: u64,

    /// Capacity of a run's control inbox.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

impl EngineConfig {
    /// The rendezvous timeout as a [`Duration`].
    pub const fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// The ticker interval as a [`Duration`].
    pub const fn ticker_interval(&self) -> Duration {
        Duration::from_millis(self.ticker_interval_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            query_timeout_ms: default_query_timeout_ms(),
            ticker_interval_ms: default_ticker_interval_ms(),
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

/// Remote gateway listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// The host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// The TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Remote gateway caller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the gateway.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Timeout for short calls (queries and commands). `start` has none.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ClientConfig {
    /// The short-call timeout as a [`Duration`].
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Where a controller runs the evolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// In-process worker pool.
    #[default]
    Local,
    /// Offloaded to a gateway.
    Remote,
}

/// The run a controller performs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Local or remote execution.
    #[serde(default)]
    pub mode: RunMode,

    /// Grid width (selects the input image).
    #[serde(default = "default_dimension")]
    pub width: usize,

    /// Grid height (selects the input image).
    #[serde(default = "default_dimension")]
    pub height: usize,

    /// Number of turns to compute.
    #[serde(default = "default_turns")]
    pub turns: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            width: default_dimension(),
            height: default_dimension(),
            turns: default_turns(),
        }
    }
}

/// Image directories.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IoConfig {
    /// Directory holding input images (`{H}x{W}.pgm`).
    #[serde(default = "default_images_dir")]
    pub images_dir: String,

    /// Directory receiving output images (`{H}x{W}x{turn}.pgm`).
    #[serde(default = "default_out_dir")]
    pub out_dir: String,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            images_dir: default_images_dir(),
            out_dir: default_out_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
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

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const fn default_workers() -> usize {
    8
}

const fn default_query_timeout_ms() -> u64 {
    2000
}

const fn default_ticker_interval_ms() -> u64 {
    2000
}

const fn default_inbox_capacity() -> usize {
    16
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    8030
}

fn default_server_url() -> String {
    "http://127.0.0.1:8030".to_owned()
}

const fn default_request_timeout_ms() -> u64 {
    5000
}

const fn default_dimension() -> usize {
    512
}

const fn default_turns() -> u64 {
    10_000_000
}

fn default_images_dir() -> String {
    "images".to_owned()
}

fn default_out_dir() -> String {
    "out".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = GolConfig::default();
        assert_eq!(config.engine.workers, 8);
        assert_eq!(config.engine.query_timeout_ms, 2000);
        assert_eq!(config.engine.ticker_interval(), Duration::from_secs(2));
        assert_eq!(config.server.port, 8030);
        assert_eq!(config.run.mode, RunMode::Local);
        assert_eq!(config.io.images_dir, "images");
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
engine:
  workers: 4
  query_timeout_ms: 500
  ticker_interval_ms: 1000
  inbox_capacity: 4

server:
  host: "127.0.0.1"
  port: 9000

client:
  server_url: "http://10.0.0.2:9000"
  request_timeout_ms: 750

run:
  mode: remote
  width: 64
  height: 32
  turns: 100

io:
  images_dir: "pgm"
  out_dir: "results"

logging:
  level: "debug"
"#;
        let config: GolConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.engine.workers, 4);
        assert_eq!(config.engine.query_timeout(), Duration::from_millis(500));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.client.server_url, "http://10.0.0.2:9000");
        assert_eq!(config.run.mode, RunMode::Remote);
        assert_eq!(config.run.width, 64);
        assert_eq!(config.run.height, 32);
        assert_eq!(config.io.out_dir, "results");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let yaml = "run:\n  turns: 5\n";
        let config: GolConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.run.turns, 5);
        assert_eq!(config.run.width, 512);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn invalid_yaml_is_rejected() {
        let result: Result<GolConfig, _> = serde_yml::from_str("engine: [1, 2");
        assert!(result.is_err());
    }
}
