//! Bridge configuration
//!
//! JSON file with every key optional. Looked up in `./config.json`, then
//! `~/.hermes/config.json`; when neither exists the defaults apply.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hermes_gateway::{ChannelRole, ConnectionConfig, HeartbeatConfig};
use log::{info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RunnerError};

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const CONFIG_DIR_NAME: &str = ".hermes";

/// Floor for the liveness sampling period
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Root configuration of the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Duplex command pipe
    #[serde(default = "default_pipe_name")]
    pub pipe_name: String,
    /// Event pipe the platform writes to
    #[serde(default = "default_inbound_pipe")]
    pub inbound_pipe: String,
    /// Event pipe the platform reads orders from
    #[serde(default = "default_outbound_pipe")]
    pub outbound_pipe: String,
    /// Seconds between reconnect attempts; fractions allowed on every
    /// seconds field
    #[serde(default = "default_retry_interval")]
    pub retry_interval: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `null` logs to stderr only
    #[serde(default = "default_log_file")]
    pub log_file: Option<String>,
    #[serde(default = "default_order_size")]
    pub default_order_size: Decimal,
    #[serde(default = "default_algo_range")]
    pub default_algo_range: Decimal,
    /// Seconds between automatic refreshes, 0 disables
    #[serde(default = "default_data_refresh_interval")]
    pub data_refresh_interval: f64,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: f64,
    /// Seconds of silence before the event link counts as dead
    #[serde(default = "default_liveness_threshold")]
    pub liveness_threshold: f64,
    /// Seconds to wait for the platform to attach, 0 waits forever
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: f64,
    /// Seconds to wait for a command response, 0 waits forever
    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            pipe_name: default_pipe_name(),
            inbound_pipe: default_inbound_pipe(),
            outbound_pipe: default_outbound_pipe(),
            retry_interval: default_retry_interval(),
            max_retries: default_max_retries(),
            log_level: default_log_level(),
            log_file: default_log_file(),
            default_order_size: default_order_size(),
            default_algo_range: default_algo_range(),
            data_refresh_interval: default_data_refresh_interval(),
            heartbeat_interval: default_heartbeat_interval(),
            liveness_threshold: default_liveness_threshold(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: BridgeConfig,
    pub source: ConfigSource,
}

impl LoadedConfig {
    /// Path `save` writes back to
    pub fn path(&self) -> PathBuf {
        match &self.source {
            ConfigSource::File(path) => path.clone(),
            ConfigSource::Defaults => PathBuf::from(CONFIG_FILE_NAME),
        }
    }

    pub fn source_description(&self) -> String {
        match &self.source {
            ConfigSource::File(path) => format!("Configuration loaded from {}", path.display()),
            ConfigSource::Defaults => "Config file not found, using defaults".to_string(),
        }
    }

    /// Report where the configuration came from; call once logging is up
    pub fn log_source(&self) {
        match self.source {
            ConfigSource::File(_) => info!("{}", self.source_description()),
            ConfigSource::Defaults => warn!("{}", self.source_description()),
        }
    }
}

impl BridgeConfig {
    /// Load an explicit file, or search the standard locations
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
        match explicit {
            Some(path) => Ok(LoadedConfig {
                config: Self::from_file(path)?,
                source: ConfigSource::File(path.to_path_buf()),
            }),
            None => Self::search(&candidate_paths()),
        }
    }

    /// First existing candidate wins; none existing means defaults
    pub fn search(candidates: &[PathBuf]) -> Result<LoadedConfig> {
        for path in candidates {
            if path.is_file() {
                return Ok(LoadedConfig {
                    config: Self::from_file(path)?,
                    source: ConfigSource::File(path.clone()),
                });
            }
        }
        Ok(LoadedConfig {
            config: Self::default(),
            source: ConfigSource::Defaults,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| RunnerError::ConfigIo {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|reason| RunnerError::ConfigParse {
            path: path.display().to_string(),
            reason,
        })
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, String> {
        serde_json::from_str(json).map_err(|e| e.to_string())
    }

    /// Write pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let save_error = |reason: String| RunnerError::ConfigSave {
            path: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| save_error(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| save_error(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| save_error(e.to_string()))?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    pub fn retry_interval(&self) -> Duration {
        seconds(self.retry_interval)
    }

    /// `None` when auto-refresh is disabled
    pub fn refresh_interval(&self) -> Option<Duration> {
        seconds_or_none(self.data_refresh_interval)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        seconds_or_none(self.connect_timeout)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        seconds_or_none(self.request_timeout)
    }

    /// Settings for the command pipe
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.pipe_name.clone())
            .with_role(ChannelRole::Serve)
            .with_retry(self.retry_interval(), self.max_retries)
            .with_connect_timeout(self.connect_timeout())
            .with_request_timeout(self.request_timeout())
    }

    pub fn heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            interval: seconds(self.heartbeat_interval).max(MIN_HEARTBEAT_INTERVAL),
            threshold: seconds(self.liveness_threshold),
        }
    }
}

/// `./config.json`, then `~/.hermes/config.json`
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(home) = home_dir() {
        paths.push(home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

/// Negative, NaN or out-of-range values count as zero
fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

fn seconds_or_none(secs: f64) -> Option<Duration> {
    Some(seconds(secs)).filter(|duration| !duration.is_zero())
}

// Default value functions for serde
#[cfg(windows)]
fn default_pipe_name() -> String {
    r"\\.\pipe\mql5_python_pipe".to_string()
}

#[cfg(windows)]
fn default_inbound_pipe() -> String {
    r"\\.\pipe\mt5_to_python".to_string()
}

#[cfg(windows)]
fn default_outbound_pipe() -> String {
    r"\\.\pipe\python_to_mt5".to_string()
}

#[cfg(not(windows))]
fn default_pipe_name() -> String {
    "/tmp/mql5_python_pipe".to_string()
}

#[cfg(not(windows))]
fn default_inbound_pipe() -> String {
    "/tmp/mt5_to_python".to_string()
}

#[cfg(not(windows))]
fn default_outbound_pipe() -> String {
    "/tmp/python_to_mt5".to_string()
}

fn default_retry_interval() -> f64 {
    5.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_log_file() -> Option<String> {
    Some("hermes.log".to_string())
}

fn default_order_size() -> Decimal {
    Decimal::new(1, 2)
}

fn default_algo_range() -> Decimal {
    Decimal::from(10)
}

fn default_data_refresh_interval() -> f64 {
    10.0
}

fn default_heartbeat_interval() -> f64 {
    5.0
}

fn default_liveness_threshold() -> f64 {
    30.0
}

fn default_connect_timeout() -> f64 {
    30.0
}

fn default_request_timeout() -> f64 {
    10.0
}
