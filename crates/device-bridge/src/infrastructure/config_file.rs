//! TOML configuration file.
//!
//! The file is optional and every key in it is optional.  Values present in
//! the file override the built-in defaults; CLI flags and environment
//! variables override the file (see `main.rs`).
//!
//! ```toml
//! log_level = "info"
//! dispatch_timeout_ms = 10000
//!
//! [mqtt]
//! broker_url = "tcp://broker.local:1883"
//! client_id = "device-bridge"
//! keep_alive_secs = 60
//! connection_timeout_secs = 30
//! qos = 1
//! clean_session = true
//! automatic_reconnect = true
//! reconnect_delay_secs = 5
//!
//! [realtime]
//! bind_addr = "0.0.0.0:8765"
//!
//! [[devices]]
//! id = "6f1c2a7e-3b4d-4e8f-9a0b-1c2d3e4f5a6b"
//! owner_id = "00000000-0000-0000-0000-000000000001"
//! name = "hallway thermostat"
//! device_type = "thermostat"
//! ```
//!
//! `dispatch_timeout_ms = 0` disables the dispatch timeout.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use device_bridge_core::{Device, QosLevel};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::config::BridgeConfig;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── File schema ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// `tracing` filter directive, e.g. `"info"` or `"device_bridge=debug"`.
    pub log_level: Option<String>,
    pub dispatch_timeout_ms: Option<u64>,
    pub mqtt: FileMqttConfig,
    pub realtime: FileRealtimeConfig,
    /// Seed records for the in-memory device store.
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileMqttConfig {
    pub broker_url: Option<String>,
    pub client_id: Option<String>,
    pub keep_alive_secs: Option<u64>,
    pub connection_timeout_secs: Option<u64>,
    pub qos: Option<QosLevel>,
    pub clean_session: Option<bool>,
    pub automatic_reconnect: Option<bool>,
    pub reconnect_delay_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileRealtimeConfig {
    pub bind_addr: Option<SocketAddr>,
}

impl FileConfig {
    /// Overrides the fields of `config` that this file sets.
    pub fn apply_to(self, config: &mut BridgeConfig) {
        let mqtt = &mut config.mqtt;
        if let Some(url) = self.mqtt.broker_url {
            mqtt.broker_url = url;
        }
        if let Some(id) = self.mqtt.client_id {
            mqtt.client_id = id;
        }
        if let Some(secs) = self.mqtt.keep_alive_secs {
            mqtt.keep_alive = Duration::from_secs(secs);
        }
        if let Some(secs) = self.mqtt.connection_timeout_secs {
            mqtt.connection_timeout = Duration::from_secs(secs);
        }
        if let Some(qos) = self.mqtt.qos {
            mqtt.qos = qos;
        }
        if let Some(clean) = self.mqtt.clean_session {
            mqtt.clean_session = clean;
        }
        if let Some(reconnect) = self.mqtt.automatic_reconnect {
            mqtt.automatic_reconnect = reconnect;
        }
        if let Some(secs) = self.mqtt.reconnect_delay_secs {
            mqtt.reconnect_delay = Duration::from_secs(secs);
        }

        if let Some(addr) = self.realtime.bind_addr {
            config.realtime.bind_addr = addr;
        }
        if let Some(ms) = self.dispatch_timeout_ms {
            config.dispatch_timeout = dispatch_timeout_from_millis(ms);
        }
        config.devices.extend(self.devices);
    }
}

/// `0` means no timeout.
pub fn dispatch_timeout_from_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses configuration from TOML text.
pub fn parse_config(text: &str) -> Result<FileConfig, ConfigFileError> {
    Ok(toml::from_str(text)?)
}

/// Reads and parses the file at `path`.
///
/// Unlike the defaults-only case, a path given explicitly must exist.
///
/// # Errors
///
/// [`ConfigFileError::Io`] if the file cannot be read and
/// [`ConfigFileError::Parse`] if the TOML is malformed or has unknown keys.
pub fn load_config_file(path: &Path) -> Result<FileConfig, ConfigFileError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
