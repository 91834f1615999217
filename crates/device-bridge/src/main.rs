//! Device bridge entry point.
//!
//! Connects to the MQTT broker, subscribes to `devices/#`, and serves the
//! realtime WebSocket hub until Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! device-bridge [OPTIONS]
//!
//! Options:
//!   --config <PATH>                 TOML configuration file
//!   --broker-url <URL>              [default: tcp://127.0.0.1:1883]
//!   --client-id <ID>                [default: device-bridge]
//!   --keep-alive <SECS>             [default: 60]
//!   --connection-timeout <SECS>     [default: 30]
//!   --qos <0|1|2>                   [default: 1]
//!   --clean-session <BOOL>          [default: true]
//!   --auto-reconnect <BOOL>         [default: true]
//!   --reconnect-delay <SECS>        [default: 5]
//!   --dispatch-timeout-ms <MS>      0 disables [default: 10000]
//!   --ws-bind <IP>                  [default: 0.0.0.0]
//!   --ws-port <PORT>                [default: 8765]
//! ```
//!
//! Precedence: CLI flag, then environment variable, then config file, then
//! built-in default.
//!
//! | Variable                          | Flag                     |
//! |-----------------------------------|--------------------------|
//! | `BRIDGE_MQTT_BROKER_URL`          | `--broker-url`           |
//! | `BRIDGE_MQTT_CLIENT_ID`           | `--client-id`            |
//! | `BRIDGE_MQTT_KEEP_ALIVE`          | `--keep-alive`           |
//! | `BRIDGE_MQTT_CONNECTION_TIMEOUT`  | `--connection-timeout`   |
//! | `BRIDGE_MQTT_QOS`                 | `--qos`                  |
//! | `BRIDGE_MQTT_CLEAN_SESSION`       | `--clean-session`        |
//! | `BRIDGE_MQTT_AUTO_RECONNECT`      | `--auto-reconnect`       |
//! | `BRIDGE_MQTT_RECONNECT_DELAY`     | `--reconnect-delay`      |
//! | `BRIDGE_DISPATCH_TIMEOUT_MS`      | `--dispatch-timeout-ms`  |
//! | `BRIDGE_WS_BIND`                  | `--ws-bind`              |
//! | `BRIDGE_WS_PORT`                  | `--ws-port`              |
//!
//! The log filter comes from `RUST_LOG`, else `log_level` in the config file,
//! else `info`.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use device_bridge::domain::BridgeConfig;
use device_bridge::infrastructure::config_file::dispatch_timeout_from_millis;
use device_bridge::infrastructure::{
    load_config_file, run_realtime_server, DeviceBridge, FileConfig, InMemoryDeviceStore,
    RealtimeHub,
};
use device_bridge_core::QosLevel;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// MQTT to WebSocket device message bridge.
///
/// Every option is optional; unset options fall back to the config file and
/// then to built-in defaults.
#[derive(Debug, Default, Parser)]
#[command(
    name = "device-bridge",
    about = "Bridges MQTT device messages to realtime WebSocket clients",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Broker URL (`tcp://host:port` or `mqtt://host:port`).
    #[arg(long, env = "BRIDGE_MQTT_BROKER_URL")]
    broker_url: Option<String>,

    /// Base MQTT client id; a start-time suffix is appended.
    #[arg(long, env = "BRIDGE_MQTT_CLIENT_ID")]
    client_id: Option<String>,

    /// Keep-alive interval in seconds.
    #[arg(long, env = "BRIDGE_MQTT_KEEP_ALIVE")]
    keep_alive: Option<u64>,

    /// Connection timeout in seconds.
    #[arg(long, env = "BRIDGE_MQTT_CONNECTION_TIMEOUT")]
    connection_timeout: Option<u64>,

    /// QoS for the subscription and outbound commands.
    #[arg(long, env = "BRIDGE_MQTT_QOS", value_parser = clap::value_parser!(u8).range(0..=2))]
    qos: Option<u8>,

    #[arg(long, env = "BRIDGE_MQTT_CLEAN_SESSION")]
    clean_session: Option<bool>,

    #[arg(long, env = "BRIDGE_MQTT_AUTO_RECONNECT")]
    auto_reconnect: Option<bool>,

    /// Delay between reconnect attempts in seconds.
    #[arg(long, env = "BRIDGE_MQTT_RECONNECT_DELAY")]
    reconnect_delay: Option<u64>,

    /// Per-call store/broadcast timeout in milliseconds; 0 disables it.
    #[arg(long, env = "BRIDGE_DISPATCH_TIMEOUT_MS")]
    dispatch_timeout_ms: Option<u64>,

    /// IP address the WebSocket hub binds to.
    #[arg(long, env = "BRIDGE_WS_BIND")]
    ws_bind: Option<IpAddr>,

    /// Port the WebSocket hub listens on.
    #[arg(long, env = "BRIDGE_WS_PORT")]
    ws_port: Option<u16>,
}

impl Cli {
    /// Layers defaults, the config file and these arguments into a
    /// [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting broker URL cannot be parsed or a
    /// timeout cannot be carried by MQTT.
    fn into_bridge_config(self, file: Option<FileConfig>) -> anyhow::Result<BridgeConfig> {
        let mut config = BridgeConfig::default();
        if let Some(file) = file {
            file.apply_to(&mut config);
        }

        let mqtt = &mut config.mqtt;
        if let Some(url) = self.broker_url {
            mqtt.broker_url = url;
        }
        if let Some(id) = self.client_id {
            mqtt.client_id = id;
        }
        if let Some(secs) = self.keep_alive {
            mqtt.keep_alive = Duration::from_secs(secs);
        }
        if let Some(secs) = self.connection_timeout {
            mqtt.connection_timeout = Duration::from_secs(secs);
        }
        if let Some(qos) = self.qos {
            mqtt.qos = QosLevel::try_from(qos).context("invalid --qos")?;
        }
        if let Some(clean) = self.clean_session {
            mqtt.clean_session = clean;
        }
        if let Some(reconnect) = self.auto_reconnect {
            mqtt.automatic_reconnect = reconnect;
        }
        if let Some(secs) = self.reconnect_delay {
            mqtt.reconnect_delay = Duration::from_secs(secs);
        }
        if let Some(ms) = self.dispatch_timeout_ms {
            config.dispatch_timeout = dispatch_timeout_from_millis(ms);
        }
        if let Some(ip) = self.ws_bind {
            config.realtime.bind_addr.set_ip(ip);
        }
        if let Some(port) = self.ws_port {
            config.realtime.bind_addr.set_port(port);
        }

        config
            .mqtt
            .validate()
            .context("invalid MQTT settings")?;
        Ok(config)
    }
}

fn init_tracing(file_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(file_level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => Some(
            load_config_file(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
        ),
        None => None,
    };
    init_tracing(file.as_ref().and_then(|f| f.log_level.as_deref()));

    let config = cli.into_bridge_config(file)?;
    info!(
        "device bridge starting: broker={}, realtime={}, seeded devices={}",
        config.mqtt.broker_url,
        config.realtime.bind_addr,
        config.devices.len()
    );

    let store = Arc::new(InMemoryDeviceStore::with_devices(config.devices.clone()));
    let hub = Arc::new(RealtimeHub::new());
    let mut bridge = DeviceBridge::start(&config, store, hub.clone())
        .context("failed to start device bridge")?;

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    let served =
        run_realtime_server(&config.realtime, hub, bridge.command_publisher(), running).await;

    bridge.shutdown().await;
    let stats = bridge.stats().snapshot();
    info!(
        "device bridge stopped: received={}, broadcast={}, status_updates={}, dropped={}",
        stats.received,
        stats.broadcasts,
        stats.status_updates,
        stats.dropped()
    );

    served
}

// ── Tests ─────────────────────────────────────────────────────────────────────
