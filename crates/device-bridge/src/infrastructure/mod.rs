//! Infrastructure layer: I/O adapters behind the application ports.
//!
//! - [`mqtt_link`]: `rumqttc` client and event pump.
//! - [`realtime_hub`]: WebSocket hub and accept loop.
//! - [`device_store`]: in-memory device records.
//! - [`config_file`]: optional TOML configuration.
//! - [`runtime`]: [`DeviceBridge`], which owns the background tasks.

pub mod config_file;
pub mod device_store;
pub mod mqtt_link;
pub mod realtime_hub;
pub mod runtime;

pub use config_file::{load_config_file, parse_config, ConfigFileError, FileConfig};
pub use device_store::InMemoryDeviceStore;
pub use mqtt_link::{EventPump, MqttLink};
pub use realtime_hub::{run_realtime_server, RealtimeHub};
pub use runtime::DeviceBridge;
