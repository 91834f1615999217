//! Domain layer for the device bridge.
//!
//! Pure types with no I/O: the runtime configuration and the JSON frames of
//! the realtime protocol.  Topic routing and the device record live in
//! `device-bridge-core` because they are shared with anything else that
//! speaks the device topic taxonomy.

pub mod config;
pub mod messages;

pub use config::{BridgeConfig, BrokerAddress, ConfigError, MqttSettings, RealtimeSettings};
pub use messages::{ClientFrame, ServerFrame};
