//! device-bridge library crate.
//!
//! Bridges IoT devices that speak MQTT to realtime (WebSocket) clients.
//! Every message a device publishes under `devices/{deviceId}/{kind}` is
//! rebroadcast on the realtime channel of the same name; status messages also
//! keep the stored online flag of the device up to date.  Realtime clients can
//! send commands back to devices over the same broker connection.
//!
//! # Architecture
//!
//! ```text
//! Devices ── MQTT broker ──┐
//!                          ↕ (rumqttc)
//! [device-bridge]
//!   ├── domain/           Config, realtime JSON frames
//!   ├── application/      Dispatch, status reconciliation, fan-out,
//!   │                     connection lifecycle, command publishing
//!   └── infrastructure/
//!         ├── mqtt_link/    rumqttc client + event pump
//!         ├── realtime_hub/ WebSocket hub (tokio-tungstenite)
//!         ├── device_store/ in-memory device records
//!         ├── config_file/  TOML configuration
//!         └── runtime/      DeviceBridge: startup and shutdown
//!                          ↕
//! Realtime clients (JSON over WebSocket)
//! ```
//!
//! # Layer rules
//!
//! - `domain` does no I/O.
//! - `application` reaches the outside world only through `application::ports`.
//! - `infrastructure` implements the ports and owns all tasks and sockets.

/// Domain layer: configuration and realtime frame types.
pub mod domain;

/// Application layer: message handling and connection lifecycle.
pub mod application;

/// Infrastructure layer: MQTT, WebSocket, storage and runtime wiring.
pub mod infrastructure;
