//! # device-bridge-core
//!
//! Shared library for the device message bridge containing the topic router,
//! the inbound message envelope, status payload parsing and the device record.
//!
//! This crate has zero dependencies on async runtimes, sockets or the MQTT
//! client.  Everything in it is a plain function or a plain data type, so it
//! can be unit-tested without a broker.
//!
//! # Architecture overview
//!
//! Devices publish to a broker under a fixed topic taxonomy:
//!
//! ```text
//! devices/{device_id}/status      JSON, e.g. {"is_online": true}
//! devices/{device_id}/control     opaque text
//! devices/{device_id}/telemetry   opaque text
//! ```
//!
//! The bridge subscribes to `devices/#`, turns each topic into a
//! [`DeviceRoute`] with [`route_topic`], reconciles device online state from
//! `status` payloads and forwards every message to a realtime channel of the
//! same name.
//!
//! - **`protocol`** – topic routing, the envelope and status payload parsing.
//! - **`domain`** – the device record owned by the external device store.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `device_bridge_core::route_topic` instead of the full module path.
pub use domain::device::{parse_device_id, Device, DeviceId, OwnerId};
pub use protocol::envelope::{InboundEnvelope, QosLevel, QosError};
pub use protocol::status::{parse_status_payload, StatusPayloadError, StatusReport};
pub use protocol::topic::{
    channel_name, command_topic, route_topic, DeviceRoute, MessageKind, RouteError,
    DEVICE_NAMESPACE, SUBSCRIPTION_FILTER,
};
