//! Ports: the traits the application layer talks to its collaborators through.
//!
//! The bridge has three external collaborators:
//!
//! - a **device store** holding device records, keyed by [`DeviceId`];
//! - a **realtime transport** that broadcasts a string to every subscriber of
//!   a named channel;
//! - the **broker link**, the shared MQTT connection handle.
//!
//! Infrastructure provides the production implementations
//! (`InMemoryDeviceStore`, `RealtimeHub`, `MqttLink`); tests provide
//! recording doubles.  Every trait is `Send + Sync` because the same handle is
//! used concurrently by the dispatch loop and by command publishers.

use async_trait::async_trait;
use device_bridge_core::{Device, DeviceId, InboundEnvelope, OwnerId, QosLevel};
use thiserror::Error;

/// Failure reported by a [`DeviceStore`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// The store could not be reached or refused the operation.
    #[error("device store unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by a [`RealtimeTransport`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// The broadcast frame could not be encoded.
    #[error("failed to encode realtime frame: {0}")]
    Encode(String),

    /// The transport refused the broadcast.
    #[error("realtime transport rejected broadcast on '{channel}': {reason}")]
    Rejected { channel: String, reason: String },
}

/// Failure reported by a [`BrokerLink`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LinkError {
    /// The request could not be handed to the MQTT client.
    #[error("broker request failed: {0}")]
    Request(String),
}

/// Device persistence, owned by another service.
///
/// No transactional guarantee beyond single-record atomicity is assumed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Looks up one device.  `Ok(None)` when the id is unknown.
    async fn find_by_id(&self, id: DeviceId) -> Result<Option<Device>, StoreError>;

    /// Inserts or replaces a device record and returns the stored value.
    async fn save(&self, device: Device) -> Result<Device, StoreError>;

    /// Lists every device belonging to `owner`.
    ///
    /// Part of the store contract the bridge shares with the rest of the
    /// system; message handling itself never calls it.
    async fn list_by_owner(&self, owner: OwnerId) -> Result<Vec<Device>, StoreError>;
}

/// Realtime delivery to live-connected clients.
///
/// Best effort: a successful return means the transport accepted the
/// broadcast, not that any client received it.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Broadcasts `payload` unchanged to every subscriber of `channel`.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError>;
}

/// The shared broker connection handle.
///
/// All methods only enqueue a request with the MQTT client; success says
/// nothing about delivery.
#[async_trait]
pub trait BrokerLink: Send + Sync {
    /// Subscribes to a topic filter.
    async fn subscribe(&self, filter: &str, qos: QosLevel) -> Result<(), LinkError>;

    /// Publishes a non-retained message.
    async fn publish(&self, topic: &str, payload: &str, qos: QosLevel) -> Result<(), LinkError>;

    /// Sends a DISCONNECT to the broker.
    async fn disconnect(&self) -> Result<(), LinkError>;
}

/// What the broker event pump reports to the connection manager.
///
/// The pump owns the MQTT event loop; the manager consumes these events one
/// at a time on a single task.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// A connection attempt is starting.
    Connecting { reconnect: bool },

    /// The broker accepted the connection (CONNACK).
    Connected {
        reconnect: bool,
        session_present: bool,
    },

    /// A connection attempt failed before the broker accepted it.
    ConnectFailed { reason: String },

    /// An established connection dropped.
    ConnectionLost { reason: String },

    /// A message arrived on a subscribed topic.
    Message(InboundEnvelope),

    /// The pump stopped; no more events will follow.
    Closed,
}
