//! The device record as seen by the bridge.
//!
//! Device identifiers travel through MQTT topics as plain strings.  The store
//! is keyed by UUID, so every id taken from a topic must go through
//! [`parse_device_id`] before it can be used as a key.  Routing itself never
//! validates the id: a topic such as `devices/not-a-uuid/telemetry` is still
//! routable and its payload is still broadcast.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a device (the device store's native key type).
pub type DeviceId = Uuid;

/// Unique identifier of the user that owns a device.
pub type OwnerId = Uuid;

/// A device record held by the external device store.
///
/// Only `is_online` is ever written by the bridge.  The remaining fields are
/// carried so that a `save` through the store writes back a complete record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Store key.
    pub id: DeviceId,
    /// The user this device belongs to.
    pub owner_id: OwnerId,
    /// Human-readable label.
    pub name: String,
    /// Free-form device category (e.g. `"sensor"`, `"valve"`).
    #[serde(default)]
    pub device_type: String,
    /// Last reported online state.  Last write wins.
    #[serde(default)]
    pub is_online: bool,
    /// Optional topic prefix the device was provisioned with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mqtt_topic_prefix: Option<String>,
}

impl Device {
    /// Creates an offline device with no topic prefix.
    pub fn new(id: DeviceId, owner_id: OwnerId, name: impl Into<String>) -> Self {
        Self {
            id,
            owner_id,
            name: name.into(),
            device_type: String::new(),
            is_online: false,
            mqtt_topic_prefix: None,
        }
    }
}

/// Parses the device-id segment of a topic into the store key type.
///
/// Accepts the same textual forms as [`Uuid::parse_str`] (hyphenated,
/// simple, braced and URN).  Returns `None` for anything else.
///
/// # Examples
///
/// ```rust
/// use device_bridge_core::parse_device_id;
///
/// assert!(parse_device_id("67e55044-10b1-426f-9247-bb680e5fe0c8").is_some());
/// assert!(parse_device_id("abc-123").is_none());
/// ```
pub fn parse_device_id(raw: &str) -> Option<DeviceId> {
    Uuid::parse_str(raw).ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
