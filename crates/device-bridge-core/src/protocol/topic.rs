//! Topic router: maps a broker topic onto a device and a message kind.
//!
//! Wire shape:
//! ```text
//! devices/{device_id}/{status|control|telemetry}[/anything...]
//! ```
//! Only the first three `/`-separated segments are significant.  Anything
//! else (wrong first segment, fewer than three segments, an unknown kind) is
//! unroutable and the caller drops the message.
//!
//! The router is a pure function.  It does not validate the device-id segment;
//! an id that is not a UUID is forwarded and handled downstream.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// First topic segment of every device topic.
pub const DEVICE_NAMESPACE: &str = "devices";

/// The single wildcard filter the bridge subscribes to.
pub const SUBSCRIPTION_FILTER: &str = "devices/#";

/// The kind of message a device published, taken from the third topic segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Online/offline report; JSON with an `is_online` boolean.
    Status,
    /// Control echo from the device; opaque text.
    Control,
    /// Sensor readings; opaque text.
    Telemetry,
}

impl MessageKind {
    /// Returns the topic segment for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Status => "status",
            MessageKind::Control => "control",
            MessageKind::Telemetry => "telemetry",
        }
    }

    /// Parses a topic segment.  Matching is exact and case-sensitive.
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "status" => Some(MessageKind::Status),
            "control" => Some(MessageKind::Control),
            "telemetry" => Some(MessageKind::Telemetry),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a topic could not be routed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    /// The topic has fewer than three segments.
    #[error("topic has {found} segment(s), need at least 3")]
    TooFewSegments { found: usize },

    /// The first segment is not `devices`.
    #[error("topic namespace '{0}' is not 'devices'")]
    WrongNamespace(String),

    /// The third segment is not `status`, `control` or `telemetry`.
    #[error("unknown message kind '{0}'")]
    UnknownKind(String),
}

/// A routable device topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRoute {
    /// The raw device-id segment.  Not validated.
    pub device_id: String,
    /// The message kind.
    pub kind: MessageKind,
}

impl DeviceRoute {
    /// Realtime channel this route broadcasts on.
    pub fn channel(&self) -> String {
        channel_name(&self.device_id, self.kind)
    }
}

/// Routes a broker topic to a device and message kind.
///
/// # Errors
///
/// Returns a [`RouteError`] describing why the topic is unroutable.
///
/// # Examples
///
/// ```rust
/// use device_bridge_core::{route_topic, MessageKind};
///
/// let route = route_topic("devices/abc-123/control").unwrap();
/// assert_eq!(route.device_id, "abc-123");
/// assert_eq!(route.kind, MessageKind::Control);
///
/// assert!(route_topic("sensors/abc-123/control").is_err());
/// ```
pub fn route_topic(topic: &str) -> Result<DeviceRoute, RouteError> {
    let mut segments = topic.split('/');

    // `split` always yields at least one item, even for an empty string.
    let namespace = segments.next().unwrap_or_default();
    let (device_id, kind) = match (segments.next(), segments.next()) {
        (Some(device_id), Some(kind)) => (device_id, kind),
        (Some(_), None) => return Err(RouteError::TooFewSegments { found: 2 }),
        _ => return Err(RouteError::TooFewSegments { found: 1 }),
    };

    if namespace != DEVICE_NAMESPACE {
        return Err(RouteError::WrongNamespace(namespace.to_string()));
    }

    let kind = MessageKind::from_segment(kind)
        .ok_or_else(|| RouteError::UnknownKind(kind.to_string()))?;

    Ok(DeviceRoute {
        device_id: device_id.to_string(),
        kind,
    })
}

/// Builds the realtime channel name for a device and message kind.
///
/// The channel name is identical to the inbound topic taxonomy.
pub fn channel_name(device_id: &str, kind: MessageKind) -> String {
    format!("{DEVICE_NAMESPACE}/{device_id}/{kind}")
}

/// Builds the outbound topic used to send a control command to a device.
pub fn command_topic(device_id: &str) -> String {
    channel_name(device_id, MessageKind::Control)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
