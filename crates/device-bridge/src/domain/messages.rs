//! JSON frames of the realtime WebSocket protocol.
//!
//! Realtime clients (dashboards, mobile apps) connect to the hub, subscribe to
//! device channels by name and receive every payload the bridge broadcasts on
//! them.  They may also ask the bridge to publish a command to the broker.
//!
//! # JSON discriminant
//!
//! Every frame is a JSON object with a `"type"` field:
//!
//! ```json
//! {"type":"Subscribe","channel":"devices/abc-123/status"}
//! {"type":"Message","channel":"devices/abc-123/status","payload":"{\"is_online\":true}"}
//! ```

use serde::{Deserialize, Serialize};

/// Frames a realtime client sends to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Start receiving broadcasts on `channel`.
    Subscribe { channel: String },

    /// Stop receiving broadcasts on `channel`.
    Unsubscribe { channel: String },

    /// Publish `payload` to the broker on `topic`.
    ///
    /// The topic is passed through unchanged; the bridge does not check it
    /// against the device topic shape.
    Publish { topic: String, payload: String },
}

/// Frames the hub sends to a realtime client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Acknowledges a `Subscribe`.
    Subscribed { channel: String },

    /// Acknowledges an `Unsubscribe`.
    Unsubscribed { channel: String },

    /// A broadcast on a subscribed channel.  `payload` is the device payload
    /// exactly as it arrived from the broker.
    Message { channel: String, payload: String },

    /// Outcome of a `Publish` request (local enqueue only, not delivery).
    PublishResult {
        topic: String,
        accepted: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// The client sent something the hub could not understand.
    Error { reason: String },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
