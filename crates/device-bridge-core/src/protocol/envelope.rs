//! The inbound message envelope and the quality-of-service level.
//!
//! An [`InboundEnvelope`] is created by the broker event pump for every
//! publish it receives and lives only for the duration of one dispatch.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when an integer is not a valid MQTT QoS level.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("invalid QoS level {0}; expected 0, 1 or 2")]
pub struct QosError(pub u8);

/// MQTT delivery guarantee.
///
/// Serialized as its integer value so that configuration files can write
/// `qos = 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QosLevel {
    /// QoS 0.
    AtMostOnce,
    /// QoS 1.
    AtLeastOnce,
    /// QoS 2.
    ExactlyOnce,
}

impl TryFrom<u8> for QosLevel {
    type Error = QosError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QosLevel::AtMostOnce),
            1 => Ok(QosLevel::AtLeastOnce),
            2 => Ok(QosLevel::ExactlyOnce),
            other => Err(QosError(other)),
        }
    }
}

impl From<QosLevel> for u8 {
    fn from(qos: QosLevel) -> Self {
        match qos {
            QosLevel::AtMostOnce => 0,
            QosLevel::AtLeastOnce => 1,
            QosLevel::ExactlyOnce => 2,
        }
    }
}

impl fmt::Display for QosLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// One message received from the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEnvelope {
    /// Topic the message was published on.
    pub topic: String,
    /// Payload as UTF-8 text.
    ///
    /// Invalid UTF-8 sequences are replaced with U+FFFD when the envelope is
    /// built; valid payloads are kept byte-for-byte.
    pub payload: String,
    /// Delivery guarantee the message arrived with.
    pub qos: QosLevel,
    /// Whether the broker delivered a retained message.
    pub retained: bool,
    /// Local arrival time.
    pub arrived_at: SystemTime,
}

impl InboundEnvelope {
    /// Builds an envelope from raw broker data, stamping the arrival time.
    pub fn new(topic: impl Into<String>, payload: &[u8], qos: QosLevel, retained: bool) -> Self {
        Self {
            topic: topic.into(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            qos,
            retained,
            arrived_at: SystemTime::now(),
        }
    }

    /// Convenience constructor for text payloads at QoS 0, not retained.
    pub fn text(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QosLevel::AtMostOnce,
            retained: false,
            arrived_at: SystemTime::now(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
