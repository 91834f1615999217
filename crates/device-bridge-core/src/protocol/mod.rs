//! Protocol module: topic routing, the inbound envelope and status payloads.

pub mod envelope;
pub mod status;
pub mod topic;

pub use envelope::{InboundEnvelope, QosError, QosLevel};
pub use status::{parse_status_payload, StatusPayloadError, StatusReport};
pub use topic::{channel_name, command_topic, route_topic, DeviceRoute, MessageKind, RouteError};
