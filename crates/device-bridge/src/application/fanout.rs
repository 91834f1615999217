//! Realtime fan-out of device messages.
//!
//! Every routable message is rebroadcast on the channel
//! `devices/{deviceId}/{kind}` with its payload forwarded unchanged.  The
//! device-id segment is used verbatim: fan-out does not require it to be a
//! UUID, so `devices/abc-123/control` is broadcast on
//! `devices/abc-123/control`.

use std::sync::Arc;
use std::time::Duration;

use device_bridge_core::{channel_name, MessageKind};
use thiserror::Error;
use tracing::debug;

use crate::application::deadline::within;
use crate::application::ports::{RealtimeTransport, TransportError};

/// Why a broadcast failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BroadcastError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("realtime transport did not answer within {0:?}")]
    Timeout(Duration),
}

/// Forwards device payloads to the realtime transport.
pub struct FanoutBroadcaster {
    transport: Arc<dyn RealtimeTransport>,
    timeout: Option<Duration>,
}

impl FanoutBroadcaster {
    /// `timeout` bounds each transport call; `None` waits indefinitely.
    pub fn new(transport: Arc<dyn RealtimeTransport>, timeout: Option<Duration>) -> Self {
        Self { transport, timeout }
    }

    /// Broadcasts `payload` on the channel for `device_id` and `kind` and
    /// returns the channel name.
    pub async fn broadcast(
        &self,
        device_id: &str,
        kind: MessageKind,
        payload: &str,
    ) -> Result<String, BroadcastError> {
        let channel = channel_name(device_id, kind);
        within(self.timeout, self.transport.publish(&channel, payload))
            .await
            .map_err(BroadcastError::Timeout)??;
        debug!("broadcast {} byte(s) on {channel}", payload.len());
        Ok(channel)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
