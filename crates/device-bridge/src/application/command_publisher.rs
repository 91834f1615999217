//! Outbound commands: publishing to the broker on the shared connection.
//!
//! A [`CommandPublisher`] is a cheap clonable handle.  It refuses to publish
//! unless the connection manager currently reports
//! [`ConnectionState::Connected`]; nothing is buffered for later delivery.
//! Success means the MQTT client accepted the request, not that the device
//! received it.

use std::sync::Arc;

use device_bridge_core::{command_topic, QosLevel};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::application::connection_manager::ConnectionState;
use crate::application::ports::{BrokerLink, LinkError};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PublishError {
    #[error("not connected to the broker ({state:?}); publish to '{topic}' dropped")]
    NotConnected {
        topic: String,
        state: ConnectionState,
    },

    #[error("publish to '{topic}' failed: {source}")]
    Link {
        topic: String,
        #[source]
        source: LinkError,
    },
}

#[derive(Clone)]
pub struct CommandPublisher {
    link: Arc<dyn BrokerLink>,
    state: watch::Receiver<ConnectionState>,
    qos: QosLevel,
}

impl CommandPublisher {
    /// `qos` is the default used by [`CommandPublisher::publish`].
    pub fn new(
        link: Arc<dyn BrokerLink>,
        state: watch::Receiver<ConnectionState>,
        qos: QosLevel,
    ) -> Self {
        Self { link, state, qos }
    }

    /// Publishes `payload` to `topic` at the configured QoS, not retained.
    pub async fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        self.publish_with_qos(topic, payload, self.qos).await
    }

    /// Publishes `payload` to `topic` at an explicit QoS, not retained.
    ///
    /// The topic is not checked against the device topic shape.
    pub async fn publish_with_qos(
        &self,
        topic: &str,
        payload: &str,
        qos: QosLevel,
    ) -> Result<(), PublishError> {
        let state = *self.state.borrow();
        if state != ConnectionState::Connected {
            error!("cannot publish to {topic}: broker connection is {state:?}");
            return Err(PublishError::NotConnected {
                topic: topic.to_string(),
                state,
            });
        }

        self.link
            .publish(topic, payload, qos)
            .await
            .map_err(|source| {
                error!("publish to {topic} failed: {source}");
                PublishError::Link {
                    topic: topic.to_string(),
                    source,
                }
            })?;

        debug!("published {} byte(s) to {topic} at QoS {qos}", payload.len());
        Ok(())
    }

    /// Publishes `payload` on `devices/{device_id}/control`.
    pub async fn send_device_command(
        &self,
        device_id: &str,
        payload: &str,
    ) -> Result<(), PublishError> {
        self.publish(&command_topic(device_id), payload).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
