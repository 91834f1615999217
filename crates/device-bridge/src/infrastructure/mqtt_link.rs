//! MQTT broker link built on `rumqttc`.
//!
//! [`connect`] splits the broker connection in two halves:
//!
//! - [`MqttLink`], the cloneable request side ([`BrokerLink`]).  Requests are
//!   handed to the `rumqttc` client without waiting, so a slow broker never
//!   blocks the dispatch loop or a realtime session.
//! - [`EventPump`], the owner of the `rumqttc` event loop.  It drives the
//!   network I/O and translates what happens into [`BrokerEvent`]s for the
//!   connection manager.
//!
//! # Reconnection
//!
//! `rumqttc` reconnects when the event loop is polled again after an error.
//! The pump waits `reconnect_delay` between attempts.  Each attempt (TCP
//! connect plus CONNACK) is bounded by `connection_timeout`, which is handed
//! to `rumqttc` through its [`NetworkOptions`].  With automatic reconnect
//! disabled, the first failure ends the pump.
//!
//! # Disconnecting
//!
//! A DISCONNECT requested through [`MqttLink`] is only queued.  The pump keeps
//! polling until `rumqttc` reports it as written and then ends on its own, so
//! the stop signal is only needed for a pump that never got that far.

use std::time::Duration;

use async_trait::async_trait;
use device_bridge_core::{InboundEnvelope, QosLevel};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, NetworkOptions, Outgoing, Packet, QoS};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace};

use crate::application::ports::{BrokerEvent, BrokerLink, LinkError};
use crate::domain::config::{ConfigError, MqttSettings};

/// Capacity of the `rumqttc` request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Maps the bridge's QoS level onto `rumqttc`'s.
pub fn to_qos(level: QosLevel) -> QoS {
    match level {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        QosLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// Inverse of [`to_qos`].
pub fn from_qos(qos: QoS) -> QosLevel {
    match qos {
        QoS::AtMostOnce => QosLevel::AtMostOnce,
        QoS::AtLeastOnce => QosLevel::AtLeastOnce,
        QoS::ExactlyOnce => QosLevel::ExactlyOnce,
    }
}

/// Builds the client and its event pump.  Does no I/O.
///
/// # Errors
///
/// Returns [`ConfigError`] if the broker URL cannot be parsed or a timeout
/// is out of the range MQTT can carry (see [`MqttSettings::validate`]).
pub fn connect(settings: &MqttSettings) -> Result<(MqttLink, EventPump), ConfigError> {
    let address = settings.validate()?;
    let client_id = settings.unique_client_id();

    let mut options = MqttOptions::new(client_id.clone(), address.host.clone(), address.port);
    options.set_keep_alive(settings.keep_alive);
    options.set_clean_session(settings.clean_session);

    let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
    let mut network = NetworkOptions::new();
    network.set_connection_timeout(settings.connection_timeout_secs());
    event_loop.set_network_options(network);
    info!(
        "MQTT client {client_id} targeting {}:{} (connection timeout {}s)",
        address.host,
        address.port,
        settings.connection_timeout_secs()
    );

    let pump = EventPump {
        event_loop,
        automatic_reconnect: settings.automatic_reconnect,
        reconnect_delay: settings.reconnect_delay,
    };
    Ok((MqttLink { client }, pump))
}

// ── Request side ──────────────────────────────────────────────────────────────

/// Request side of the broker connection.
///
/// Every call only queues the request for the [`EventPump`]; `Ok` means it
/// was accepted locally, not that the broker has seen it.
#[derive(Clone)]
pub struct MqttLink {
    client: AsyncClient,
}

#[async_trait]
impl BrokerLink for MqttLink {
    async fn subscribe(&self, filter: &str, qos: QosLevel) -> Result<(), LinkError> {
        self.client
            .try_subscribe(filter, to_qos(qos))
            .map_err(|e| LinkError::Request(e.to_string()))
    }

    async fn publish(&self, topic: &str, payload: &str, qos: QosLevel) -> Result<(), LinkError> {
        self.client
            .try_publish(topic, to_qos(qos), false, payload.as_bytes().to_vec())
            .map_err(|e| LinkError::Request(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        self.client
            .try_disconnect()
            .map_err(|e| LinkError::Request(e.to_string()))
    }
}

// ── Event side ────────────────────────────────────────────────────────────────

/// Owner of the `rumqttc` event loop; see [`EventPump::run`].
pub struct EventPump {
    event_loop: EventLoop,
    automatic_reconnect: bool,
    reconnect_delay: Duration,
}

impl EventPump {
    /// Drives the connection until the queued DISCONNECT has been written,
    /// `stop` flips (or its sender is dropped), or a failure occurs with
    /// reconnect disabled.
    ///
    /// Always ends by sending [`BrokerEvent::Closed`] if the receiver is
    /// still there.
    pub async fn run(mut self, events: mpsc::Sender<BrokerEvent>, mut stop: watch::Receiver<bool>) {
        let mut connected = false;
        let mut ever_connected = false;

        if events
            .send(BrokerEvent::Connecting { reconnect: false })
            .await
            .is_err()
        {
            return;
        }

        loop {
            let polled = tokio::select! {
                _ = stop.changed() => break,
                polled = self.event_loop.poll() => polled.map_err(|e| e.to_string()),
            };

            let event = match polled {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    connected = true;
                    let reconnect = ever_connected;
                    ever_connected = true;
                    BrokerEvent::Connected {
                        reconnect,
                        session_present: ack.session_present,
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    BrokerEvent::Message(InboundEnvelope::new(
                        publish.topic,
                        &publish.payload,
                        from_qos(publish.qos),
                        publish.retain,
                    ))
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    connected = false;
                    BrokerEvent::ConnectionLost {
                        reason: "disconnected by broker".to_string(),
                    }
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    debug!("DISCONNECT sent; stopping event pump");
                    break;
                }
                Ok(other) => {
                    trace!("MQTT event: {other:?}");
                    continue;
                }
                Err(reason) => {
                    let event = if connected {
                        BrokerEvent::ConnectionLost { reason }
                    } else {
                        BrokerEvent::ConnectFailed { reason }
                    };
                    connected = false;
                    if events.send(event).await.is_err() || !self.automatic_reconnect {
                        break;
                    }

                    tokio::select! {
                        _ = stop.changed() => break,
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                    }
                    BrokerEvent::Connecting {
                        reconnect: ever_connected,
                    }
                }
            };

            if events.send(event).await.is_err() {
                break;
            }
        }

        let _ = events.send(BrokerEvent::Closed).await;
        debug!("MQTT event pump stopped");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
