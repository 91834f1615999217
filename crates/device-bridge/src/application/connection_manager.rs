//! Broker connection lifecycle.
//!
//! The [`ConnectionManager`] consumes [`BrokerEvent`]s from the event pump on a
//! single task, one at a time.  It tracks the connection state, (re)issues the
//! `devices/#` subscription on every successful connect, and hands each
//! inbound message to the [`MessageDispatcher`].
//!
//! # States
//!
//! ```text
//!                 Connecting{reconnect:false}
//!  Disconnected ─────────────────────────────▶ Connecting
//!       ▲                                          │ Connected
//!       │ ConnectFailed (never connected)          ▼
//!       ◀──────────────────────────────────── Connected ◀──┐
//!                                                  │       │ Connected
//!                          ConnectionLost /        ▼       │
//!                          ConnectFailed     ConnectionLost│
//!                                                  │       │
//!                       Connecting{reconnect:true} ▼       │
//!                                             Reconnecting ┘
//! ```
//!
//! `Closed` (or the pump going away) always ends in `Disconnected`.
//!
//! # Subscription ordering
//!
//! On `Connected` the subscription is requested before the state flips to
//! `Connected` and before the next event is read, so on a reconnect the
//! subscription is re-established before any message from the new session is
//! dispatched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use device_bridge_core::{QosLevel, SUBSCRIPTION_FILTER};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::application::command_publisher::CommandPublisher;
use crate::application::dispatcher::MessageDispatcher;
use crate::application::ports::{BrokerEvent, BrokerLink};
use crate::application::stats::DispatchStats;

/// Connection state as seen by the rest of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ConnectionLost,
    Reconnecting,
}

/// Owns the broker connection lifecycle on behalf of the bridge.
///
/// Shared between the task running [`ConnectionManager::run`] and whoever
/// calls [`ConnectionManager::shutdown`]; all methods take `&self`.
pub struct ConnectionManager {
    link: Arc<dyn BrokerLink>,
    dispatcher: MessageDispatcher,
    qos: QosLevel,
    state: watch::Sender<ConnectionState>,
    shut_down: AtomicBool,
}

impl ConnectionManager {
    /// `qos` is used for the `devices/#` subscription and as the default for
    /// publishers handed out by [`ConnectionManager::command_publisher`].
    pub fn new(link: Arc<dyn BrokerLink>, dispatcher: MessageDispatcher, qos: QosLevel) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            link,
            dispatcher,
            qos,
            state,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Publisher sharing this manager's link and state.
    ///
    /// Publishing does not go through the event loop, so commands can be sent
    /// while a message is being dispatched.
    pub fn command_publisher(&self) -> CommandPublisher {
        CommandPublisher::new(Arc::clone(&self.link), self.subscribe_state(), self.qos)
    }

    /// Dispatch counters.
    pub fn stats(&self) -> Arc<DispatchStats> {
        self.dispatcher.stats()
    }

    /// Processes events until the pump closes the channel or sends `Closed`.
    pub async fn run(&self, mut events: mpsc::Receiver<BrokerEvent>) {
        while let Some(event) = events.recv().await {
            if !self.handle_event(event).await {
                break;
            }
        }
        self.set_state(ConnectionState::Disconnected);
        debug!("broker event loop finished");
    }

    /// Handles one event.  Returns `false` once no further events will come.
    pub async fn handle_event(&self, event: BrokerEvent) -> bool {
        if self.shut_down.load(Ordering::SeqCst) {
            return !matches!(event, BrokerEvent::Closed);
        }

        match event {
            BrokerEvent::Connecting { reconnect: false } => {
                self.set_state(ConnectionState::Connecting);
            }
            BrokerEvent::Connecting { reconnect: true } => {
                info!("reconnecting to broker");
                self.set_state(ConnectionState::Reconnecting);
            }
            BrokerEvent::Connected {
                reconnect,
                session_present,
            } => {
                if reconnect {
                    info!("reconnected to broker (session present: {session_present})");
                } else {
                    info!("connected to broker (session present: {session_present})");
                }
                match self.link.subscribe(SUBSCRIPTION_FILTER, self.qos).await {
                    Ok(()) => info!("subscribed to {SUBSCRIPTION_FILTER} at QoS {}", self.qos),
                    Err(e) => error!("failed to subscribe to {SUBSCRIPTION_FILTER}: {e}"),
                }
                self.set_state(ConnectionState::Connected);
            }
            BrokerEvent::ConnectFailed { reason } => {
                warn!("broker connection attempt failed: {reason}");
                let next = match self.state() {
                    ConnectionState::Connecting | ConnectionState::Disconnected => {
                        ConnectionState::Disconnected
                    }
                    _ => ConnectionState::ConnectionLost,
                };
                self.set_state(next);
            }
            BrokerEvent::ConnectionLost { reason } => {
                warn!("broker connection lost: {reason}");
                self.set_state(ConnectionState::ConnectionLost);
            }
            BrokerEvent::Message(envelope) => {
                // Failures are logged and counted by the dispatcher.
                let _ = self.dispatcher.dispatch(&envelope).await;
            }
            BrokerEvent::Closed => {
                self.set_state(ConnectionState::Disconnected);
                return false;
            }
        }
        true
    }

    /// Disconnects from the broker.  Idempotent.
    ///
    /// Requests DISCONNECT only when currently connected; afterwards all
    /// further events other than `Closed` are ignored.
    ///
    /// Returns `true` when a DISCONNECT was handed to the link, in which case
    /// the event source is expected to write it and then send `Closed`.
    pub async fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            debug!("connection manager already shut down");
            return false;
        }

        let mut requested = false;
        if self.state() == ConnectionState::Connected {
            match self.link.disconnect().await {
                Ok(()) => requested = true,
                Err(e) => warn!("broker disconnect failed: {e}"),
            }
        }
        self.set_state(ConnectionState::Disconnected);
        info!("broker connection closed");
        requested
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!("connection state {prev:?} -> {next:?}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
