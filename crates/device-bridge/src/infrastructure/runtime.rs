//! Bridge runtime: wires the pieces together and owns their tasks.
//!
//! [`DeviceBridge::start`] builds the MQTT link, spawns the event pump and the
//! connection manager, and returns immediately.  An unreachable broker is not
//! a startup error: the bridge keeps retrying in the background (when
//! automatic reconnect is enabled) and the rest of the process stays up.
//!
//! [`DeviceBridge::shutdown`] is the orderly exit and may be called any number
//! of times.  When connected it requests DISCONNECT and lets the event pump
//! write it and finish on its own; the stop signal is only raised afterwards,
//! or once [`SHUTDOWN_GRACE`] has passed.  If a bridge is dropped without
//! shutdown, `Drop` stops the pump and aborts both tasks, which closes the
//! broker socket without a DISCONNECT.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::command_publisher::CommandPublisher;
use crate::application::connection_manager::{ConnectionManager, ConnectionState};
use crate::application::dispatcher::MessageDispatcher;
use crate::application::fanout::FanoutBroadcaster;
use crate::application::ports::{BrokerEvent, BrokerLink, DeviceStore, RealtimeTransport};
use crate::application::stats::DispatchStats;
use crate::application::status_reconciler::StatusReconciler;
use crate::domain::config::{BridgeConfig, ConfigError};
use crate::infrastructure::mqtt_link;

/// Buffered broker events between the pump and the manager.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long shutdown waits for each task before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A running bridge: the broker event pump and the connection manager.
///
/// Hands out [`CommandPublisher`]s for the realtime side and must be shut
/// down with [`DeviceBridge::shutdown`] for a clean broker disconnect.
pub struct DeviceBridge {
    manager: Arc<ConnectionManager>,
    publisher: CommandPublisher,
    stop: watch::Sender<bool>,
    pump_task: Option<JoinHandle<()>>,
    manager_task: Option<JoinHandle<()>>,
}

impl DeviceBridge {
    /// Starts the bridge against the configured broker.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Only configuration errors (an unparseable broker URL).  Connection
    /// failures are handled in the background.
    pub fn start(
        config: &BridgeConfig,
        store: Arc<dyn DeviceStore>,
        transport: Arc<dyn RealtimeTransport>,
    ) -> Result<Self, ConfigError> {
        let (link, pump) = mqtt_link::connect(&config.mqtt)?;
        Ok(Self::start_with_link(
            config,
            Arc::new(link),
            store,
            transport,
            |events, stop| pump.run(events, stop),
        ))
    }

    /// Starts the bridge over any [`BrokerLink`] and event source.
    ///
    /// `pump` receives the event sender and the stop signal and must send
    /// [`BrokerEvent`]s until the signal flips.
    pub fn start_with_link<P, F>(
        config: &BridgeConfig,
        link: Arc<dyn BrokerLink>,
        store: Arc<dyn DeviceStore>,
        transport: Arc<dyn RealtimeTransport>,
        pump: P,
    ) -> Self
    where
        P: FnOnce(mpsc::Sender<BrokerEvent>, watch::Receiver<bool>) -> F,
        F: Future<Output = ()> + Send + 'static,
    {
        let dispatcher = MessageDispatcher::new(
            StatusReconciler::new(store, config.dispatch_timeout),
            FanoutBroadcaster::new(transport, config.dispatch_timeout),
        );
        let manager = Arc::new(ConnectionManager::new(link, dispatcher, config.mqtt.qos));
        let publisher = manager.command_publisher();

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (stop, stop_rx) = watch::channel(false);

        let pump_task = tokio::spawn(pump(events_tx, stop_rx));
        let manager_task = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.run(events_rx).await }
        });

        info!("device bridge started (broker {})", config.mqtt.broker_url);
        Self {
            manager,
            publisher,
            stop,
            pump_task: Some(pump_task),
            manager_task: Some(manager_task),
        }
    }

    /// Publisher for outbound device commands.
    pub fn command_publisher(&self) -> CommandPublisher {
        self.publisher.clone()
    }

    /// Current broker connection state.
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Receiver that observes every connection state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.manager.subscribe_state()
    }

    /// Dispatch counters.
    pub fn stats(&self) -> Arc<DispatchStats> {
        self.manager.stats()
    }

    /// Disconnects from the broker and waits for the background tasks.
    pub async fn shutdown(&mut self) {
        if self.pump_task.is_none() && self.manager_task.is_none() {
            return;
        }

        if self.manager.shutdown().await {
            if let Some(task) = self.pump_task.as_mut() {
                match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                    Ok(_) => self.pump_task = None,
                    Err(_) => warn!(
                        "DISCONNECT not written within {SHUTDOWN_GRACE:?}; stopping event pump"
                    ),
                }
            }
        }
        self.stop.send_replace(true);

        for (name, task) in [
            ("event pump", self.pump_task.take()),
            ("connection manager", self.manager_task.take()),
        ] {
            let Some(mut task) = task else { continue };
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("{name} did not stop within {SHUTDOWN_GRACE:?}; aborting");
                task.abort();
            }
        }
        info!("device bridge stopped");
    }
}

impl Drop for DeviceBridge {
    fn drop(&mut self) {
        if self.pump_task.is_none() && self.manager_task.is_none() {
            return;
        }
        warn!("device bridge dropped without shutdown; aborting broker tasks");
        self.stop.send_replace(true);
        for task in [self.pump_task.take(), self.manager_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
