//! Inbound message dispatch.
//!
//! [`MessageDispatcher::dispatch`] is called once per message delivered by the
//! broker.  It routes the topic, reconciles status messages against the
//! device store, and fans every routable message out to the realtime
//! transport.
//!
//! # Status ordering
//!
//! For a status message the store write completes before the broadcast is
//! issued, so a realtime client that re-reads the device after seeing the
//! broadcast observes the reported flag.  A status message is broadcast
//! exactly once.
//!
//! # Failure isolation
//!
//! Every failure is confined to the message that caused it.  The error is
//! logged at the level its kind calls for, counted in [`DispatchStats`], and
//! returned; the caller keeps processing subsequent messages.
//!
//! | Failure                      | Level   | Broadcast? |
//! |------------------------------|---------|------------|
//! | unroutable topic             | `debug` | no         |
//! | non-UUID status device id    | `warn`  | no         |
//! | malformed status JSON        | `error` | no         |
//! | store error or timeout       | `error` | no         |
//! | transport error or timeout   | `error` | (failed)   |

use std::sync::Arc;

use device_bridge_core::{route_topic, DeviceRoute, InboundEnvelope, MessageKind, RouteError};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::application::fanout::{BroadcastError, FanoutBroadcaster};
use crate::application::stats::DispatchStats;
use crate::application::status_reconciler::{ReconcileError, ReconcileOutcome, StatusReconciler};

/// Why a message was not fully dispatched.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unroutable topic '{topic}': {source}")]
    Unroutable {
        topic: String,
        #[source]
        source: RouteError,
    },

    #[error("status reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("realtime broadcast failed: {0}")]
    Broadcast(#[from] BroadcastError),
}

/// A message that was routed and broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub route: DeviceRoute,
    /// Present for status messages only.
    pub reconciled: Option<ReconcileOutcome>,
    /// Channel the payload was broadcast on.
    pub channel: String,
}

/// Routes, reconciles and fans out inbound messages.
pub struct MessageDispatcher {
    reconciler: StatusReconciler,
    fanout: FanoutBroadcaster,
    stats: Arc<DispatchStats>,
}

impl MessageDispatcher {
    /// Creates a dispatcher with fresh [`DispatchStats`].
    pub fn new(reconciler: StatusReconciler, fanout: FanoutBroadcaster) -> Self {
        Self {
            reconciler,
            fanout,
            stats: Arc::new(DispatchStats::new()),
        }
    }

    /// Shared handle to the dispatch counters.
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// Dispatches one inbound message.
    ///
    /// Never panics on bad input; all failures come back as
    /// [`DispatchError`] after being logged and counted.
    pub async fn dispatch(&self, envelope: &InboundEnvelope) -> Result<Dispatched, DispatchError> {
        let result = self.dispatch_inner(envelope).await;
        self.stats.record(&result);
        log_result(&envelope.topic, &result);
        result
    }

    async fn dispatch_inner(&self, envelope: &InboundEnvelope) -> Result<Dispatched, DispatchError> {
        let route = route_topic(&envelope.topic).map_err(|source| DispatchError::Unroutable {
            topic: envelope.topic.clone(),
            source,
        })?;

        let reconciled = match route.kind {
            MessageKind::Status => Some(
                self.reconciler
                    .reconcile(&route.device_id, &envelope.payload)
                    .await?,
            ),
            MessageKind::Control | MessageKind::Telemetry => None,
        };

        let channel = self
            .fanout
            .broadcast(&route.device_id, route.kind, &envelope.payload)
            .await?;

        Ok(Dispatched {
            route,
            reconciled,
            channel,
        })
    }
}

fn log_result(topic: &str, result: &Result<Dispatched, DispatchError>) {
    match result {
        Ok(dispatched) => match dispatched.reconciled {
            Some(ReconcileOutcome::Updated {
                device_id,
                is_online,
            }) => debug!("device {device_id} is_online={is_online}"),
            Some(ReconcileOutcome::UnknownDevice(device_id)) => {
                debug!("status for unknown device {device_id} ignored")
            }
            Some(ReconcileOutcome::NoStatusField) | None => {
                debug!("dispatched {topic} to {}", dispatched.channel)
            }
        },
        Err(e @ DispatchError::Unroutable { .. }) => debug!("{e}"),
        Err(DispatchError::Reconcile(e @ ReconcileError::InvalidDeviceId(_))) => {
            warn!("status on {topic} dropped: {e}")
        }
        Err(DispatchError::Reconcile(e)) => error!("status on {topic} dropped: {e}"),
        Err(DispatchError::Broadcast(e)) => error!("broadcast of {topic} failed: {e}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
