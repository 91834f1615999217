//! Dispatch counters.
//!
//! Lock-free counters updated by the dispatch loop and read at shutdown (or by
//! anyone holding the `Arc`).  Every dispatched message increments `received`
//! and exactly one outcome counter.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::application::dispatcher::{DispatchError, Dispatched};
use crate::application::fanout::BroadcastError;
use crate::application::status_reconciler::{ReconcileError, ReconcileOutcome};

/// Lock-free counters of dispatch outcomes.
///
/// Every message increments `received` and exactly one outcome counter.
#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    unroutable: AtomicU64,
    invalid_device_id: AtomicU64,
    malformed_payload: AtomicU64,
    status_updates: AtomicU64,
    unknown_devices: AtomicU64,
    broadcasts: AtomicU64,
    store_failures: AtomicU64,
    broadcast_failures: AtomicU64,
    timeouts: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub received: u64,
    pub unroutable: u64,
    pub invalid_device_id: u64,
    pub malformed_payload: u64,
    /// Status messages that changed (or re-confirmed) a stored flag.
    pub status_updates: u64,
    pub unknown_devices: u64,
    /// Successful broadcasts.
    pub broadcasts: u64,
    pub store_failures: u64,
    pub broadcast_failures: u64,
    /// Store or transport calls that exceeded the dispatch timeout.
    pub timeouts: u64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts the result of one dispatch.
    pub fn record(&self, result: &Result<Dispatched, DispatchError>) {
        bump(&self.received);
        let counter = match result {
            Ok(dispatched) => {
                match dispatched.reconciled {
                    Some(ReconcileOutcome::Updated { .. }) => bump(&self.status_updates),
                    Some(ReconcileOutcome::UnknownDevice(_)) => bump(&self.unknown_devices),
                    Some(ReconcileOutcome::NoStatusField) | None => {}
                }
                &self.broadcasts
            }
            Err(DispatchError::Unroutable { .. }) => &self.unroutable,
            Err(DispatchError::Reconcile(e)) => match e {
                ReconcileError::InvalidDeviceId(_) => &self.invalid_device_id,
                ReconcileError::MalformedPayload(_) => &self.malformed_payload,
                ReconcileError::Store(_) => &self.store_failures,
                ReconcileError::Timeout(_) => &self.timeouts,
            },
            Err(DispatchError::Broadcast(e)) => match e {
                BroadcastError::Transport(_) => &self.broadcast_failures,
                BroadcastError::Timeout(_) => &self.timeouts,
            },
        };
        bump(counter);
    }

    pub fn snapshot(&self) -> DispatchSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        DispatchSnapshot {
            received: load(&self.received),
            unroutable: load(&self.unroutable),
            invalid_device_id: load(&self.invalid_device_id),
            malformed_payload: load(&self.malformed_payload),
            status_updates: load(&self.status_updates),
            unknown_devices: load(&self.unknown_devices),
            broadcasts: load(&self.broadcasts),
            store_failures: load(&self.store_failures),
            broadcast_failures: load(&self.broadcast_failures),
            timeouts: load(&self.timeouts),
        }
    }
}

impl DispatchSnapshot {
    /// Messages that were not broadcast.
    pub fn dropped(&self) -> u64 {
        self.received.saturating_sub(self.broadcasts)
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
