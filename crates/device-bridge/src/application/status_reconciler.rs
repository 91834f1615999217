//! Status reconciliation: keeps the stored online flag in step with what
//! devices report on their status topic.
//!
//! # Ordering of checks
//!
//! 1. The device-id segment must be a UUID.  Anything else is rejected before
//!    the store is touched.
//! 2. The payload must be well-formed JSON.  Malformed payloads are rejected
//!    before the store is touched.
//! 3. A payload without a boolean `is_online` leaves the store untouched.
//! 4. Otherwise the device is looked up; if it exists its flag is overwritten
//!    with the reported value and the record saved.  Unknown devices are
//!    ignored, never created.
//!
//! The write is update-if-present.  Two status messages for the same device are
//! reconciled in arrival order because the dispatch loop handles one message at
//! a time.

use std::sync::Arc;
use std::time::Duration;

use device_bridge_core::{parse_device_id, parse_status_payload, DeviceId, StatusPayloadError};
use thiserror::Error;

use crate::application::deadline::within;
use crate::application::ports::{DeviceStore, StoreError};

/// Why a status message could not be reconciled.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The device-id segment of the topic is not a UUID.
    #[error("device id '{0}' is not a valid UUID")]
    InvalidDeviceId(String),

    /// The payload is not well-formed JSON.
    #[error(transparent)]
    MalformedPayload(#[from] StatusPayloadError),

    /// The device store returned an error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The device store did not answer within the dispatch timeout.
    #[error("device store did not answer within {0:?}")]
    Timeout(Duration),
}

/// What reconciliation did with a well-formed status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The stored flag now equals `is_online`.
    Updated { device_id: DeviceId, is_online: bool },

    /// The payload carries no boolean `is_online`; nothing was written.
    NoStatusField,

    /// No device with this id exists; nothing was written.
    UnknownDevice(DeviceId),
}

/// Applies status reports to the device store.
pub struct StatusReconciler {
    store: Arc<dyn DeviceStore>,
    timeout: Option<Duration>,
}

impl StatusReconciler {
    /// Creates a reconciler.  `timeout` bounds each individual store call.
    pub fn new(store: Arc<dyn DeviceStore>, timeout: Option<Duration>) -> Self {
        Self { store, timeout }
    }

    /// Reconciles one status payload for the raw device-id segment `device_id`.
    ///
    /// # Errors
    ///
    /// See [`ReconcileError`].  On every error the store is left as it was.
    pub async fn reconcile(
        &self,
        device_id: &str,
        payload: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let id = parse_device_id(device_id)
            .ok_or_else(|| ReconcileError::InvalidDeviceId(device_id.to_string()))?;
        let report = parse_status_payload(payload)?;

        let Some(is_online) = report.is_online else {
            return Ok(ReconcileOutcome::NoStatusField);
        };

        let found = within(self.timeout, self.store.find_by_id(id))
            .await
            .map_err(ReconcileError::Timeout)??;
        let Some(mut device) = found else {
            return Ok(ReconcileOutcome::UnknownDevice(id));
        };

        device.is_online = is_online;
        within(self.timeout, self.store.save(device))
            .await
            .map_err(ReconcileError::Timeout)??;

        Ok(ReconcileOutcome::Updated {
            device_id: id,
            is_online,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
