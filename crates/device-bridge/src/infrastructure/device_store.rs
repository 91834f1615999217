//! In-memory [`DeviceStore`].
//!
//! Stands in for the persistent store owned by the device registry service.
//! Seeded from the configuration file at startup; contents are lost on exit.

use std::collections::HashMap;

use async_trait::async_trait;
use device_bridge_core::{Device, DeviceId, OwnerId};
use tokio::sync::RwLock;

use crate::application::ports::{DeviceStore, StoreError};

/// [`DeviceStore`] kept in process memory, seeded from configuration.
#[derive(Debug, Default)]
pub struct InMemoryDeviceStore {
    devices: RwLock<HashMap<DeviceId, Device>>,
}

impl InMemoryDeviceStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `devices`.  Later duplicates of an id win.
    pub fn with_devices(devices: impl IntoIterator<Item = Device>) -> Self {
        let devices = devices.into_iter().map(|d| (d.id, d)).collect();
        Self {
            devices: RwLock::new(devices),
        }
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}

#[async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn find_by_id(&self, id: DeviceId) -> Result<Option<Device>, StoreError> {
        Ok(self.devices.read().await.get(&id).cloned())
    }

    async fn save(&self, device: Device) -> Result<Device, StoreError> {
        self.devices.write().await.insert(device.id, device.clone());
        Ok(device)
    }

    async fn list_by_owner(&self, owner: OwnerId) -> Result<Vec<Device>, StoreError> {
        let mut owned: Vec<Device> = self
            .devices
            .read()
            .await
            .values()
            .filter(|d| d.owner_id == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(owned)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
