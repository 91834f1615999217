//! End-to-end behaviour of the bridge through its public API.
//!
//! Each test feeds a scripted sequence of broker events into a
//! `ConnectionManager` wired to the in-memory device store and a recording
//! realtime transport, then checks what reached the store, the transport and
//! the broker link.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use device_bridge::application::{
    BrokerEvent, BrokerLink, ConnectionManager, ConnectionState, DeviceStore, FanoutBroadcaster,
    LinkError, MessageDispatcher, RealtimeTransport, StatusReconciler, StoreError, TransportError,
};
use device_bridge::infrastructure::InMemoryDeviceStore;
use device_bridge_core::{Device, InboundEnvelope, OwnerId, QosLevel};

// ── Doubles ───────────────────────────────────────────────────────────────────

/// Shared, ordered log of everything the bridge did to its collaborators.
#[derive(Default)]
struct Journal {
    entries: Mutex<Vec<String>>,
}

impl Journal {
    fn push(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    fn count_prefix(&self, prefix: &str) -> usize {
        self.entries()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

struct ScriptedLink(Arc<Journal>);

#[async_trait]
impl BrokerLink for ScriptedLink {
    async fn subscribe(&self, filter: &str, qos: QosLevel) -> Result<(), LinkError> {
        self.0.push(format!("subscribe {filter} qos={qos}"));
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str, _qos: QosLevel) -> Result<(), LinkError> {
        self.0.push(format!("publish {topic} {payload}"));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        self.0.push("disconnect".to_string());
        Ok(())
    }
}

struct RecordingTransport(Arc<Journal>);

#[async_trait]
impl RealtimeTransport for RecordingTransport {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError> {
        self.0.push(format!("broadcast {channel} {payload}"));
        Ok(())
    }
}

/// Device store wrapper that journals writes.
struct JournaledStore {
    inner: InMemoryDeviceStore,
    journal: Arc<Journal>,
}

#[async_trait]
impl DeviceStore for JournaledStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Device>, StoreError> {
        self.inner.find_by_id(id).await
    }

    async fn save(&self, device: Device) -> Result<Device, StoreError> {
        self.journal
            .push(format!("save {} is_online={}", device.id, device.is_online));
        self.inner.save(device).await
    }

    async fn list_by_owner(&self, owner: OwnerId) -> Result<Vec<Device>, StoreError> {
        self.inner.list_by_owner(owner).await
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

struct Harness {
    journal: Arc<Journal>,
    store: Arc<JournaledStore>,
    manager: ConnectionManager,
}

impl Harness {
    fn new(devices: Vec<Device>) -> Self {
        let journal = Arc::new(Journal::default());
        let store = Arc::new(JournaledStore {
            inner: InMemoryDeviceStore::with_devices(devices),
            journal: journal.clone(),
        });
        let dispatcher = MessageDispatcher::new(
            StatusReconciler::new(store.clone(), None),
            FanoutBroadcaster::new(Arc::new(RecordingTransport(journal.clone())), None),
        );
        let manager = ConnectionManager::new(
            Arc::new(ScriptedLink(journal.clone())),
            dispatcher,
            QosLevel::AtLeastOnce,
        );
        Self {
            journal,
            store,
            manager,
        }
    }

    /// Runs the manager over `events` until they are exhausted.
    async fn run(&self, events: Vec<BrokerEvent>) {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);
        self.manager.run(rx).await;
    }
}

fn connected(reconnect: bool) -> BrokerEvent {
    BrokerEvent::Connected {
        reconnect,
        session_present: false,
    }
}

fn message(topic: &str, payload: &str) -> BrokerEvent {
    BrokerEvent::Message(InboundEnvelope::text(topic, payload))
}

fn offline_device() -> Device {
    Device::new(Uuid::new_v4(), Uuid::new_v4(), "living room plug")
}

// ── Properties ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unroutable_topics_touch_neither_store_nor_transport() {
    // Arrange
    let device = offline_device();
    let h = Harness::new(vec![device.clone()]);
    let unroutable = [
        "devices".to_string(),
        format!("devices/{}", device.id),
        format!("sensors/{}/status", device.id),
        format!("devices/{}/firmware", device.id),
        format!("devices/{}/Status", device.id),
        format!("/devices/{}/status", device.id),
    ];

    // Act
    let mut events = vec![connected(false)];
    events.extend(unroutable.iter().map(|t| message(t, r#"{"is_online":true}"#)));
    h.run(events).await;

    // Assert
    assert_eq!(h.journal.count_prefix("save"), 0);
    assert_eq!(h.journal.count_prefix("broadcast"), 0);
    assert_eq!(
        h.manager.stats().snapshot().unroutable,
        unroutable.len() as u64
    );
}

#[tokio::test]
async fn test_online_status_sets_flag_and_broadcasts_once() {
    // Arrange
    let device = offline_device();
    let h = Harness::new(vec![device.clone()]);
    let topic = format!("devices/{}/status", device.id);
    let payload = r#"{"is_online": true}"#;

    // Act
    h.run(vec![connected(false), message(&topic, payload)]).await;

    // Assert
    let stored = assert_ok!(h.store.find_by_id(device.id).await).unwrap();
    assert!(stored.is_online);
    let broadcasts: Vec<String> = h
        .journal
        .entries()
        .into_iter()
        .filter(|e| e.starts_with("broadcast"))
        .collect();
    assert_eq!(broadcasts, vec![format!("broadcast {topic} {payload}")]);
}

#[tokio::test]
async fn test_status_without_online_field_is_broadcast_but_not_stored() {
    let device = offline_device();
    let h = Harness::new(vec![device.clone()]);
    let topic = format!("devices/{}/status", device.id);

    h.run(vec![connected(false), message(&topic, r#"{"battery":12}"#)])
        .await;

    assert_eq!(h.journal.count_prefix("save"), 0);
    assert_eq!(h.journal.count_prefix("broadcast"), 1);
}

#[tokio::test]
async fn test_unknown_device_status_is_broadcast_without_creating_it() {
    let h = Harness::new(Vec::new());
    let unknown = Uuid::new_v4();
    let topic = format!("devices/{unknown}/status");

    h.run(vec![connected(false), message(&topic, r#"{"is_online":true}"#)])
        .await;

    assert_eq!(h.journal.count_prefix("save"), 0);
    assert_eq!(h.journal.count_prefix("broadcast"), 1);
    assert!(h.store.inner.is_empty().await);
}

#[tokio::test]
async fn test_malformed_status_is_dropped_and_next_message_succeeds() {
    // Arrange
    let device = offline_device();
    let h = Harness::new(vec![device.clone()]);
    let topic = format!("devices/{}/status", device.id);

    // Act
    h.run(vec![
        connected(false),
        message(&topic, "{\"is_online\": tru"),
        message(&topic, r#"{"is_online":true}"#),
    ])
    .await;

    // Assert
    assert_eq!(
        h.journal.count_prefix("save"),
        1,
        "only the valid message writes"
    );
    assert_eq!(h.journal.count_prefix("broadcast"), 1);
    let snap = h.manager.stats().snapshot();
    assert_eq!(snap.malformed_payload, 1);
    assert_eq!(snap.status_updates, 1);
}

#[tokio::test]
async fn test_reconnect_resubscribes_exactly_once_before_next_message() {
    // Arrange
    let h = Harness::new(Vec::new());

    // Act
    h.run(vec![
        BrokerEvent::Connecting { reconnect: false },
        connected(false),
        message("devices/d1/telemetry", "{\"t\":21.5}"),
        BrokerEvent::ConnectionLost {
            reason: "keep-alive timeout".to_string(),
        },
        BrokerEvent::Connecting { reconnect: true },
        BrokerEvent::ConnectFailed {
            reason: "connection refused".to_string(),
        },
        BrokerEvent::Connecting { reconnect: true },
        connected(true),
        message("devices/d1/telemetry", "{\"t\":21.7}"),
    ])
    .await;

    // Assert
    assert_eq!(
        h.journal.entries(),
        vec![
            "subscribe devices/# qos=1".to_string(),
            "broadcast devices/d1/telemetry {\"t\":21.5}".to_string(),
            "subscribe devices/# qos=1".to_string(),
            "broadcast devices/d1/telemetry {\"t\":21.7}".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_control_message_is_broadcast_verbatim_without_store_writes() {
    let h = Harness::new(Vec::new());

    h.run(vec![
        connected(false),
        message("devices/abc-123/control", "SET:50"),
    ])
    .await;

    let entries = h.journal.entries();
    assert_eq!(
        entries
            .iter()
            .filter(|e| e.starts_with("broadcast"))
            .collect::<Vec<_>>(),
        vec!["broadcast devices/abc-123/control SET:50"]
    );
    assert_eq!(h.journal.count_prefix("save"), 0);
}

#[tokio::test]
async fn test_commands_are_refused_until_connected_and_after_shutdown() {
    // Arrange
    let h = Harness::new(Vec::new());
    let publisher = h.manager.command_publisher();

    // Act / Assert: before connecting
    assert_err!(publisher.send_device_command("abc-123", "SET:50").await);

    h.manager.handle_event(connected(false)).await;
    assert_eq!(h.manager.state(), ConnectionState::Connected);
    assert_ok!(publisher.send_device_command("abc-123", "SET:50").await);

    h.manager.shutdown().await;
    assert_err!(publisher.send_device_command("abc-123", "SET:51").await);

    // Assert
    assert_eq!(
        h.journal.entries(),
        vec![
            "subscribe devices/# qos=1".to_string(),
            "publish devices/abc-123/control SET:50".to_string(),
            "disconnect".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_last_status_message_wins() {
    let device = offline_device();
    let h = Harness::new(vec![device.clone()]);
    let topic = format!("devices/{}/status", device.id);

    h.run(vec![
        connected(false),
        message(&topic, r#"{"is_online":true}"#),
        message(&topic, r#"{"is_online":false}"#),
    ])
    .await;

    let stored = h.store.find_by_id(device.id).await.unwrap().unwrap();
    assert!(!stored.is_online);
    assert_eq!(h.journal.count_prefix("broadcast"), 2);
}
