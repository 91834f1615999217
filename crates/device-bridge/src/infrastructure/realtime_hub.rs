//! Realtime hub: the WebSocket side of the bridge.
//!
//! This module provides:
//!
//! 1. [`RealtimeHub`], the in-process channel registry.  It implements
//!    [`RealtimeTransport`], so the dispatcher broadcasts into it.
//! 2. [`run_realtime_server`], the WebSocket accept loop.  Each client session
//!    can subscribe to device channels and publish commands to the broker
//!    through a [`CommandPublisher`].
//!
//! # Delivery
//!
//! Each session owns a bounded outbound queue drained by its writer task.
//! Broadcasts use `try_send`: a client whose queue is full misses that frame
//! rather than stalling the dispatch loop, and a session whose queue is closed
//! is pruned from every channel on the next broadcast to it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::command_publisher::CommandPublisher;
use crate::application::ports::{RealtimeTransport, TransportError};
use crate::domain::config::RealtimeSettings;
use crate::domain::messages::{ClientFrame, ServerFrame};

/// Identifies one WebSocket session.
pub type SessionId = Uuid;

/// Frames queued per session before broadcasts to it are dropped.
pub const SESSION_QUEUE_CAPACITY: usize = 256;

// ── Hub ───────────────────────────────────────────────────────────────────────

type Subscribers = HashMap<SessionId, mpsc::Sender<String>>;

/// Channel name → subscribed sessions.
#[derive(Default)]
pub struct RealtimeHub {
    channels: RwLock<HashMap<String, Subscribers>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `session` to `channel`.  Re-subscribing replaces the queue.
    pub async fn subscribe(&self, channel: &str, session: SessionId, queue: mpsc::Sender<String>) {
        self.channels
            .write()
            .await
            .entry(channel.to_string())
            .or_default()
            .insert(session, queue);
        debug!("session {session} subscribed to {channel}");
    }

    /// Removes `session` from `channel`.  Returns whether it was subscribed.
    pub async fn unsubscribe(&self, channel: &str, session: SessionId) -> bool {
        let mut channels = self.channels.write().await;
        let Some(subscribers) = channels.get_mut(channel) else {
            return false;
        };
        let removed = subscribers.remove(&session).is_some();
        if subscribers.is_empty() {
            channels.remove(channel);
        }
        removed
    }

    /// Removes `session` from every channel.
    pub async fn remove_session(&self, session: SessionId) {
        let mut channels = self.channels.write().await;
        channels.retain(|_, subscribers| {
            subscribers.remove(&session);
            !subscribers.is_empty()
        });
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .await
            .get(channel)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl RealtimeTransport for RealtimeHub {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError> {
        let frame = serde_json::to_string(&ServerFrame::Message {
            channel: channel.to_string(),
            payload: payload.to_string(),
        })
        .map_err(|e| TransportError::Encode(e.to_string()))?;

        let mut delivered = 0usize;
        let mut closed = Vec::new();
        {
            let channels = self.channels.read().await;
            let Some(subscribers) = channels.get(channel) else {
                debug!("no subscribers on {channel}");
                return Ok(());
            };
            for (session, queue) in subscribers {
                match queue.try_send(frame.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!("session {session} is not keeping up; dropped frame on {channel}")
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*session),
                }
            }
        }

        if !closed.is_empty() {
            let mut channels = self.channels.write().await;
            if let Some(subscribers) = channels.get_mut(channel) {
                for session in &closed {
                    subscribers.remove(session);
                }
                if subscribers.is_empty() {
                    channels.remove(channel);
                }
            }
            debug!("pruned {} closed session(s) from {channel}", closed.len());
        }

        debug!("broadcast on {channel} reached {delivered} session(s)");
        Ok(())
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

/// Runs the WebSocket accept loop until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_realtime_server(
    settings: &RealtimeSettings,
    hub: Arc<RealtimeHub>,
    publisher: CommandPublisher,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| {
            format!(
                "failed to bind realtime listener on {}",
                settings.bind_addr
            )
        })?;

    info!("realtime hub listening on {}", settings.bind_addr);

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping realtime accept loop");
            break;
        }

        // Short timeout so the running flag is re-checked while idle.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new realtime connection from {peer_addr}");
                let hub = Arc::clone(&hub);
                let publisher = publisher.clone();
                tokio::spawn(async move {
                    handle_session(stream, peer_addr, hub, publisher).await;
                });
            }
            Ok(Err(e)) => error!("accept error: {e}"),
            Err(_) => {}
        }
    }

    Ok(())
}

async fn handle_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    hub: Arc<RealtimeHub>,
    publisher: CommandPublisher,
) {
    let session = Uuid::new_v4();
    match run_session(stream, peer_addr, session, &hub, &publisher).await {
        Ok(()) => info!("realtime session {peer_addr} closed"),
        Err(e) => {
            warn!("realtime session {peer_addr} closed with error: {e:#}");
            hub.remove_session(session).await;
        }
    }
}

async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    session: SessionId,
    hub: &RealtimeHub,
    publisher: &CommandPublisher,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    info!("realtime session {session} established with {peer_addr}");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (queue_tx, mut queue_rx) = mpsc::channel::<String>(SESSION_QUEUE_CAPACITY);

    // Replies and broadcasts share one queue so the client sees them in order.
    let writer = tokio::spawn(async move {
        while let Some(text) = queue_rx.recv().await {
            if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                debug!("session {session}: WebSocket send failed (client gone)");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        let message = match ws_rx.next().await {
            Some(Ok(message)) => message,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) | None => {
                debug!("session {session}: client stream ended");
                break;
            }
            Some(Err(e)) => {
                warn!("session {session}: WebSocket error: {e}");
                break;
            }
        };

        let reply = match message {
            WsMessage::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => handle_client_frame(frame, session, hub, publisher, &queue_tx).await,
                Err(e) => {
                    warn!("session {session}: invalid JSON frame: {e}");
                    ServerFrame::Error {
                        reason: format!("invalid frame: {e}"),
                    }
                }
            },
            WsMessage::Close(_) => break,
            WsMessage::Binary(_) => ServerFrame::Error {
                reason: "binary frames are not supported".to_string(),
            },
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
        };

        let text = serde_json::to_string(&reply).context("failed to encode reply frame")?;
        if queue_tx.send(text).await.is_err() {
            break;
        }
    }

    // The hub still holds clones of the queue; drop them so the writer ends.
    drop(queue_tx);
    hub.remove_session(session).await;
    let _ = writer.await;
    Ok(())
}

/// Applies one client frame and returns the reply for that client.
pub async fn handle_client_frame(
    frame: ClientFrame,
    session: SessionId,
    hub: &RealtimeHub,
    publisher: &CommandPublisher,
    queue: &mpsc::Sender<String>,
) -> ServerFrame {
    match frame {
        ClientFrame::Subscribe { channel } => {
            hub.subscribe(&channel, session, queue.clone()).await;
            ServerFrame::Subscribed { channel }
        }
        ClientFrame::Unsubscribe { channel } => {
            hub.unsubscribe(&channel, session).await;
            ServerFrame::Unsubscribed { channel }
        }
        ClientFrame::Publish { topic, payload } => match publisher.publish(&topic, &payload).await {
            Ok(()) => ServerFrame::PublishResult {
                topic,
                accepted: true,
                reason: None,
            },
            Err(e) => ServerFrame::PublishResult {
                topic,
                accepted: false,
                reason: Some(e.to_string()),
            },
        },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::connection_manager::ConnectionState;
    use crate::application::ports::{BrokerLink, LinkError};
    use device_bridge_core::QosLevel;
    use std::sync::Mutex;
    use tokio::sync::watch;

    #[derive(Default)]
    struct RecordingLink {
        published: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl BrokerLink for RecordingLink {
        async fn subscribe(&self, _filter: &str, _qos: QosLevel) -> Result<(), LinkError> {
            Ok(())
        }

        async fn publish(&self, topic: &str, payload: &str, _qos: QosLevel) -> Result<(), LinkError> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string()));
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), LinkError> {
            Ok(())
        }
    }

    fn publisher(
        link: Arc<RecordingLink>,
        state: ConnectionState,
    ) -> (CommandPublisher, watch::Sender<ConnectionState>) {
        let (tx, rx) = watch::channel(state);
        (CommandPublisher::new(link, rx, QosLevel::AtLeastOnce), tx)
    }

    fn message(channel: &str, payload: &str) -> String {
        serde_json::to_string(&ServerFrame::Message {
            channel: channel.to_string(),
            payload: payload.to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_broadcast_reaches_only_channel_subscribers() {
        // Arrange
        let hub = RealtimeHub::new();
        let (a_tx, mut a_rx) = mpsc::channel(4);
        let (b_tx, mut b_rx) = mpsc::channel(4);
        hub.subscribe("devices/d1/status", Uuid::new_v4(), a_tx).await;
        hub.subscribe("devices/d2/status", Uuid::new_v4(), b_tx).await;

        // Act
        hub.publish("devices/d1/status", r#"{"is_online":true}"#)
            .await
            .unwrap();

        // Assert
        assert_eq!(
            a_rx.try_recv().unwrap(),
            message("devices/d1/status", r#"{"is_online":true}"#)
        );
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_succeeds() {
        let hub = RealtimeHub::new();
        assert!(hub.publish("devices/none/telemetry", "{}").await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_sessions_are_pruned_on_broadcast() {
        let hub = RealtimeHub::new();
        let (tx, rx) = mpsc::channel(4);
        hub.subscribe("devices/d1/control", Uuid::new_v4(), tx).await;
        drop(rx);

        hub.publish("devices/d1/control", "OFF").await.unwrap();

        assert_eq!(hub.subscriber_count("devices/d1/control").await, 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_frame_without_failing() {
        let hub = RealtimeHub::new();
        let (tx, mut rx) = mpsc::channel(1);
        hub.subscribe("c", Uuid::new_v4(), tx).await;

        hub.publish("c", "first").await.unwrap();
        hub.publish("c", "second").await.unwrap();

        assert_eq!(rx.try_recv().unwrap(), message("c", "first"));
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.subscriber_count("c").await, 1);
    }

    #[tokio::test]
    async fn test_remove_session_leaves_other_sessions() {
        let hub = RealtimeHub::new();
        let (tx, _rx) = mpsc::channel(4);
        let gone = Uuid::new_v4();
        let kept = Uuid::new_v4();
        hub.subscribe("c", gone, tx.clone()).await;
        hub.subscribe("c", kept, tx.clone()).await;
        hub.subscribe("other", gone, tx).await;

        hub.remove_session(gone).await;

        assert_eq!(hub.subscriber_count("c").await, 1);
        assert_eq!(hub.subscriber_count("other").await, 0);
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe_frames() {
        // Arrange
        let hub = RealtimeHub::new();
        let (publisher, _state) = publisher(Arc::default(), ConnectionState::Connected);
        let (tx, _rx) = mpsc::channel(4);
        let session = Uuid::new_v4();

        // Act
        let subscribed = handle_client_frame(
            ClientFrame::Subscribe {
                channel: "devices/d1/status".to_string(),
            },
            session,
            &hub,
            &publisher,
            &tx,
        )
        .await;
        let count_after_subscribe = hub.subscriber_count("devices/d1/status").await;
        let unsubscribed = handle_client_frame(
            ClientFrame::Unsubscribe {
                channel: "devices/d1/status".to_string(),
            },
            session,
            &hub,
            &publisher,
            &tx,
        )
        .await;

        // Assert
        assert_eq!(
            subscribed,
            ServerFrame::Subscribed {
                channel: "devices/d1/status".to_string()
            }
        );
        assert_eq!(count_after_subscribe, 1);
        assert!(matches!(unsubscribed, ServerFrame::Unsubscribed { .. }));
        assert_eq!(hub.subscriber_count("devices/d1/status").await, 0);
    }

    #[tokio::test]
    async fn test_publish_frame_goes_to_broker_when_connected() {
        let hub = RealtimeHub::new();
        let link = Arc::new(RecordingLink::default());
        let (publisher, _state) = publisher(link.clone(), ConnectionState::Connected);
        let (tx, _rx) = mpsc::channel(4);

        let reply = handle_client_frame(
            ClientFrame::Publish {
                topic: "devices/abc-123/control".to_string(),
                payload: "SET:50".to_string(),
            },
            Uuid::new_v4(),
            &hub,
            &publisher,
            &tx,
        )
        .await;

        assert_eq!(
            reply,
            ServerFrame::PublishResult {
                topic: "devices/abc-123/control".to_string(),
                accepted: true,
                reason: None
            }
        );
        assert_eq!(
            *link.published.lock().unwrap(),
            vec![("devices/abc-123/control".to_string(), "SET:50".to_string())]
        );
    }

    #[tokio::test]
    async fn test_publish_frame_is_refused_when_disconnected() {
        let hub = RealtimeHub::new();
        let link = Arc::new(RecordingLink::default());
        let (publisher, _state) = publisher(link.clone(), ConnectionState::ConnectionLost);
        let (tx, _rx) = mpsc::channel(4);

        let reply = handle_client_frame(
            ClientFrame::Publish {
                topic: "devices/d1/control".to_string(),
                payload: "ON".to_string(),
            },
            Uuid::new_v4(),
            &hub,
            &publisher,
            &tx,
        )
        .await;

        assert!(matches!(
            reply,
            ServerFrame::PublishResult {
                accepted: false,
                reason: Some(_),
                ..
            }
        ));
        assert!(link.published.lock().unwrap().is_empty());
    }
}
