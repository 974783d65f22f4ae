//! Broker session with a tokio mpsc command/event pattern.
//!
//! The WebSocket connection lives in a dedicated tokio task. External code
//! drives it through typed commands and observes it through an event
//! channel plus a watch of the connection state. Activation is reference
//! counted: the first acquire dials the broker, the last release hangs up,
//! and in between the task keeps the link alive with keepalive pings and
//! backoff reconnects that replay the tracked topic set.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use patte_shared::constants::{
    COMMAND_CHANNEL_CAPACITY, DEFAULT_BROKER_URL, DEFAULT_CONNECT_TIMEOUT_SECS,
    DEFAULT_KEEPALIVE_SECS, DEFAULT_PONG_TIMEOUT_SECS, DEFAULT_RECONNECT_BASE_MS,
    DEFAULT_RECONNECT_MAX_MS, EVENT_CHANNEL_CAPACITY,
};
use patte_shared::protocol::{ClientFrame, ServerFrame};
use patte_shared::types::ConnectionState;

use crate::error::SessionError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Command / event types
// ---------------------------------------------------------------------------

/// Commands sent *into* the session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Dial the broker and keep the link up until deactivated.
    Activate,
    /// Hang up and stop reconnecting.
    Deactivate,
    /// Track a topic and subscribe to it on the live connection.
    Subscribe(String),
    /// Forget a topic and unsubscribe from it on the live connection.
    Unsubscribe(String),
    /// Publish `body` to a destination. Dropped with a warning when the
    /// session is not connected.
    Publish { destination: String, body: Value },
    /// Request a snapshot of the tracked topic set.
    TrackedTopics(oneshot::Sender<Vec<String>>),
    /// Tear the session down for good.
    Shutdown,
}

/// Events sent *from* the session task to the application.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The connection state crossed an edge.
    StateChanged(ConnectionState),
    /// An inbound frame arrived on a subscribed topic.
    Frame { topic: String, body: Value },
}

/// Connection settings for the broker socket.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint of the messaging broker.
    pub broker_url: String,
    /// Bearer credential presented on the upgrade request.
    pub token: String,
    /// Seconds between keepalive pings (0 disables keepalive).
    pub keepalive_secs: u64,
    /// Seconds to wait for any frame after a ping before declaring the
    /// link dead.
    pub pong_timeout_secs: u64,
    /// Seconds to wait for the upgrade handshake.
    pub connect_timeout_secs: u64,
    /// Initial reconnect backoff delay.
    pub reconnect_base_ms: u64,
    /// Reconnect backoff ceiling.
    pub reconnect_max_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            token: String::new(),
            keepalive_secs: DEFAULT_KEEPALIVE_SECS,
            pong_timeout_secs: DEFAULT_PONG_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            reconnect_base_ms: DEFAULT_RECONNECT_BASE_MS,
            reconnect_max_ms: DEFAULT_RECONNECT_MAX_MS,
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable handle to the session task.
///
/// All clones share one lease counter: `acquire` on the 0→1 edge dials the
/// broker and `release` on the 1→0 edge hangs up, so any number of views
/// can share the single connection.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    leases: Arc<AtomicUsize>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl SessionHandle {
    /// Take a lease on the connection, dialing the broker on the first one.
    pub async fn acquire(&self) -> Result<(), SessionError> {
        if self.leases.fetch_add(1, Ordering::SeqCst) == 0 {
            self.send(SessionCommand::Activate).await?;
        }
        Ok(())
    }

    /// Drop a lease, hanging up when the last one goes. Releasing without
    /// a matching acquire is a logged no-op.
    pub async fn release(&self) -> Result<(), SessionError> {
        let dropped =
            self.leases
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match dropped {
            Ok(1) => self.send(SessionCommand::Deactivate).await,
            Ok(_) => Ok(()),
            Err(_) => {
                warn!("Session release without a matching acquire");
                Ok(())
            }
        }
    }

    /// Number of outstanding leases.
    pub fn lease_count(&self) -> usize {
        self.leases.load(Ordering::SeqCst)
    }

    /// Track a topic, subscribing on the live connection now and again on
    /// every reconnect until it is unsubscribed.
    pub async fn subscribe(&self, topic: &str) -> Result<(), SessionError> {
        self.send(SessionCommand::Subscribe(topic.to_string())).await
    }

    /// Stop tracking a topic and unsubscribe on the live connection.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), SessionError> {
        self.send(SessionCommand::Unsubscribe(topic.to_string())).await
    }

    /// Publish `body` to a destination. Best effort: the frame is dropped
    /// (and logged) when the session is not connected.
    pub async fn publish(&self, destination: &str, body: Value) -> Result<(), SessionError> {
        self.send(SessionCommand::Publish {
            destination: destination.to_string(),
            body,
        })
        .await
    }

    /// Snapshot of the topics the task replays on reconnect.
    pub async fn tracked_topics(&self) -> Result<Vec<String>, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::TrackedTopics(tx)).await?;
        rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch receiver for connection state edges.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Stop the session task permanently, regardless of leases.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Shutdown).await
    }

    async fn send(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }
}

/// Spawn the broker session in a background tokio task.
///
/// Returns the command handle and the event channel. The task starts
/// disconnected; the first `acquire` on the handle dials the broker.
pub fn spawn_session(config: SessionConfig) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(EVENT_CHANNEL_CAPACITY);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

    tokio::spawn(session_task(config, cmd_rx, event_tx, state_tx));

    let handle = SessionHandle {
        cmd_tx,
        leases: Arc::new(AtomicUsize::new(0)),
        state_rx,
    };
    (handle, event_rx)
}

// ---------------------------------------------------------------------------
// Task internals
// ---------------------------------------------------------------------------

async fn session_task(
    config: SessionConfig,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    event_tx: mpsc::Sender<SessionEvent>,
    state_tx: watch::Sender<ConnectionState>,
) {
    let keepalive = Duration::from_secs(config.keepalive_secs);
    let pong_timeout = Duration::from_secs(config.pong_timeout_secs);
    let has_keepalive = config.keepalive_secs > 0;

    let mut topics: HashSet<String> = HashSet::new();
    let mut ws: Option<WsStream> = None;
    let mut active = false;
    let mut failures: u32 = 0;
    let mut state = ConnectionState::Disconnected;

    let mut idle_deadline = Instant::now();
    let mut pong_deadline = Instant::now();
    let mut awaiting_pong = false;

    loop {
        if let Some(socket) = ws.as_mut() {
            tokio::select! {
                // --- Incoming commands ---
                cmd = cmd_rx.recv() => match cmd {
                    Some(SessionCommand::Activate) => {
                        debug!("Activate while already connected");
                    }
                    Some(SessionCommand::Deactivate) => {
                        active = false;
                        failures = 0;
                        set_state(&mut state, &state_tx, &event_tx, ConnectionState::Disconnecting).await;
                        if let Err(e) = socket.close(None).await {
                            debug!(error = %e, "Close handshake failed");
                        }
                        ws = None;
                        set_state(&mut state, &state_tx, &event_tx, ConnectionState::Disconnected).await;
                        info!("Session deactivated");
                    }
                    Some(SessionCommand::Subscribe(topic)) => {
                        if topics.insert(topic.clone()) {
                            let frame = ClientFrame::Subscribe { topic: topic.clone() };
                            if send_frame(socket, &frame).await.is_err() {
                                warn!(topic = %topic, "Subscribe send failed, reconnecting");
                                ws = None;
                                set_state(&mut state, &state_tx, &event_tx, ConnectionState::Error).await;
                            } else {
                                debug!(topic = %topic, "Subscribed on broker");
                            }
                        }
                    }
                    Some(SessionCommand::Unsubscribe(topic)) => {
                        if topics.remove(&topic) {
                            let frame = ClientFrame::Unsubscribe { topic: topic.clone() };
                            if send_frame(socket, &frame).await.is_err() {
                                warn!(topic = %topic, "Unsubscribe send failed, reconnecting");
                                ws = None;
                                set_state(&mut state, &state_tx, &event_tx, ConnectionState::Error).await;
                            } else {
                                debug!(topic = %topic, "Unsubscribed on broker");
                            }
                        }
                    }
                    Some(SessionCommand::Publish { destination, body }) => {
                        let frame = ClientFrame::Send { destination: destination.clone(), body };
                        if send_frame(socket, &frame).await.is_err() {
                            warn!(destination = %destination, "Publish send failed, reconnecting");
                            ws = None;
                            set_state(&mut state, &state_tx, &event_tx, ConnectionState::Error).await;
                        } else {
                            debug!(destination = %destination, "Published");
                        }
                    }
                    Some(SessionCommand::TrackedTopics(reply)) => {
                        let _ = reply.send(topics.iter().cloned().collect());
                    }
                    Some(SessionCommand::Shutdown) | None => {
                        let _ = socket.close(None).await;
                        set_state(&mut state, &state_tx, &event_tx, ConnectionState::Disconnected).await;
                        info!("Session task terminated");
                        return;
                    }
                },

                // --- Keepalive: pong overdue ---
                _ = tokio::time::sleep_until(pong_deadline), if awaiting_pong => {
                    warn!("Keepalive pong overdue, dropping connection");
                    awaiting_pong = false;
                    ws = None;
                    set_state(&mut state, &state_tx, &event_tx, ConnectionState::Error).await;
                }

                // --- Keepalive: link idle, send a ping ---
                _ = tokio::time::sleep_until(idle_deadline), if has_keepalive && !awaiting_pong => {
                    if let Err(e) = socket.send(WsMessage::Ping(Bytes::new())).await {
                        warn!(error = %e, "Keepalive ping failed, reconnecting");
                        ws = None;
                        set_state(&mut state, &state_tx, &event_tx, ConnectionState::Error).await;
                    } else {
                        awaiting_pong = true;
                        pong_deadline = Instant::now() + pong_timeout;
                        idle_deadline = Instant::now() + keepalive;
                    }
                }

                // --- Inbound socket traffic ---
                frame = socket.next() => {
                    idle_deadline = Instant::now() + keepalive;
                    awaiting_pong = false;
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            match ServerFrame::from_text(text.as_str()) {
                                Ok(ServerFrame::Message { topic, body }) => {
                                    debug!(topic = %topic, "Frame received");
                                    let _ = event_tx.send(SessionEvent::Frame { topic, body }).await;
                                }
                                Err(e) => {
                                    warn!(error = %e, "Undecodable broker frame");
                                }
                            }
                        }
                        Some(Ok(WsMessage::Ping(payload))) => {
                            if let Err(e) = socket.send(WsMessage::Pong(payload)).await {
                                warn!(error = %e, "Pong reply failed, reconnecting");
                                ws = None;
                                set_state(&mut state, &state_tx, &event_tx, ConnectionState::Error).await;
                            }
                        }
                        Some(Ok(WsMessage::Pong(_))) => {
                            debug!("Keepalive pong received");
                        }
                        Some(Ok(WsMessage::Close(_))) => {
                            info!("Broker closed the connection");
                            ws = None;
                            set_state(&mut state, &state_tx, &event_tx, ConnectionState::Error).await;
                        }
                        Some(Ok(_)) => {
                            debug!("Ignoring non-text frame");
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Socket error");
                            ws = None;
                            set_state(&mut state, &state_tx, &event_tx, ConnectionState::Error).await;
                        }
                        None => {
                            warn!("Socket stream ended");
                            ws = None;
                            set_state(&mut state, &state_tx, &event_tx, ConnectionState::Error).await;
                        }
                    }
                }
            }
        } else if active {
            // Disconnected but leased: (re)connect, backing off after failures.
            let delay = if failures == 0 {
                Duration::ZERO
            } else {
                let exp = failures.saturating_sub(1).min(16);
                let millis = config
                    .reconnect_base_ms
                    .saturating_mul(2u64.saturating_pow(exp))
                    .min(config.reconnect_max_ms);
                Duration::from_millis(millis)
            };
            if !delay.is_zero() {
                info!(attempt = failures, delay_ms = delay.as_millis() as u64, "Reconnecting after backoff");
            }

            tokio::select! {
                // --- Commands can cancel or reshape the retry ---
                cmd = cmd_rx.recv() => match cmd {
                    Some(SessionCommand::Activate) => {
                        debug!("Activate while already active");
                    }
                    Some(SessionCommand::Deactivate) => {
                        active = false;
                        failures = 0;
                        set_state(&mut state, &state_tx, &event_tx, ConnectionState::Disconnected).await;
                        info!("Session deactivated");
                    }
                    Some(SessionCommand::Subscribe(topic)) => {
                        if topics.insert(topic.clone()) {
                            debug!(topic = %topic, "Topic tracked for next connect");
                        }
                    }
                    Some(SessionCommand::Unsubscribe(topic)) => {
                        if topics.remove(&topic) {
                            debug!(topic = %topic, "Topic untracked");
                        }
                    }
                    Some(SessionCommand::Publish { destination, .. }) => {
                        warn!(destination = %destination, "Publish while disconnected, frame dropped");
                    }
                    Some(SessionCommand::TrackedTopics(reply)) => {
                        let _ = reply.send(topics.iter().cloned().collect());
                    }
                    Some(SessionCommand::Shutdown) | None => {
                        set_state(&mut state, &state_tx, &event_tx, ConnectionState::Disconnected).await;
                        info!("Session task terminated");
                        return;
                    }
                },

                // --- Backoff elapsed, dial ---
                _ = tokio::time::sleep(delay) => {
                    set_state(&mut state, &state_tx, &event_tx, ConnectionState::Connecting).await;
                    match dial(&config).await {
                        Ok(mut socket) => {
                            info!(url = %config.broker_url, "Broker connected");
                            failures = 0;
                            awaiting_pong = false;
                            idle_deadline = Instant::now() + keepalive;
                            set_state(&mut state, &state_tx, &event_tx, ConnectionState::Connected).await;

                            // Replay the tracked topic set on every connect.
                            let mut replayed = true;
                            for topic in &topics {
                                let frame = ClientFrame::Subscribe { topic: topic.clone() };
                                if send_frame(&mut socket, &frame).await.is_err() {
                                    replayed = false;
                                    break;
                                }
                            }
                            if replayed {
                                if !topics.is_empty() {
                                    debug!(count = topics.len(), "Replayed topic subscriptions");
                                }
                                ws = Some(socket);
                            } else {
                                warn!("Subscription replay failed, reconnecting");
                                failures = failures.saturating_add(1);
                                set_state(&mut state, &state_tx, &event_tx, ConnectionState::Error).await;
                            }
                        }
                        Err(e) => {
                            warn!(url = %config.broker_url, error = %e, "Broker connect failed");
                            failures = failures.saturating_add(1);
                            set_state(&mut state, &state_tx, &event_tx, ConnectionState::Error).await;
                        }
                    }
                }
            }
        } else {
            // Disconnected and unleased: nothing to do but wait for commands.
            match cmd_rx.recv().await {
                Some(SessionCommand::Activate) => {
                    active = true;
                    failures = 0;
                    set_state(&mut state, &state_tx, &event_tx, ConnectionState::Connecting).await;
                    info!("Session activated");
                }
                Some(SessionCommand::Deactivate) => {
                    debug!("Deactivate while already disconnected");
                }
                Some(SessionCommand::Subscribe(topic)) => {
                    if topics.insert(topic.clone()) {
                        debug!(topic = %topic, "Topic tracked for next connect");
                    }
                }
                Some(SessionCommand::Unsubscribe(topic)) => {
                    if topics.remove(&topic) {
                        debug!(topic = %topic, "Topic untracked");
                    }
                }
                Some(SessionCommand::Publish { destination, .. }) => {
                    warn!(destination = %destination, "Publish while disconnected, frame dropped");
                }
                Some(SessionCommand::TrackedTopics(reply)) => {
                    let _ = reply.send(topics.iter().cloned().collect());
                }
                Some(SessionCommand::Shutdown) => {
                    info!("Session task terminated");
                    return;
                }
                None => {
                    info!("Command channel closed, session task terminated");
                    return;
                }
            }
        }
    }
}

async fn set_state(
    state: &mut ConnectionState,
    state_tx: &watch::Sender<ConnectionState>,
    event_tx: &mpsc::Sender<SessionEvent>,
    next: ConnectionState,
) {
    if *state == next {
        return;
    }
    debug!(from = %state, to = %next, "Connection state changed");
    *state = next;
    let _ = state_tx.send(next);
    let _ = event_tx.send(SessionEvent::StateChanged(next)).await;
}

async fn send_frame(socket: &mut WsStream, frame: &ClientFrame) -> tungstenite::Result<()> {
    let text = match frame.to_text() {
        Ok(text) => text,
        Err(e) => {
            // Encode failures are a bug in the frame, not in the link.
            warn!(error = %e, "Frame encode failed, dropping");
            return Ok(());
        }
    };
    socket.send(WsMessage::Text(text.into())).await
}

async fn dial(config: &SessionConfig) -> tungstenite::Result<WsStream> {
    let mut request = config.broker_url.as_str().into_client_request()?;
    if !config.token.is_empty() {
        let value = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| tungstenite::Error::HttpFormat(e.into()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let timeout = Duration::from_secs(config.connect_timeout_secs);
    match tokio::time::timeout(timeout, connect_async(request)).await {
        Ok(Ok((socket, _response))) => Ok(socket),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(tungstenite::Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "broker handshake timed out",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;

    const WAIT: Duration = Duration::from_secs(5);

    type ServerWs = WebSocketStream<TcpStream>;

    fn test_config(url: &str) -> SessionConfig {
        SessionConfig {
            broker_url: url.to_string(),
            token: "test-token".to_string(),
            keepalive_secs: 0,
            pong_timeout_secs: 1,
            connect_timeout_secs: 2,
            reconnect_base_ms: 20,
            reconnect_max_ms: 100,
        }
    }

    async fn bind_broker() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    async fn accept_client(listener: &TcpListener) -> ServerWs {
        let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        accept_async(stream).await.unwrap()
    }

    async fn next_text(socket: &mut ServerWs) -> String {
        loop {
            let frame = timeout(WAIT, socket.next()).await.unwrap().unwrap().unwrap();
            match frame {
                WsMessage::Text(text) => return text.to_string(),
                WsMessage::Ping(payload) => {
                    socket.send(WsMessage::Pong(payload)).await.unwrap();
                }
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, want: ConnectionState) {
        timeout(WAIT, rx.wait_for(|s| *s == want))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_acquire_connects_and_subscribes_queued_topic() {
        let (listener, url) = bind_broker().await;
        let (handle, _events) = spawn_session(test_config(&url));
        let mut state = handle.watch_state();

        // Queued before the first acquire, replayed on connect.
        handle.subscribe("chat/42").await.unwrap();
        handle.acquire().await.unwrap();

        let mut broker = accept_client(&listener).await;
        assert_eq!(
            next_text(&mut broker).await,
            r#"{"type":"subscribe","topic":"chat/42"}"#
        );
        wait_for_state(&mut state, ConnectionState::Connected).await;
    }

    #[tokio::test]
    async fn test_reconnect_replays_tracked_topics() {
        let (listener, url) = bind_broker().await;
        let (handle, mut events) = spawn_session(test_config(&url));
        let mut state = handle.watch_state();

        handle.acquire().await.unwrap();
        let mut broker = accept_client(&listener).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        handle.subscribe("chat/7").await.unwrap();
        assert_eq!(
            next_text(&mut broker).await,
            r#"{"type":"subscribe","topic":"chat/7"}"#
        );

        // Kill the connection; the session retries and replays the topic
        // without the caller doing anything.
        drop(broker);
        let mut broker = accept_client(&listener).await;
        assert_eq!(
            next_text(&mut broker).await,
            r#"{"type":"subscribe","topic":"chat/7"}"#
        );

        // Traffic flows again on the replayed subscription.
        broker
            .send(WsMessage::Text(
                r#"{"type":"message","topic":"chat/7","body":{"id":"1"}}"#.into(),
            ))
            .await
            .unwrap();
        let frame = timeout(WAIT, async {
            loop {
                match events.recv().await.unwrap() {
                    SessionEvent::Frame { topic, body } => return (topic, body),
                    SessionEvent::StateChanged(_) => {}
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(frame.0, "chat/7");
        assert_eq!(frame.1["id"], "1");
    }

    #[tokio::test]
    async fn test_publish_while_disconnected_is_dropped() {
        let (_listener, url) = bind_broker().await;
        let (handle, _events) = spawn_session(test_config(&url));

        // Never acquired: the publish is accepted and silently dropped.
        handle
            .publish("chat-message", serde_json::json!({"content": "hi"}))
            .await
            .unwrap();

        // Round-trip a query to be sure the command was processed.
        let topics = handle.tracked_topics().await.unwrap();
        assert!(topics.is_empty());
        assert_eq!(handle.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_release_disconnects_only_on_last_lease() {
        let (listener, url) = bind_broker().await;
        let (handle, _events) = spawn_session(test_config(&url));
        let mut state = handle.watch_state();

        handle.acquire().await.unwrap();
        handle.acquire().await.unwrap();
        let _broker = accept_client(&listener).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        handle.release().await.unwrap();
        // Still connected: one lease remains.
        handle.tracked_topics().await.unwrap();
        assert_eq!(handle.connection_state(), ConnectionState::Connected);
        assert_eq!(handle.lease_count(), 1);

        handle.release().await.unwrap();
        wait_for_state(&mut state, ConnectionState::Disconnected).await;
        assert_eq!(handle.lease_count(), 0);
    }

    #[tokio::test]
    async fn test_release_without_acquire_is_a_no_op() {
        let (_listener, url) = bind_broker().await;
        let (handle, _events) = spawn_session(test_config(&url));

        handle.release().await.unwrap();
        assert_eq!(handle.lease_count(), 0);
        assert_eq!(handle.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_unsubscribe_sends_frame_and_stops_replay() {
        let (listener, url) = bind_broker().await;
        let (handle, _events) = spawn_session(test_config(&url));
        let mut state = handle.watch_state();

        handle.acquire().await.unwrap();
        let mut broker = accept_client(&listener).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        handle.subscribe("notifications/u-1").await.unwrap();
        assert_eq!(
            next_text(&mut broker).await,
            r#"{"type":"subscribe","topic":"notifications/u-1"}"#
        );

        handle.unsubscribe("notifications/u-1").await.unwrap();
        assert_eq!(
            next_text(&mut broker).await,
            r#"{"type":"unsubscribe","topic":"notifications/u-1"}"#
        );
        assert!(handle.tracked_topics().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missed_pong_forces_reconnect() {
        let (listener, url) = bind_broker().await;
        let mut config = test_config(&url);
        config.keepalive_secs = 1;
        config.pong_timeout_secs = 1;
        let (handle, _events) = spawn_session(config);
        let mut state = handle.watch_state();

        handle.acquire().await.unwrap();
        // Accept but never read: pings get no pong.
        let _broker = accept_client(&listener).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        // The session declares the link dead and dials again; the fresh
        // connection carries traffic.
        let mut broker2 = accept_client(&listener).await;
        handle.subscribe("chat/1").await.unwrap();
        assert_eq!(
            next_text(&mut broker2).await,
            r#"{"type":"subscribe","topic":"chat/1"}"#
        );
    }
}
