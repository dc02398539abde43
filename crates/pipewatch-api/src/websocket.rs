//! Push channel: topic subscriptions over one WebSocket.
//!
//! The channel keeps the set of subscribed pipeline ids on the client and
//! replays it every time a connection is established, so server-side
//! state catches up after any disconnect. It never reconnects on its own:
//! the next `subscribe` (or an explicit [`EventChannel::connect`]) does.
//! A failed connection attempt disables the channel for the rest of the
//! session and the caller keeps working over REST.
//!
//! Inbound pushes are parsed into the same types the REST endpoints
//! return and fanned out through a [`tokio::sync::broadcast`] channel.
//!
//! # Example
//!
//! ```rust,ignore
//! use pipewatch_api::websocket::{ChannelConfig, EventChannel};
//!
//! let config = ChannelConfig::from_base_url(&base_url, "ws")?;
//! let channel = EventChannel::new(config, Some(transport));
//! let mut rx = channel.pushes();
//!
//! channel.subscribe("42").await?;
//! while let Ok(push) = rx.recv().await {
//!     println!("{push:?}");
//! }
//!
//! channel.shutdown();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::Utc;
use dashmap::DashSet;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::ChannelError;
use crate::models::{
    EventType, MonitoringMetric, PipelineStatus, ReplicationEvent, parse_timestamp,
};
use crate::transport::Transport;

// ── Broadcast channel capacity ───────────────────────────────────────

const PUSH_CHANNEL_CAPACITY: usize = 1024;

// ── Wire messages ────────────────────────────────────────────────────

/// Client → server control messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { pipeline_id: String },
    Unsubscribe { pipeline_id: String },
}

impl ClientMessage {
    pub fn subscribe(pipeline_id: impl Into<String>) -> Self {
        Self::Subscribe {
            pipeline_id: pipeline_id.into(),
        }
    }

    pub fn unsubscribe(pipeline_id: impl Into<String>) -> Self {
        Self::Unsubscribe {
            pipeline_id: pipeline_id.into(),
        }
    }
}

/// Server → client pushes, normalized to the REST entity shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    ReplicationEvent(ReplicationEvent),
    MonitoringMetric(MonitoringMetric),
    PipelineStatus(PipelineStatus),
}

impl PushMessage {
    /// Pipeline the push belongs to.
    pub fn pipeline_id(&self) -> &str {
        match self {
            Self::ReplicationEvent(e) => &e.pipeline_id,
            Self::MonitoringMetric(m) => &m.pipeline_id,
            Self::PipelineStatus(s) => &s.pipeline_id,
        }
    }
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

// ── ChannelConfig ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// `ws://` or `wss://` endpoint, without credentials.
    pub url: Url,
    pub connect_timeout: Duration,
}

impl ChannelConfig {
    /// Derive the push endpoint from the REST base URL.
    ///
    /// `http://host:8000/api` + `ws` → `ws://host:8000/api/ws`
    pub fn from_base_url(base_url: &Url, path: &str) -> Result<Self, ChannelError> {
        let mut url = base_url.clone();
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(ChannelError::InvalidUrl(format!(
                    "unsupported scheme {other:?} in {base_url}"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| ChannelError::InvalidUrl(base_url.to_string()))?;

        let prefix = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{prefix}/{}", path.trim_start_matches('/')));
        url.set_query(None);

        Ok(Self {
            url,
            connect_timeout: Duration::from_secs(10),
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// ── EventChannel ─────────────────────────────────────────────────────

struct ChannelInner {
    config: ChannelConfig,
    /// Source of the bearer token sent on the upgrade request.
    token_source: Option<Arc<Transport>>,
    subscriptions: DashSet<String>,
    state: watch::Sender<ChannelState>,
    connection_failed: AtomicBool,
    outbound: ArcSwapOption<mpsc::UnboundedSender<ClientMessage>>,
    push_tx: broadcast::Sender<Arc<PushMessage>>,
    cancel: CancellationToken,
    /// Serializes subscribe / unsubscribe / connect.
    lock: Mutex<()>,
}

/// Handle to the push channel.
///
/// Cheaply cloneable; clones share the connection and the subscription set.
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<ChannelInner>,
}

impl EventChannel {
    pub fn new(config: ChannelConfig, token_source: Option<Arc<Transport>>) -> Self {
        let (push_tx, _) = broadcast::channel(PUSH_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            inner: Arc::new(ChannelInner {
                config,
                token_source,
                subscriptions: DashSet::new(),
                state,
                connection_failed: AtomicBool::new(false),
                outbound: ArcSwapOption::empty(),
                push_tx,
                cancel: CancellationToken::new(),
                lock: Mutex::new(()),
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn state(&self) -> ChannelState {
        *self.inner.state.borrow()
    }

    /// Observe state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.inner.state.subscribe()
    }

    /// A new receiver for inbound pushes, in transport order.
    pub fn pushes(&self) -> broadcast::Receiver<Arc<PushMessage>> {
        self.inner.push_tx.subscribe()
    }

    /// Current subscription set, sorted.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .inner
            .subscriptions
            .iter()
            .map(|t| t.key().clone())
            .collect();
        topics.sort();
        topics
    }

    pub fn is_subscribed(&self, pipeline_id: &str) -> bool {
        self.inner.subscriptions.contains(pipeline_id)
    }

    /// `true` once a connection attempt has failed in this session.
    pub fn connection_failed(&self) -> bool {
        self.inner.connection_failed.load(Ordering::Acquire)
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Add `pipeline_id` to the subscription set.
    ///
    /// Connects lazily when disconnected; the connect replays the whole
    /// set. An already-subscribed id sends nothing. Blank ids are ignored.
    pub async fn subscribe(&self, pipeline_id: &str) -> Result<(), ChannelError> {
        let topic = pipeline_id.trim();
        if topic.is_empty() {
            tracing::debug!("ignoring subscribe for blank pipeline id");
            return Ok(());
        }

        let _guard = self.inner.lock.lock().await;
        let added = self.inner.subscriptions.insert(topic.to_owned());

        if self.state() == ChannelState::Connected {
            if added {
                self.send(ClientMessage::subscribe(topic));
            }
            return Ok(());
        }

        if self.connection_failed() {
            tracing::debug!(topic, "push channel unavailable, relying on REST");
            return Ok(());
        }

        self.connect_locked().await
    }

    /// Remove `pipeline_id` from the subscription set.
    pub async fn unsubscribe(&self, pipeline_id: &str) {
        let topic = pipeline_id.trim();
        let _guard = self.inner.lock.lock().await;
        let removed = self.inner.subscriptions.remove(topic).is_some();
        if removed && self.state() == ChannelState::Connected {
            self.send(ClientMessage::unsubscribe(topic));
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Connect now (if not already) and replay the subscription set.
    pub async fn connect(&self) -> Result<(), ChannelError> {
        let _guard = self.inner.lock.lock().await;
        self.connect_locked().await
    }

    /// Tear down the connection and stop background tasks for good.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.outbound.store(None);
        self.inner.state.send_replace(ChannelState::Disconnected);
    }

    fn send(&self, message: ClientMessage) {
        match self.inner.outbound.load_full() {
            Some(tx) => {
                if tx.send(message).is_err() {
                    tracing::debug!("push channel writer gone, message dropped");
                }
            }
            None => tracing::debug!("push channel not connected, message dropped"),
        }
    }

    /// Caller holds `inner.lock`.
    async fn connect_locked(&self) -> Result<(), ChannelError> {
        let inner = &self.inner;
        if self.state() == ChannelState::Connected {
            return Ok(());
        }
        if inner.cancel.is_cancelled() || self.connection_failed() {
            return Err(ChannelError::Unavailable);
        }

        inner.state.send_replace(ChannelState::Connecting);
        tracing::info!(url = %inner.config.url, "connecting push channel");

        let ws_stream = match self.open().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "push channel connect failed, disabling for this session"
                );
                inner.connection_failed.store(true, Ordering::Release);
                inner.state.send_replace(ChannelState::Disconnected);
                return Err(e);
            }
        };

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        // Replay before anything else can be queued.
        for message in replay_messages(self.subscriptions()) {
            let _ = tx.send(message);
        }

        let conn_cancel = inner.cancel.child_token();
        tokio::spawn(write_loop(write, rx, conn_cancel.clone()));
        tokio::spawn(read_loop(read, Arc::clone(inner), conn_cancel));

        inner.outbound.store(Some(Arc::new(tx)));
        inner.state.send_replace(ChannelState::Connected);
        tracing::info!(topics = inner.subscriptions.len(), "push channel connected");
        Ok(())
    }

    async fn open(&self) -> Result<WsStream, ChannelError> {
        let mut url = self.inner.config.url.clone();
        if let Some(token) = self.inner.token_source.as_ref().and_then(|t| t.token()) {
            url.query_pairs_mut()
                .append_pair("token", token.expose_secret());
        }

        let connect = tokio_tungstenite::connect_async(url.as_str());
        match tokio::time::timeout(self.inner.config.connect_timeout, connect).await {
            Ok(Ok((stream, _response))) => Ok(stream),
            Ok(Err(e)) => Err(ChannelError::Connect(e.to_string())),
            Err(_) => Err(ChannelError::Connect(format!(
                "no handshake within {}s",
                self.inner.config.connect_timeout.as_secs()
            ))),
        }
    }
}

// ── Connection tasks ─────────────────────────────────────────────────

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Drain queued control messages onto the socket.
async fn write_loop(
    mut write: SplitSink<WsStream, tungstenite::Message>,
    mut rx: mpsc::UnboundedReceiver<ClientMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = rx.recv() => {
                let Some(message) = message else { break };
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::debug!(error = %e, "could not encode control message");
                        continue;
                    }
                };
                if let Err(e) = write.send(tungstenite::Message::Text(text.into())).await {
                    tracing::debug!(error = %e, "push channel write failed");
                    break;
                }
            }
        }
    }
    let _ = write.close().await;
}

/// Broadcast inbound pushes until the socket closes or fails, then mark
/// the channel disconnected. No reconnect happens here.
async fn read_loop(
    mut read: SplitStream<WsStream>,
    inner: Arc<ChannelInner>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if let Some(push) = parse_push(&text) {
                            // Err only means no receivers right now.
                            let _ = inner.push_tx.send(Arc::new(push));
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "push channel closed by server"
                            );
                        } else {
                            tracing::info!("push channel closed by server");
                        }
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "push channel read failed");
                        break;
                    }
                    None => {
                        tracing::info!("push channel stream ended");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    inner.outbound.store(None);
    inner.state.send_replace(ChannelState::Disconnected);
    cancel.cancel();
}

/// Subscribe messages that bring a fresh connection up to `topics`.
///
/// Sorted and free of duplicates: one message per topic.
pub fn replay_messages(mut topics: Vec<String>) -> Vec<ClientMessage> {
    topics.sort();
    topics.dedup();
    topics.into_iter().map(ClientMessage::subscribe).collect()
}

// ── Message parsing ──────────────────────────────────────────────────

/// Envelope every inbound frame arrives in: `{"type": ..., "data": {...}}`.
#[derive(Debug, Deserialize)]
struct PushEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Parse one text frame. Unknown or malformed frames yield `None`.
pub fn parse_push(text: &str) -> Option<PushMessage> {
    let envelope: PushEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse push envelope");
            return None;
        }
    };

    match envelope.kind.as_str() {
        "replication_event" => {
            match serde_json::from_value::<ReplicationEvent>(envelope.data.clone()) {
                Ok(event) => Some(PushMessage::ReplicationEvent(event)),
                Err(e) => {
                    tracing::debug!(error = %e, "malformed event, building from raw data");
                    event_from_raw(&envelope.data).map(PushMessage::ReplicationEvent)
                }
            }
        }
        "monitoring_metric" => decode_or_log(envelope.data, "monitoring_metric")
            .map(PushMessage::MonitoringMetric),
        "pipeline_status" => {
            decode_or_log(envelope.data, "pipeline_status").map(PushMessage::PipelineStatus)
        }
        other => {
            tracing::debug!(kind = other, "ignoring unknown push type");
            None
        }
    }
}

fn decode_or_log<T: serde::de::DeserializeOwned>(data: serde_json::Value, kind: &str) -> Option<T> {
    serde_json::from_value(data)
        .map_err(|e| tracing::debug!(error = %e, kind, "dropping malformed push"))
        .ok()
}

/// Best-effort event from loosely shaped push data.
///
/// Needs an id and a pipeline id; everything else has a fallback.
fn event_from_raw(data: &serde_json::Value) -> Option<ReplicationEvent> {
    let id = raw_id(data, &["id", "event_id"])?;
    let pipeline_id = raw_id(data, &["pipeline_id"])?;

    let text = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| data[*k].as_str())
            .map(str::to_owned)
    };

    let event_type = text(&["event_type", "operation"])
        .and_then(|t| {
            serde_json::from_value::<EventType>(serde_json::Value::String(t.to_lowercase())).ok()
        })
        .unwrap_or(EventType::Other);

    let timestamp = text(&["timestamp", "created_at"])
        .and_then(|t| parse_timestamp(&t))
        .unwrap_or_else(Utc::now);

    Some(ReplicationEvent {
        id,
        pipeline_id,
        table_name: text(&["table_name", "table"]).unwrap_or_default(),
        event_type,
        status: text(&["status"]),
        latency_ms: data["latency_ms"]
            .as_f64()
            .or_else(|| data["latency"].as_f64()),
        error_message: text(&["error_message", "error"]),
        timestamp,
    })
}

fn raw_id(data: &serde_json::Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match &data[*k] {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

// ── Tests ────────────────────────────────────────────────────────────
