//! Automation bridge: the primary WebSocket transport into the engine
//!
//! The bridge performs a `bridge_hello`/`bridge_ack` handshake, then correlates
//! `automation_request`/`automation_response` pairs by request id. Long-running
//! requests stay alive through `progress_update` messages.

use crate::error::{RelayError, Result};
use crate::routing::transport::AutomationTransport;
use crate::routing::types::{TransportKind, TransportRequest, TransportResponse};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::time::{timeout, timeout_at, Duration, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Header carrying the capability token during the WebSocket upgrade
pub const CAPABILITY_HEADER: &str = "X-MCP-Capability";

/// Upper bound on deadline extensions granted by progress updates
pub const MAX_PROGRESS_EXTENSIONS: u32 = 10;

/// Configuration for the automation bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// WebSocket URL of the engine-side bridge
    pub url: String,
    pub capability_token: Option<String>,
    pub connect_timeout: Duration,
    /// When false the bridge never connects
    pub enabled: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8091".to_string(),
            capability_token: None,
            connect_timeout: Duration::from_millis(5_000),
            enabled: true,
        }
    }
}

/// Bridge connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// Wire messages exchanged with the engine-side bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    #[serde(rename_all = "camelCase")]
    BridgeHello {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        capability_token: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    BridgeAck {
        #[serde(default)]
        server_name: Option<String>,
        #[serde(default)]
        server_version: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AutomationRequest {
        request_id: String,
        action: String,
        payload: Map<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    AutomationResponse {
        request_id: String,
        #[serde(default)]
        success: Option<bool>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        result: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    ProgressUpdate {
        request_id: String,
        #[serde(default)]
        percent: Option<f64>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        still_working: Option<bool>,
    },
    BridgePing {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        timestamp: Option<String>,
    },
    BridgePong {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        timestamp: Option<String>,
    },
    BridgeGoodbye {
        #[serde(default)]
        reason: Option<String>,
    },
    BridgeError {
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    /// Events and anything newer than this client understands
    #[serde(other)]
    Unknown,
}

/// Signals delivered to a waiting request
#[derive(Debug)]
enum PendingSignal {
    Progress { still_working: bool },
    Response(TransportResponse),
    Closed(String),
}

type PendingMap = Arc<std::sync::Mutex<HashMap<String, mpsc::UnboundedSender<PendingSignal>>>>;

fn lock_pending(pending: &PendingMap) -> MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<PendingSignal>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a pending request once its caller stops waiting, however that happens
struct PendingGuard {
    pending: PendingMap,
    request_id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if lock_pending(&self.pending).remove(&self.request_id).is_some() {
            debug!("Dropped pending bridge request {}", self.request_id);
        }
    }
}

/// WebSocket client for the engine-side automation bridge
pub struct AutomationBridge {
    config: BridgeConfig,
    state: Arc<RwLock<ConnectionState>>,
    pending: PendingMap,
    message_sender: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
    shutdown_sender: Mutex<Option<oneshot::Sender<()>>>,
    /// Serializes lazy connection attempts
    connect_lock: Mutex<()>,
}

impl AutomationBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            pending: Arc::new(std::sync::Mutex::new(HashMap::new())),
            message_sender: Arc::new(Mutex::new(None)),
            shutdown_sender: Mutex::new(None),
            connect_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Connect and complete the handshake
    pub async fn connect(&self) -> Result<()> {
        if !self.config.enabled {
            return Err(RelayError::not_connected("Automation bridge is disabled"));
        }

        let _guard = self.connect_lock.lock().await;
        if *self.state.read().await == ConnectionState::Connected {
            return Ok(());
        }
        *self.state.write().await = ConnectionState::Connecting;

        match self.open().await {
            Ok(()) => {
                *self.state.write().await = ConnectionState::Connected;
                info!("Connected to automation bridge at {}", self.config.url);
                Ok(())
            }
            Err(e) => {
                *self.state.write().await = ConnectionState::Failed;
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<()> {
        info!("Connecting to automation bridge at {}", self.config.url);

        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| RelayError::transport(format!("Invalid bridge URL '{}': {}", self.config.url, e)))?;
        if let Some(token) = &self.config.capability_token {
            let value = HeaderValue::from_str(token)
                .map_err(|e| RelayError::config(format!("Invalid capability token: {}", e)))?;
            request.headers_mut().insert(CAPABILITY_HEADER, value);
        }

        let deadline = Instant::now() + self.config.connect_timeout;
        let (ws_stream, _response) = timeout_at(deadline, connect_async(request))
            .await
            .map_err(|_| RelayError::timeout(format!("Connection to automation bridge at {} timed out", self.config.url)))?
            .map_err(|e| RelayError::transport(format!("Automation bridge connection failed: {}", e)))?;

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let hello = BridgeMessage::BridgeHello {
            capability_token: self.config.capability_token.clone(),
        };
        ws_sender.send(Message::Text(serde_json::to_string(&hello)?)).await?;

        // The first application message must be the ack
        loop {
            let frame = timeout_at(deadline, ws_receiver.next())
                .await
                .map_err(|_| RelayError::timeout("Automation bridge handshake timed out"))?;
            match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<BridgeMessage>(&text) {
                        Ok(BridgeMessage::BridgeAck { server_name, server_version, .. }) => {
                            debug!(
                                "Bridge handshake acknowledged by {} {}",
                                server_name.as_deref().unwrap_or("unknown"),
                                server_version.as_deref().unwrap_or("")
                            );
                            break;
                        }
                        Ok(other) => {
                            return Err(RelayError::transport(format!(
                                "Handshake expected bridge_ack, got {:?}",
                                other
                            )));
                        }
                        Err(e) => {
                            return Err(RelayError::transport(format!("Malformed handshake reply: {}", e)));
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    ws_sender.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(frame))) => {
                    return Err(RelayError::transport(format!("Bridge closed during handshake: {:?}", frame)));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(RelayError::transport("Bridge closed during handshake")),
            }
        }

        let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<Message>();
        *self.message_sender.lock().await = Some(msg_tx);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        *self.shutdown_sender.lock().await = Some(shutdown_tx);

        // Outgoing messages
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = msg_rx.recv() => {
                        match msg {
                            Some(message) => {
                                if let Err(e) = ws_sender.send(message).await {
                                    error!("Failed to send bridge message: {}", e);
                                    *state.write().await = ConnectionState::Failed;
                                    break;
                                }
                            }
                            None => {
                                debug!("Outgoing bridge channel closed");
                                break;
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        let _ = ws_sender.send(Message::Close(None)).await;
                        debug!("Bridge writer shut down");
                        break;
                    }
                }
            }
        });

        // Incoming messages
        let state = Arc::clone(&self.state);
        let pending = Arc::clone(&self.pending);
        let message_sender = Arc::clone(&self.message_sender);
        tokio::spawn(async move {
            let reason = loop {
                match ws_receiver.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reason) = Self::handle_text_message(&text, &pending, &message_sender).await {
                            break reason;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => {
                            if let Some(reason) = Self::handle_text_message(&text, &pending, &message_sender).await {
                                break reason;
                            }
                        }
                        Err(_) => warn!("Received non-UTF8 binary message from automation bridge"),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if let Some(sender) = message_sender.lock().await.as_ref() {
                            let _ = sender.send(Message::Pong(data));
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        break format!("Automation bridge closed the connection: {:?}", frame);
                    }
                    Some(Err(e)) => {
                        error!("Automation bridge error: {}", e);
                        break format!("Automation bridge error: {}", e);
                    }
                    None => break "Automation bridge connection ended".to_string(),
                }
            };

            info!("{}", reason);
            *state.write().await = ConnectionState::Disconnected;
            *message_sender.lock().await = None;
            Self::fail_pending(&pending, &reason).await;
        });

        Ok(())
    }

    /// Returns a disconnect reason when the message ends the session
    async fn handle_text_message(
        text: &str,
        pending: &PendingMap,
        message_sender: &Mutex<Option<mpsc::UnboundedSender<Message>>>,
    ) -> Option<String> {
        let message = match serde_json::from_str::<BridgeMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring malformed bridge message: {}", e);
                return None;
            }
        };

        match message {
            BridgeMessage::AutomationResponse { request_id, success, message, error, result } => {
                let response = TransportResponse {
                    success: success.unwrap_or(error.is_none()),
                    request_id: request_id.clone(),
                    message,
                    error,
                    result,
                };
                let waiter = lock_pending(pending).remove(&request_id);
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(PendingSignal::Response(response));
                    }
                    None => debug!("Response for unknown or expired request {}", request_id),
                }
            }
            BridgeMessage::ProgressUpdate { request_id, percent, still_working, .. } => {
                debug!("Progress for {}: {:?}%", request_id, percent);
                let waiter = lock_pending(pending).get(&request_id).cloned();
                if let Some(waiter) = waiter {
                    let _ = waiter.send(PendingSignal::Progress {
                        still_working: still_working.unwrap_or(true),
                    });
                }
            }
            BridgeMessage::BridgePing { timestamp } => {
                let pong = BridgeMessage::BridgePong { timestamp };
                if let (Some(sender), Ok(text)) = (message_sender.lock().await.as_ref(), serde_json::to_string(&pong)) {
                    let _ = sender.send(Message::Text(text));
                }
            }
            BridgeMessage::BridgeGoodbye { reason } => {
                return Some(format!(
                    "Automation bridge said goodbye: {}",
                    reason.as_deref().unwrap_or("no reason given")
                ));
            }
            BridgeMessage::BridgeError { error, message } => {
                warn!(
                    "Automation bridge reported an error: {}",
                    error.or(message).unwrap_or_default()
                );
            }
            BridgeMessage::BridgePong { .. } | BridgeMessage::BridgeAck { .. } | BridgeMessage::Unknown => {}
            BridgeMessage::BridgeHello { .. } | BridgeMessage::AutomationRequest { .. } => {
                debug!("Ignoring client-only bridge message");
            }
        }
        None
    }

    async fn fail_pending(pending: &PendingMap, reason: &str) {
        let drained: Vec<_> = lock_pending(pending).drain().collect();
        if !drained.is_empty() {
            warn!("Failing {} pending bridge request(s): {}", drained.len(), reason);
        }
        for (_, waiter) in drained {
            let _ = waiter.send(PendingSignal::Closed(reason.to_string()));
        }
    }

    /// Close the connection and fail everything in flight
    pub async fn disconnect(&self) {
        info!("Disconnecting from automation bridge");
        if let Some(sender) = self.shutdown_sender.lock().await.take() {
            let _ = sender.send(());
        }
        *self.state.write().await = ConnectionState::Disconnected;
        *self.message_sender.lock().await = None;
        Self::fail_pending(&self.pending, "Automation bridge disconnected").await;
    }

    /// Number of requests awaiting a response
    pub async fn pending_count(&self) -> usize {
        lock_pending(&self.pending).len()
    }
}

#[async_trait]
impl AutomationTransport for AutomationBridge {
    fn kind(&self) -> TransportKind {
        TransportKind::Bridge
    }

    async fn is_connected(&self) -> bool {
        *self.state.read().await == ConnectionState::Connected
    }

    async fn ensure_connected(&self) -> bool {
        if self.is_connected().await {
            return true;
        }
        if !self.config.enabled {
            return false;
        }
        match self.connect().await {
            Ok(()) => true,
            Err(e) => {
                debug!("Lazy bridge connection failed: {}", e);
                false
            }
        }
    }

    async fn send(&self, request: &TransportRequest, request_timeout: Duration) -> Result<TransportResponse> {
        if !self.is_connected().await {
            return Err(RelayError::not_connected("Automation bridge is not connected"));
        }

        let request_id = Uuid::new_v4().to_string();
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
        lock_pending(&self.pending).insert(request_id.clone(), signal_tx);
        let _guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            request_id: request_id.clone(),
        };

        let wire = BridgeMessage::AutomationRequest {
            request_id: request_id.clone(),
            action: request.action.clone(),
            payload: request.payload.clone(),
        };
        let text = serde_json::to_string(&wire)?;

        let sent = match self.message_sender.lock().await.as_ref() {
            Some(sender) => sender.send(Message::Text(text)).is_ok(),
            None => false,
        };
        if !sent {
            return Err(RelayError::transport("Automation bridge message channel is closed"));
        }
        debug!("Sent automation_request {} action={}", request_id, request.action);

        let mut deadline = Instant::now() + request_timeout;
        let mut extensions = 0u32;
        loop {
            match timeout_at(deadline, signal_rx.recv()).await {
                Ok(Some(PendingSignal::Response(response))) => return Ok(response),
                Ok(Some(PendingSignal::Progress { still_working })) => {
                    if still_working && extensions < MAX_PROGRESS_EXTENSIONS {
                        extensions += 1;
                        deadline = Instant::now() + request_timeout;
                        debug!("Extended deadline of {} ({} of {})", request_id, extensions, MAX_PROGRESS_EXTENSIONS);
                    }
                }
                Ok(Some(PendingSignal::Closed(reason))) => return Err(RelayError::transport(reason)),
                Ok(None) => {
                    return Err(RelayError::transport(format!("Response channel closed for request {}", request_id)));
                }
                Err(_) => {
                    return Err(RelayError::timeout(format!(
                        "Request {} ({}) timed out after {}ms",
                        request_id,
                        request.action,
                        request_timeout.as_millis()
                    )));
                }
            }
        }
    }
}

/// Connect once, logging instead of failing
pub async fn try_connect(bridge: &AutomationBridge) -> bool {
    match timeout(bridge.config.connect_timeout * 2, bridge.connect()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("Automation bridge unavailable: {}", e);
            false
        }
        Err(_) => {
            warn!("Automation bridge connection attempt timed out");
            false
        }
    }
}
