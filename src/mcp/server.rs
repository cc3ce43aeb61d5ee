//! MCP server over line-delimited JSON-RPC
//!
//! One server instance serves one client session. Requests are handled on
//! their own tasks so an elicitation round trip suspends only the call that
//! issued it. All output, including server-to-client requests and
//! notifications, goes through a single writer task. When input closes, every
//! in-flight request is answered and flushed before `run` returns.

use crate::discovery::{CategorySelection, VisibilityFilter};
use crate::error::{RelayError, Result};
use crate::mcp::elicitation::{ElicitationCoordinator, Elicitor};
use crate::mcp::notifications::{ListChangedNotifier, NotificationSink};
use crate::mcp::resources::{HealthResource, ResourceManager};
use crate::mcp::session::ClientProfile;
use crate::mcp::types::{
    rpc_codes, ElicitationRequest, ElicitationResponse, ElicitationResult, InitializeParams, McpError,
    McpNotification, McpRequest, McpResponse, ToolCall, ToolListResponse,
};
use crate::metrics::HealthMonitor;
use crate::registry::CapabilityRegistry;
use crate::routing::{HandlerRegistry, InvocationRouter, TransportSelector};
use crate::services::ToolManagementService;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Protocol version answered when the client does not name one
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-06-18";

/// Session settings taken from configuration
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub name: String,
    pub version: String,
    pub default_selection: CategorySelection,
    /// Client-name fragments that mark dynamic-discovery clients
    pub dynamic_clients: Vec<String>,
    pub elicitation_enabled: bool,
    pub elicitation_timeout: Duration,
    pub bridge_enabled: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            default_selection: CategorySelection::All,
            dynamic_clients: Vec::new(),
            elicitation_enabled: true,
            elicitation_timeout: Duration::from_millis(crate::mcp::elicitation::DEFAULT_ELICITATION_TIMEOUT_MS),
            bridge_enabled: true,
        }
    }
}

/// Outgoing half of the session: serialized lines plus server-to-client requests
pub struct Outbound {
    sender: mpsc::UnboundedSender<String>,
    pending: Mutex<HashMap<String, oneshot::Sender<McpResponse>>>,
    next_id: AtomicU64,
    /// Set once input has closed; only changed while `pending` is locked
    input_closed: AtomicBool,
}

/// Removes a pending server-to-client request when its waiter goes away
struct PendingGuard<'a> {
    outbound: &'a Outbound,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.outbound.pending_map().remove(&self.id).is_some() {
            debug!("Abandoned server request {}", self.id);
        }
    }
}

impl Outbound {
    fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            sender,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            input_closed: AtomicBool::new(false),
        }
    }

    fn pending_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<McpResponse>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue one JSON line for the client
    pub fn send_value<T: Serialize>(&self, message: &T) -> Result<()> {
        let line = serde_json::to_string(message)?;
        self.sender
            .send(line)
            .map_err(|_| RelayError::mcp("Client output channel is closed"))
    }

    /// Send a server-to-client request and wait for its response
    pub async fn request(&self, method: &str, params: Value) -> Result<McpResponse> {
        let id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending_map();
            if self.input_closed.load(Ordering::Acquire) {
                return Err(RelayError::mcp(format!("Client input is closed; cannot send {}", method)));
            }
            pending.insert(id.clone(), tx);
        }
        let _guard = PendingGuard {
            outbound: self,
            id: id.clone(),
        };

        self.send_value(&McpRequest::new(json!(id), method, params))?;
        rx.await
            .map_err(|_| RelayError::mcp(format!("No response to {} request {}", method, id)))
    }

    /// Deliver a client response to its waiter. Returns whether anyone was waiting.
    pub fn resolve(&self, response: McpResponse) -> bool {
        let id = match &response.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match self.pending_map().remove(&id) {
            Some(waiter) => waiter.send(response).is_ok(),
            None => {
                debug!("Response for unknown server request {}", id);
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending_map().len()
    }

    /// Fail every outstanding server-to-client request, and any later one.
    /// Used once input has closed and no response can arrive.
    pub fn abandon_pending(&self) -> usize {
        let mut pending = self.pending_map();
        self.input_closed.store(true, Ordering::Release);
        let count = pending.len();
        pending.clear();
        count
    }
}

#[async_trait]
impl NotificationSink for Outbound {
    async fn send(&self, notification: McpNotification) -> Result<()> {
        self.send_value(&notification.to_json_rpc())
    }
}

/// Elicitation over `elicitation/create`
pub struct StdioElicitor {
    outbound: Arc<Outbound>,
}

impl StdioElicitor {
    pub fn new(outbound: Arc<Outbound>) -> Self {
        Self { outbound }
    }
}

#[async_trait]
impl Elicitor for StdioElicitor {
    async fn elicit(&self, request: &ElicitationRequest) -> Result<ElicitationResult> {
        let response = self
            .outbound
            .request("elicitation/create", request.create_params())
            .await?;

        if let Some(error) = response.error {
            return Err(RelayError::mcp(format!(
                "elicitation/create failed ({}): {}",
                error.code, error.message
            )));
        }
        let result = response.result.unwrap_or(Value::Null);
        let parsed: ElicitationResponse = serde_json::from_value(result)
            .map_err(|e| RelayError::mcp(format!("Malformed elicitation response: {}", e)))?;
        Ok(parsed.into_result(&request.fallback))
    }
}

/// MCP server for one client session
pub struct McpServer {
    settings: ServerSettings,
    registry: Arc<CapabilityRegistry>,
    visibility: Arc<VisibilityFilter>,
    router: Arc<InvocationRouter>,
    health: Arc<HealthMonitor>,
    resources: ResourceManager,
    /// Set once by `initialize`
    profile: OnceCell<ClientProfile>,
    outbound: Arc<Outbound>,
    output: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl McpServer {
    pub fn new(
        settings: ServerSettings,
        registry: Arc<CapabilityRegistry>,
        selector: Arc<TransportSelector>,
        handlers: HandlerRegistry,
        health: Arc<HealthMonitor>,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let outbound = Arc::new(Outbound::new(sender));

        let notifier = Arc::new(ListChangedNotifier::new(outbound.clone(), health.clone()));
        let visibility = Arc::new(VisibilityFilter::new(
            registry.clone(),
            settings.default_selection.clone(),
            notifier,
        ));
        let management = Arc::new(ToolManagementService::new(registry.clone(), visibility.clone()));

        let elicitation = if settings.elicitation_enabled {
            ElicitationCoordinator::new(Arc::new(StdioElicitor::new(outbound.clone())), settings.elicitation_timeout)
        } else {
            ElicitationCoordinator::disabled()
        };

        let resources = ResourceManager::new().with_provider(Arc::new(HealthResource::new(
            health.clone(),
            selector.clone(),
            settings.bridge_enabled,
        )));

        let router = Arc::new(InvocationRouter::new(
            registry.clone(),
            management,
            selector,
            handlers,
            Arc::new(elicitation),
            health.clone(),
        ));

        Arc::new(Self {
            settings,
            registry,
            visibility,
            router,
            health,
            resources,
            profile: OnceCell::new(),
            outbound,
            output: Mutex::new(Some(receiver)),
        })
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn visibility(&self) -> &Arc<VisibilityFilter> {
        &self.visibility
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn outbound(&self) -> &Arc<Outbound> {
        &self.outbound
    }

    /// Negotiated profile, anonymous until `initialize`
    pub fn profile(&self) -> ClientProfile {
        self.profile.get().cloned().unwrap_or_else(ClientProfile::anonymous)
    }

    /// Serve the session until `reader` reaches EOF
    pub async fn run<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut output = self
            .output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| RelayError::mcp("MCP server is already running"))?;

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let writer_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    line = output.recv() => match line {
                        Some(line) => {
                            if write_line(&mut writer, &line).await.is_err() {
                                return;
                            }
                        }
                        None => break,
                    },
                    _ = &mut stop_rx => {
                        while let Ok(line) = output.try_recv() {
                            if write_line(&mut writer, &line).await.is_err() {
                                return;
                            }
                        }
                        break;
                    }
                }
            }
            debug!("Client writer finished");
        });

        info!("MCP session ready - waiting for JSON-RPC messages");
        let mut tasks = JoinSet::new();
        let mut lines = reader.lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            self.dispatch_line(trimmed, &mut tasks);
                        }
                    }
                    Ok(None) => {
                        info!("Input closed, ending MCP session");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read from client: {}", e);
                        break;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(joined),
            }
        }

        // No client response can arrive any more
        let abandoned = self.outbound.abandon_pending();
        if abandoned > 0 {
            warn!("Abandoned {} server requests after input closed", abandoned);
        }
        if !tasks.is_empty() {
            info!("Waiting for {} in-flight requests", tasks.len());
        }
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }

        let _ = stop_tx.send(());
        if let Err(e) = writer_task.await {
            error!("Client writer task failed: {}", e);
        }
        Ok(())
    }

    fn dispatch_line(self: &Arc<Self>, line: &str, tasks: &mut JoinSet<()>) {
        let message: Value = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Unparseable message from client: {}", e);
                let response = McpResponse::error(
                    Value::Null,
                    McpError::new(rpc_codes::PARSE_ERROR, format!("Parse error: {}", e)),
                );
                self.reply(&response);
                return;
            }
        };

        if message.get("method").is_none() {
            match serde_json::from_value::<McpResponse>(message) {
                Ok(response) => {
                    self.outbound.resolve(response);
                }
                Err(e) => warn!("Ignoring message without method: {}", e),
            }
            return;
        }

        let request: McpRequest = match serde_json::from_value(message) {
            Ok(request) => request,
            Err(e) => {
                self.reply(&McpResponse::error(
                    Value::Null,
                    McpError::new(rpc_codes::INVALID_REQUEST, format!("Invalid request: {}", e)),
                ));
                return;
            }
        };

        let server = Arc::clone(self);
        tasks.spawn(async move {
            if let Some(response) = server.handle_request(request).await {
                server.reply(&response);
            }
        });
    }

    fn reply(&self, response: &McpResponse) {
        if let Err(e) = self.outbound.send_value(response) {
            warn!("Dropping response: {}", e);
        }
    }

    /// Handle one request or notification. Notifications produce no response.
    pub async fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
        let id = match request.id {
            Some(id) => id,
            None => {
                debug!("Client notification: {}", request.method);
                return None;
            }
        };
        debug!("Handling {} (id {})", request.method, id);

        let params = request.params.unwrap_or(Value::Null);
        let outcome = match request.method.as_str() {
            "initialize" => self.initialize(params),
            "ping" => Ok(json!({})),
            "tools/list" => {
                let tools = self.visibility.visible_tools(&self.profile());
                serde_json::to_value(ToolListResponse { tools }).map_err(|e| McpError::new(rpc_codes::INTERNAL_ERROR, e.to_string()))
            }
            "resources/list" => Ok(json!({ "resources": self.resources.list_resources() })),
            "resources/read" => match params.get("uri").and_then(Value::as_str) {
                Some(uri) => match self.resources.read_resource(uri).await {
                    Ok(content) => Ok(json!({ "contents": [content] })),
                    Err(e) => Err(McpError::invalid_params(e.to_string())),
                },
                None => Err(McpError::invalid_params("resources/read requires a uri")),
            },
            "tools/call" => match serde_json::from_value::<ToolCall>(params) {
                Ok(call) => {
                    let result = self.router.call(call, &self.profile()).await;
                    serde_json::to_value(result).map_err(|e| McpError::new(rpc_codes::INTERNAL_ERROR, e.to_string()))
                }
                Err(e) => Err(McpError::invalid_params(format!("Invalid tools/call params: {}", e))),
            },
            other => Err(McpError::method_not_found(other)),
        };

        Some(match outcome {
            Ok(result) => McpResponse::success(id, result),
            Err(error) => McpResponse::error(id, error),
        })
    }

    fn initialize(&self, params: Value) -> std::result::Result<Value, McpError> {
        let params: InitializeParams = if params.is_null() {
            InitializeParams::default()
        } else {
            serde_json::from_value(params)
                .map_err(|e| McpError::invalid_params(format!("Invalid initialize params: {}", e)))?
        };

        let profile = ClientProfile::from_initialize(&params, &self.settings.dynamic_clients);
        if self.profile.set(profile).is_err() {
            warn!("Ignoring repeated initialize");
            return Err(McpError::new(rpc_codes::INVALID_REQUEST, "Session is already initialized"));
        }

        Ok(json!({
            "protocolVersion": params.protocol_version.as_deref().unwrap_or(DEFAULT_PROTOCOL_VERSION),
            "capabilities": {
                "tools": { "listChanged": true },
                "resources": {}
            },
            "serverInfo": {
                "name": self.settings.name,
                "version": self.settings.version,
            }
        }))
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    let written = async {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    }
    .await;
    if let Err(e) = &written {
        error!("Failed to write to client: {}", e);
    }
    written
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!("Request task failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn abandoned_request_is_cleaned_up() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let outbound = Outbound::new(sender);

        let waited = timeout(Duration::from_millis(50), outbound.request("elicitation/create", json!({}))).await;
        assert!(waited.is_err());
        assert_eq!(outbound.pending_count(), 0);

        let line = receiver.recv().await.unwrap();
        let sent: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(sent["method"], "elicitation/create");
        assert_eq!(sent["id"], "srv-1");
    }

    #[tokio::test]
    async fn responses_reach_their_waiter() {
        let (sender, _receiver) = mpsc::unbounded_channel();
        let outbound = Arc::new(Outbound::new(sender));

        let waiter = {
            let outbound = outbound.clone();
            tokio::spawn(async move { outbound.request("elicitation/create", json!({})).await })
        };
        while outbound.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(outbound.resolve(McpResponse::success(json!("srv-1"), json!({"action": "decline"}))));
        let response = waiter.await.unwrap().unwrap();
        assert_eq!(response.result.unwrap()["action"], "decline");
    }

    #[tokio::test]
    async fn abandoning_pending_wakes_waiters() {
        let (sender, _receiver) = mpsc::unbounded_channel();
        let outbound = Arc::new(Outbound::new(sender));

        let waiter = {
            let outbound = outbound.clone();
            tokio::spawn(async move { outbound.request("elicitation/create", json!({})).await })
        };
        while outbound.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(outbound.abandon_pending(), 1);
        assert!(waiter.await.unwrap().is_err());

        // Later requests fail without waiting
        assert!(outbound.request("elicitation/create", json!({})).await.is_err());
        assert_eq!(outbound.pending_count(), 0);
    }

    #[tokio::test]
    async fn closed_output_fails_notifications() {
        let (sender, receiver) = mpsc::unbounded_channel();
        drop(receiver);
        let outbound = Outbound::new(sender);
        assert!(NotificationSink::send(&outbound, McpNotification::tools_list_changed()).await.is_err());
    }
}
