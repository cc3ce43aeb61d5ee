//! MCP notifications
//!
//! List-changed notifications are best-effort: delivery runs on its own task
//! and a failure lands in the health monitor's error ring rather than in the
//! result of the call that triggered it.

use crate::error::{ErrorCode, Result};
use crate::mcp::types::McpNotification;
use crate::metrics::HealthMonitor;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Scope under which delivery failures are recorded
pub const NOTIFICATION_SCOPE: &str = "notification";

/// Anything that can deliver a notification to the client
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: McpNotification) -> Result<()>;
}

/// Emits `notifications/tools/list_changed` without ever failing the caller
pub struct ListChangedNotifier {
    sink: Arc<dyn NotificationSink>,
    diagnostics: Arc<HealthMonitor>,
}

impl ListChangedNotifier {
    pub fn new(sink: Arc<dyn NotificationSink>, diagnostics: Arc<HealthMonitor>) -> Self {
        Self { sink, diagnostics }
    }

    /// Send the notification and capture any failure. Returns whether it was delivered.
    pub async fn send_tools_list_changed(&self) -> bool {
        Self::deliver(Arc::clone(&self.sink), Arc::clone(&self.diagnostics)).await
    }

    /// Fire-and-forget variant. The handle is only useful to tests.
    pub fn notify_tools_list_changed(&self) -> Option<JoinHandle<bool>> {
        info!("Tools list changed - sending notification");
        let sink = Arc::clone(&self.sink);
        let diagnostics = Arc::clone(&self.diagnostics);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(Self::deliver(sink, diagnostics))),
            Err(_) => {
                warn!("No async runtime available; list_changed notification dropped");
                diagnostics.record_error(
                    NOTIFICATION_SCOPE,
                    ErrorCode::Internal,
                    "no async runtime available for list_changed notification",
                    false,
                );
                None
            }
        }
    }

    async fn deliver(sink: Arc<dyn NotificationSink>, diagnostics: Arc<HealthMonitor>) -> bool {
        match sink.send(McpNotification::tools_list_changed()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to deliver tools list_changed notification: {}", e);
                diagnostics.record_error(NOTIFICATION_SCOPE, e.code(), e.to_string(), e.is_retryable());
                false
            }
        }
    }
}
