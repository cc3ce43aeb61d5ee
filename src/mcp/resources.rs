//! Read-only MCP resources
//!
//! `ue://health` exposes the health monitor, including the recent-error ring
//! that collects failures no caller ever sees.

use crate::error::{RelayError, Result};
use crate::mcp::types::{Resource, ResourceContent};
use crate::metrics::HealthMonitor;
use crate::routing::TransportSelector;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const HEALTH_URI: &str = "ue://health";

/// Source of one or more resources
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    fn resources(&self) -> Vec<Resource>;

    fn supports_uri(&self, uri: &str) -> bool;

    async fn read(&self, uri: &str) -> Result<ResourceContent>;
}

/// Health status and metrics
pub struct HealthResource {
    health: Arc<HealthMonitor>,
    selector: Arc<TransportSelector>,
    bridge_enabled: bool,
}

impl HealthResource {
    pub fn new(health: Arc<HealthMonitor>, selector: Arc<TransportSelector>, bridge_enabled: bool) -> Self {
        Self {
            health,
            selector,
            bridge_enabled,
        }
    }
}

#[async_trait]
impl ResourceProvider for HealthResource {
    fn resources(&self) -> Vec<Resource> {
        vec![Resource {
            uri: HEALTH_URI.to_string(),
            name: "Health Status".to_string(),
            description: Some("Server health and performance metrics".to_string()),
            mime_type: Some("application/json".to_string()),
        }]
    }

    fn supports_uri(&self, uri: &str) -> bool {
        uri == HEALTH_URI
    }

    async fn read(&self, uri: &str) -> Result<ResourceContent> {
        let connected = self.selector.bridge_connected().await;
        let report = self.health.report(connected, self.bridge_enabled);
        Ok(ResourceContent::json(uri, &serde_json::to_value(&report)?))
    }
}

/// Resource providers served by one session
#[derive(Default)]
pub struct ResourceManager {
    providers: Vec<Arc<dyn ResourceProvider>>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn list_resources(&self) -> Vec<Resource> {
        self.providers.iter().flat_map(|p| p.resources()).collect()
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ResourceContent> {
        debug!("Reading resource: {}", uri);
        match self.providers.iter().find(|p| p.supports_uri(uri)) {
            Some(provider) => provider.read(uri).await,
            None => Err(RelayError::not_found(format!("Unknown resource: {}", uri))),
        }
    }
}
