//! Domain handlers and the generic automation forwarder

use crate::error::Result;
use crate::registry::ToolDescriptor;
use crate::routing::arguments::ValidatedCall;
use crate::routing::selector::TransportSelector;
use crate::routing::types::TransportRequest;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Executes a validated call and returns its raw result.
/// The router normalizes whatever comes back.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, call: &ValidatedCall, descriptor: &ToolDescriptor) -> Result<Value>;
}

/// Sends the call to the engine through the transport selector
pub struct AutomationForwarder {
    selector: Arc<TransportSelector>,
}

impl AutomationForwarder {
    pub fn new(selector: Arc<TransportSelector>) -> Self {
        Self { selector }
    }

    pub fn request_for(call: &ValidatedCall) -> TransportRequest {
        let action = call.action.clone().unwrap_or_else(|| call.tool_name.clone());
        TransportRequest::new(action, call.arguments.as_map().clone()).with_timeout_ms(call.timeout_ms)
    }
}

#[async_trait]
impl ToolHandler for AutomationForwarder {
    async fn handle(&self, call: &ValidatedCall, descriptor: &ToolDescriptor) -> Result<Value> {
        let request = Self::request_for(call);
        debug!("Forwarding {}.{} to the engine", call.tool_name, request.action);
        let envelope = self
            .selector
            .run(call.transport.as_deref(), descriptor.action_class, &request)
            .await;
        Ok(envelope.to_value())
    }
}

/// Handlers keyed by tool name, with a fallback for everything else
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    fallback: Arc<dyn ToolHandler>,
}

impl HandlerRegistry {
    pub fn new(fallback: Arc<dyn ToolHandler>) -> Self {
        Self {
            handlers: HashMap::new(),
            fallback,
        }
    }

    pub fn register<S: Into<String>>(&mut self, tool_name: S, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(tool_name.into(), handler);
    }

    pub fn with_handler<S: Into<String>>(mut self, tool_name: S, handler: Arc<dyn ToolHandler>) -> Self {
        self.register(tool_name, handler);
        self
    }

    pub fn resolve(&self, tool_name: &str) -> Arc<dyn ToolHandler> {
        self.handlers
            .get(tool_name)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn has_dedicated(&self, tool_name: &str) -> bool {
        self.handlers.contains_key(tool_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::arguments::ToolArguments;
    use serde_json::{json, Map};

    struct Fixed(&'static str);

    #[async_trait]
    impl ToolHandler for Fixed {
        async fn handle(&self, _call: &ValidatedCall, _descriptor: &ToolDescriptor) -> Result<Value> {
            Ok(json!({ "handler": self.0 }))
        }
    }

    fn call(tool: &str, action: Option<&str>) -> ValidatedCall {
        let mut args = Map::new();
        args.insert("name".into(), json!("Cube"));
        ValidatedCall {
            tool_name: tool.into(),
            action: action.map(str::to_string),
            transport: None,
            timeout_ms: Some(250),
            arguments: ToolArguments::from(args),
        }
    }

    #[test]
    fn action_defaults_to_tool_name() {
        let request = AutomationForwarder::request_for(&call("inspect", None));
        assert_eq!(request.action, "inspect");
        assert_eq!(request.timeout_ms, Some(250));

        let request = AutomationForwarder::request_for(&call("control_actor", Some("spawn")));
        assert_eq!(request.action, "spawn");
        assert_eq!(request.payload["name"], "Cube");
    }

    #[test]
    fn dedicated_handlers_win() {
        let registry = HandlerRegistry::new(Arc::new(Fixed("fallback"))).with_handler("inspect", Arc::new(Fixed("inspect")));
        assert!(registry.has_dedicated("inspect"));
        assert!(!registry.has_dedicated("control_actor"));
        assert!(Arc::ptr_eq(&registry.resolve("control_actor"), &registry.fallback));
    }
}
