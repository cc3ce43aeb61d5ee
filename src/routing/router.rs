//! Invocation router: the single entry point for `tools/call`
//!
//! Per call: lookup, management short-circuit, enabled check, connectivity
//! check, elicitation, validation, dispatch, normalization. Elapsed time is
//! recorded on every terminal path and no failure escapes as an error.

use crate::error::{ErrorCode, RelayError};
use crate::mcp::elicitation::ElicitationCoordinator;
use crate::mcp::session::ClientProfile;
use crate::mcp::types::{ToolCall, ToolResult};
use crate::metrics::HealthMonitor;
use crate::registry::{CapabilityRegistry, ToolDescriptor};
use crate::routing::arguments::{ArgumentValidator, ACTION_KEY};
use crate::routing::handler::HandlerRegistry;
use crate::routing::selector::TransportSelector;
use crate::services::ToolManagementService;
use futures_util::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Shared collaborators of the router
pub struct InvocationRouter {
    registry: Arc<CapabilityRegistry>,
    management: Arc<ToolManagementService>,
    selector: Arc<TransportSelector>,
    handlers: HandlerRegistry,
    elicitation: Arc<ElicitationCoordinator>,
    validator: ArgumentValidator,
    health: Arc<HealthMonitor>,
}

impl InvocationRouter {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        management: Arc<ToolManagementService>,
        selector: Arc<TransportSelector>,
        handlers: HandlerRegistry,
        elicitation: Arc<ElicitationCoordinator>,
        health: Arc<HealthMonitor>,
    ) -> Self {
        Self {
            registry,
            management,
            selector,
            handlers,
            elicitation,
            validator: ArgumentValidator::new(),
            health,
        }
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Route one tool call. Always answers with a result envelope.
    pub async fn call(&self, call: ToolCall, profile: &ClientProfile) -> ToolResult {
        let start = Instant::now();
        let name = call.name.clone();
        debug!("Routing tool call: {}", name);

        let result = self.route(call, profile).await;
        let success = result.success();
        if !success {
            let code = result.error_code().unwrap_or(ErrorCode::Internal);
            let message = failure_message(&result);
            self.health.record_error(name.as_str(), code, message, false);
        }
        self.health.track_performance(&name, start, success);
        result
    }

    async fn route(&self, call: ToolCall, profile: &ClientProfile) -> ToolResult {
        let args = match call.arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return ToolResult::failure(
                    format!("Arguments for '{}' must be an object, got {}", call.name, type_name(&other)),
                    ErrorCode::Validation,
                );
            }
        };

        let descriptor = match self.registry.descriptor(&call.name) {
            Some(descriptor) => descriptor,
            None => {
                return ToolResult::failure(format!("Tool '{}' not found", call.name), ErrorCode::NotFound);
            }
        };

        if descriptor.management_only {
            return self.management.handle(&args);
        }

        if self.registry.is_enabled(&descriptor.name) != Some(true) {
            info!("Rejected call to disabled tool {}", descriptor.name);
            return ToolResult::failure(
                format!(
                    "Tool '{}' is disabled. Enable it with manage_tools before calling it.",
                    descriptor.name
                ),
                ErrorCode::ToolDisabled,
            );
        }

        let action = args.get(ACTION_KEY).and_then(Value::as_str);
        if !descriptor.offline.allows(action) && !self.selector.ensure_connected().await {
            warn!("Engine not connected; refusing {}", descriptor.name);
            return ToolResult::failure(
                format!("Cannot execute tool '{}': Unreal Engine is not connected.", descriptor.name),
                ErrorCode::NotConnected,
            );
        }

        let args = self
            .elicitation
            .complete(&descriptor, args, profile.supports_elicitation)
            .await;

        let validated = match self.validator.validate(&descriptor, args) {
            Ok(validated) => validated,
            Err(e) => return envelope_for(&e),
        };

        let handler = self.handlers.resolve(&descriptor.name);
        let outcome = AssertUnwindSafe(handler.handle(&validated, &descriptor))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(raw)) => normalize(&descriptor, raw),
            Ok(Err(e)) => {
                warn!("Tool {} failed: {}", descriptor.name, e);
                envelope_for(&e)
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!("Handler for {} panicked: {}", descriptor.name, reason);
                ToolResult::failure(
                    format!("Tool '{}' failed unexpectedly: {}", descriptor.name, reason),
                    ErrorCode::Internal,
                )
            }
        }
    }
}

fn envelope_for(error: &RelayError) -> ToolResult {
    ToolResult::failure(error.to_string(), error.code())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn failure_message(result: &ToolResult) -> String {
    result
        .structured_content
        .as_ref()
        .and_then(|v| v.get("error").or_else(|| v.get("message")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| result.text())
}

/// Success signal of a raw handler result. An explicit `success` field wins
/// over anything inferred from wrapped content.
pub fn infer_success(raw: &Value) -> bool {
    let object = match raw {
        Value::Object(object) => object,
        _ => return true,
    };
    if let Some(success) = object.get("success").and_then(Value::as_bool) {
        return success;
    }
    if let Some(is_error) = object.get("isError").and_then(Value::as_bool) {
        return !is_error;
    }
    match object.get("error") {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Coerce a handler's raw result into the canonical envelope
pub fn normalize(descriptor: &ToolDescriptor, raw: Value) -> ToolResult {
    let success = infer_success(&raw);
    let mut payload = match raw {
        Value::Object(object) => object,
        other => {
            let mut object = Map::new();
            object.insert("result".into(), other);
            object
        }
    };
    payload.insert("success".into(), Value::Bool(success));

    if !success {
        if !payload.get("message").map_or(false, Value::is_string) {
            let message = payload
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Tool '{}' reported a failure", descriptor.name));
            payload.insert("message".into(), Value::String(message));
        }
        if !payload.contains_key("errorCode") {
            if let Ok(code) = serde_json::to_value(ErrorCode::TransportFailure) {
                payload.insert("errorCode".into(), code);
            }
        }
    }

    ToolResult::from_payload(Value::Object(payload), success)
}
