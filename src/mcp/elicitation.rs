//! Elicitation coordinator
//!
//! Detects missing required parameters of an invocation and, when the client
//! supports it, asks for just those fields with a bounded timeout. The wait
//! suspends only the issuing invocation.

use crate::error::{RelayError, Result};
use crate::mcp::types::elicitation::*;
use crate::registry::{FieldSpec, FieldType, ToolDescriptor};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default wait for an elicitation response
pub const DEFAULT_ELICITATION_TIMEOUT_MS: u64 = 60_000;

/// Schema keywords carried over into the restricted schema
const COPIED_KEYWORDS: &[&str] = &[
    "type",
    "title",
    "description",
    "enum",
    "enumNames",
    "minimum",
    "maximum",
    "minLength",
    "maxLength",
    "pattern",
    "format",
    "default",
];

/// Client-facing side of an elicitation round trip
#[async_trait]
pub trait Elicitor: Send + Sync {
    /// Send one interactive request and wait for the client's answer
    async fn elicit(&self, request: &ElicitationRequest) -> Result<ElicitationResult>;
}

/// A value counts as missing when absent, null, or a blank string
pub fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Required fields of `descriptor` that `args` does not satisfy, in declared order
pub fn missing_fields<'a>(descriptor: &'a ToolDescriptor, args: &Map<String, Value>) -> Vec<&'a FieldSpec> {
    descriptor
        .required_fields
        .iter()
        .filter(|field| is_missing(args.get(&field.name)))
        .collect()
}

fn restricted_property(field: &FieldSpec) -> Value {
    let mut property = Map::new();
    if let Some(declared) = field.property.as_object() {
        for keyword in COPIED_KEYWORDS {
            if let Some(value) = declared.get(*keyword) {
                property.insert((*keyword).to_string(), value.clone());
            }
        }
    }
    if !property.contains_key("type") {
        if let FieldType::Enum(_) = field.field_type {
            property.insert("type".to_string(), Value::String("string".to_string()));
        }
    }
    Value::Object(property)
}

/// Coordinates interactive completion of missing parameters for one session
pub struct ElicitationCoordinator {
    elicitor: Option<Arc<dyn Elicitor>>,
    timeout: Duration,
    fallback: ElicitationFallback,
    /// Cleared for the rest of the session once the client rejects the method
    supported: AtomicBool,
}

impl ElicitationCoordinator {
    pub fn new(elicitor: Arc<dyn Elicitor>, timeout: Duration) -> Self {
        Self {
            elicitor: Some(elicitor),
            timeout,
            fallback: ElicitationFallback::default(),
            supported: AtomicBool::new(true),
        }
    }

    /// A coordinator that never issues requests
    pub fn disabled() -> Self {
        Self {
            elicitor: None,
            timeout: Duration::from_millis(DEFAULT_ELICITATION_TIMEOUT_MS),
            fallback: ElicitationFallback::default(),
            supported: AtomicBool::new(false),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_supported(&self) -> bool {
        self.elicitor.is_some() && self.supported.load(Ordering::Relaxed)
    }

    /// Build the request for the elicitable subset of missing fields.
    /// `None` when nothing is missing or nothing missing is primitive.
    pub fn plan(&self, descriptor: &ToolDescriptor, args: &Map<String, Value>) -> Option<ElicitationRequest> {
        let missing = missing_fields(descriptor, args);
        if missing.is_empty() {
            return None;
        }

        let elicitable: Vec<&FieldSpec> = missing
            .into_iter()
            .filter(|field| field.field_type.is_primitive())
            .collect();
        if elicitable.is_empty() {
            debug!(
                "No primitive fields to elicit for {}; leaving validation to report them",
                descriptor.name
            );
            return None;
        }

        let mut properties = Map::new();
        let mut required = Vec::with_capacity(elicitable.len());
        for field in elicitable {
            properties.insert(field.name.clone(), restricted_property(field));
            required.push(field.name.clone());
        }

        Some(ElicitationRequest {
            prompt: format!("Provide missing parameters for {}", descriptor.name),
            schema: ElicitationSchema::new(properties, required),
            timeout: self.timeout,
            fallback: self.fallback.clone(),
        })
    }

    /// Fill missing required parameters of `args` when the client can be asked.
    /// Never fails: on timeout, refusal, or error the original arguments come back.
    pub async fn complete(
        &self,
        descriptor: &ToolDescriptor,
        args: Map<String, Value>,
        client_supports_elicitation: bool,
    ) -> Map<String, Value> {
        if !client_supports_elicitation || !self.is_supported() {
            return args;
        }
        let elicitor = match &self.elicitor {
            Some(elicitor) => Arc::clone(elicitor),
            None => return args,
        };
        let request = match self.plan(descriptor, &args) {
            Some(request) => request,
            None => return args,
        };

        debug!(
            "Eliciting {:?} for {} (timeout {:?})",
            request.schema.required, descriptor.name, request.timeout
        );

        let result = match tokio::time::timeout(request.timeout, elicitor.elicit(&request)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                if Self::is_method_not_found(&e) {
                    warn!("Client does not implement elicitation; disabling it for this session");
                    self.supported.store(false, Ordering::Relaxed);
                } else {
                    warn!("Elicitation for {} failed: {}", descriptor.name, e);
                }
                ElicitationResult::from_fallback(&request.fallback)
            }
            Err(_) => {
                warn!(
                    "Elicitation for {} timed out after {:?}",
                    descriptor.name, request.timeout
                );
                ElicitationResult::from_fallback(&request.fallback)
            }
        };

        match result {
            ElicitationResult { ok: true, value: Some(value), .. } => {
                let merged = Self::merge(args, value, &request.schema);
                info!("Elicitation completed parameters for {}", descriptor.name);
                merged
            }
            other => {
                debug!(
                    "Elicitation for {} produced no values ({:?})",
                    descriptor.name, other.error
                );
                args
            }
        }
    }

    fn merge(
        mut args: Map<String, Value>,
        provided: Map<String, Value>,
        schema: &ElicitationSchema,
    ) -> Map<String, Value> {
        for (key, value) in provided {
            if !schema.properties.contains_key(&key) {
                continue;
            }
            let value = match value {
                Value::String(s) => Value::String(s.trim().to_string()),
                other => other,
            };
            if is_missing(Some(&value)) {
                continue;
            }
            args.insert(key, value);
        }
        args
    }

    fn is_method_not_found(error: &RelayError) -> bool {
        match error {
            RelayError::Mcp { message } => {
                message.contains("-32601") || message.to_lowercase().contains("method not found")
            }
            _ => false,
        }
    }
}
