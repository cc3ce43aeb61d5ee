//! Argument validation boundary
//!
//! Raw argument maps are checked against the tool's input schema and its
//! required fields once, at the router boundary. Everything past this point
//! works with a `ValidatedCall`.

use crate::error::{RelayError, Result};
use crate::mcp::elicitation::is_missing;
use crate::registry::ToolDescriptor;
use jsonschema::JSONSchema;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Argument keys the relay consumes itself
pub const ACTION_KEY: &str = "action";
pub const TRANSPORT_KEY: &str = "transport";
pub const TIMEOUT_KEY: &str = "timeoutMs";

/// Tool arguments with the routing keys removed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments(Map<String, Value>);

impl ToolArguments {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for ToolArguments {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A tool call that passed schema and required-field validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCall {
    pub tool_name: String,
    pub action: Option<String>,
    pub transport: Option<String>,
    pub timeout_ms: Option<u64>,
    pub arguments: ToolArguments,
}

impl ValidatedCall {
    fn from_checked(tool_name: &str, mut args: Map<String, Value>) -> Self {
        let action = args
            .remove(ACTION_KEY)
            .and_then(|v| v.as_str().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty());
        let transport = args
            .remove(TRANSPORT_KEY)
            .and_then(|v| v.as_str().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty());
        let timeout_ms = args
            .remove(TIMEOUT_KEY)
            .and_then(|v| v.as_u64().or_else(|| v.as_f64().filter(|f| *f > 0.0).map(|f| f as u64)))
            .filter(|ms| *ms > 0);

        Self {
            tool_name: tool_name.to_string(),
            action,
            transport,
            timeout_ms,
            arguments: ToolArguments(args),
        }
    }
}

/// Validates arguments, caching compiled schemas per tool
#[derive(Default)]
pub struct ArgumentValidator {
    compiled: Mutex<HashMap<String, Arc<JSONSchema>>>,
}

impl ArgumentValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn schema_for(&self, descriptor: &ToolDescriptor) -> Result<Arc<JSONSchema>> {
        let mut compiled = self.compiled.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(schema) = compiled.get(&descriptor.name) {
            return Ok(Arc::clone(schema));
        }
        let schema = JSONSchema::compile(&descriptor.input_schema).map_err(|e| {
            RelayError::validation(format!("Invalid input schema for tool '{}': {}", descriptor.name, e))
        })?;
        let schema = Arc::new(schema);
        compiled.insert(descriptor.name.clone(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Check `args` against `descriptor` and split off the routing keys
    pub fn validate(&self, descriptor: &ToolDescriptor, args: Map<String, Value>) -> Result<ValidatedCall> {
        let missing: Vec<&str> = descriptor
            .required_fields
            .iter()
            .filter(|field| is_missing(args.get(&field.name)))
            .map(|field| field.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(RelayError::validation(format!(
                "Missing required parameter(s) for '{}': {}",
                descriptor.name,
                missing.join(", ")
            )));
        }

        let schema = self.schema_for(descriptor)?;
        let instance = Value::Object(args);
        if let Err(errors) = schema.validate(&instance) {
            let messages: Vec<String> = errors.map(|e| format!("{} (at '{}')", e, e.instance_path)).collect();
            return Err(RelayError::validation(format!(
                "Invalid arguments for '{}': {}",
                descriptor.name,
                messages.join("; ")
            )));
        }

        let args = match instance {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Ok(ValidatedCall::from_checked(&descriptor.name, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::registry::ToolCategory;
    use serde_json::json;

    fn level_tool() -> ToolDescriptor {
        ToolDescriptor::new(
            "manage_level",
            "Levels",
            ToolCategory::Core,
            json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["load", "save"]},
                    "levelPath": {"type": "string"},
                    "timeoutMs": {"type": "number"},
                    "transport": {"type": "string"},
                    "streaming": {"type": "boolean"}
                },
                "required": ["action", "levelPath"]
            }),
        )
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn splits_routing_keys() {
        let call = ArgumentValidator::new()
            .validate(
                &level_tool(),
                args(json!({"action": "load", "levelPath": "/Game/Main", "timeoutMs": 1500, "transport": "python"})),
            )
            .unwrap();
        assert_eq!(call.action.as_deref(), Some("load"));
        assert_eq!(call.transport.as_deref(), Some("python"));
        assert_eq!(call.timeout_ms, Some(1500));
        assert_eq!(call.arguments.get_str("levelPath"), Some("/Game/Main"));
        assert!(call.arguments.get("action").is_none());
    }

    #[test]
    fn blank_required_field_names_the_field() {
        let err = ArgumentValidator::new()
            .validate(&level_tool(), args(json!({"action": "load", "levelPath": "  "})))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        assert!(err.to_string().contains("levelPath"));
    }

    #[test]
    fn schema_violations_are_validation_errors() {
        let validator = ArgumentValidator::new();
        let err = validator
            .validate(&level_tool(), args(json!({"action": "explode", "levelPath": "/Game/Main"})))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);

        let err = validator
            .validate(
                &level_tool(),
                args(json!({"action": "load", "levelPath": "/Game/Main", "streaming": "yes"})),
            )
            .unwrap_err();
        assert!(err.to_string().contains("streaming"));
    }
}
