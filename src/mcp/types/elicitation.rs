//! Elicitation types
//!
//! `ElicitationRequest` is the per-invocation value built by the coordinator.
//! `ElicitationResponse` is what the client sends back to `elicitation/create`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Restricted schema covering only the primitive fields being asked for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElicitationSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
}

impl ElicitationSchema {
    pub fn new(properties: Map<String, Value>, required: Vec<String>) -> Self {
        Self {
            schema_type: "object".to_string(),
            properties,
            required,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Structured "not ok" marker returned when elicitation does not produce values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElicitationFallback {
    pub ok: bool,
    pub error: String,
}

impl Default for ElicitationFallback {
    fn default() -> Self {
        Self {
            ok: false,
            error: "missing-params".to_string(),
        }
    }
}

/// One interactive request for missing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ElicitationRequest {
    pub prompt: String,
    pub schema: ElicitationSchema,
    pub timeout: Duration,
    pub fallback: ElicitationFallback,
}

impl ElicitationRequest {
    /// Conceptual sub-protocol form: `{prompt, schema, timeoutMs}`
    pub fn to_value(&self) -> Value {
        json!({
            "prompt": self.prompt,
            "schema": self.schema,
            "timeoutMs": self.timeout.as_millis() as u64,
        })
    }

    /// Params of the MCP `elicitation/create` request
    pub fn create_params(&self) -> Value {
        json!({
            "message": self.prompt,
            "requestedSchema": self.schema,
        })
    }
}

/// Outcome of an interactive request: `{ok, value?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElicitationResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl ElicitationResult {
    pub fn accepted(value: Map<String, Value>) -> Self {
        Self {
            ok: true,
            value: Some(value),
            error: None,
        }
    }

    pub fn from_fallback(fallback: &ElicitationFallback) -> Self {
        Self {
            ok: fallback.ok,
            value: None,
            error: Some(fallback.error.clone()),
        }
    }
}

/// Action the user took on an elicitation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitationAction {
    Accept,
    Decline,
    Cancel,
}

/// Client response to `elicitation/create`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElicitationResponse {
    pub action: ElicitationAction,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<Map<String, Value>>,
}

impl ElicitationResponse {
    /// Map the client's action onto `{ok, value}`
    pub fn into_result(self, fallback: &ElicitationFallback) -> ElicitationResult {
        match (self.action, self.content) {
            (ElicitationAction::Accept, Some(content)) => ElicitationResult::accepted(content),
            (ElicitationAction::Accept, None) => ElicitationResult::accepted(Map::new()),
            _ => ElicitationResult::from_fallback(fallback),
        }
    }
}
