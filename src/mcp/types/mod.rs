//! MCP types and structures
//!
//! Wire types for the JSON-RPC session plus the tool list and call shapes.

use crate::error::ErrorCode;
use crate::registry::ToolDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub mod capabilities;
pub mod elicitation;

pub use capabilities::{ClientCapabilities, ClientInfo, ElicitationCapability, InitializeParams};
pub use elicitation::*;

/// JSON-RPC error codes used by the session
pub mod rpc_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Advertised tool as sent in `tools/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    pub category: String,
    /// Never transmitted; kept so callers can see it was stripped
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none", default)]
    pub output_schema: Option<Value>,
}

impl Tool {
    /// Wire form of a descriptor, output schema stripped
    pub fn from_descriptor(descriptor: &ToolDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            input_schema: descriptor.input_schema.clone(),
            category: descriptor.category.to_string(),
            output_schema: None,
        }
    }
}

/// Tool list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolListResponse {
    pub tools: Vec<Tool>,
}

/// Resource entry as sent in `resources/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none", default)]
    pub mime_type: Option<String>,
}

/// One text content block of `resources/read`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceContent {
    pub uri: String,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none", default)]
    pub mime_type: Option<String>,
    pub text: String,
}

impl ResourceContent {
    /// JSON document rendered as pretty text
    pub fn json(uri: &str, value: &Value) -> Self {
        Self {
            uri: uri.to_string(),
            mime_type: Some("application/json".to_string()),
            text: serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
        }
    }
}

/// Tool call request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new<S: Into<String>>(name: S, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// MCP content item of a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

impl ToolContent {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> &str {
        match self {
            ToolContent::Text { text } => text,
        }
    }
}

/// Canonical tool call response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError")]
    pub is_error: bool,
    /// Machine-readable payload, mirrored into the text content
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none", default)]
    pub structured_content: Option<Value>,
}

impl ToolResult {
    /// Wrap a structured payload whose success has already been decided
    pub fn from_payload(payload: Value, success: bool) -> Self {
        let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
        Self {
            content: vec![ToolContent::text(text)],
            is_error: !success,
            structured_content: Some(payload),
        }
    }

    /// Failure envelope with a human-readable message and an error code
    pub fn failure<S: Into<String>>(message: S, code: ErrorCode) -> Self {
        let message = message.into();
        Self::from_payload(
            json!({
                "success": false,
                "message": message,
                "error": message,
                "errorCode": code,
            }),
            false,
        )
    }

    pub fn success(&self) -> bool {
        !self.is_error
    }

    /// Programmatic code of a failure, if any
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.structured_content
            .as_ref()
            .and_then(|v| v.get("errorCode"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(ToolContent::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// JSON-RPC request, also used for server-to-client requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub params: Option<Value>,
}

impl McpRequest {
    pub fn new<S: Into<String>>(id: Value, method: S, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.into(),
            params: Some(params),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
}

impl McpError {
    pub fn new<S: Into<String>>(code: i32, message: S) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(rpc_codes::METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params<S: Into<String>>(message: S) -> Self {
        Self::new(rpc_codes::INVALID_PARAMS, message)
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<McpError>,
}

impl McpResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: McpError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Zero-or-more-payload server notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpNotification {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub params: Option<Value>,
}

impl McpNotification {
    pub fn new<S: Into<String>>(method: S) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    /// Create a tools list changed notification
    pub fn tools_list_changed() -> Self {
        Self::new("notifications/tools/list_changed")
    }

    /// JSON-RPC framing of the notification
    pub fn to_json_rpc(&self) -> Value {
        let mut message = json!({ "jsonrpc": "2.0", "method": self.method });
        if let (Some(params), Some(obj)) = (&self.params, message.as_object_mut()) {
            obj.insert("params".to_string(), params.clone());
        }
        message
    }
}
