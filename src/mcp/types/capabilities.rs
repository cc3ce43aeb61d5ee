//! MCP client capability types reported in `initialize`

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client capabilities as reported in the MCP initialize request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    /// Elicitation capability - client can handle `elicitation/create`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<ElicitationCapability>,

    /// Anything else the client advertises
    #[serde(flatten)]
    pub additional: serde_json::Map<String, Value>,
}

impl ClientCapabilities {
    pub fn supports_elicitation(&self) -> bool {
        self.elicitation.is_some()
    }
}

/// Elicitation capability details
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElicitationCapability {
    #[serde(flatten)]
    pub additional: serde_json::Map<String, Value>,
}

/// Client identification sent with `initialize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Parameters of the MCP `initialize` request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: ClientCapabilities,
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}
