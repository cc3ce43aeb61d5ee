//! Transport types shared by the selector and its transports

use crate::error::{ErrorCode, RelayError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

/// Execution channels into the automation runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Primary bidirectional request/response channel
    Bridge,
    /// Direct script execution
    Python,
    /// Safety-filtered textual command channel
    Console,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Bridge => "bridge",
            TransportKind::Python => "python",
            TransportKind::Console => "console",
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, TransportKind::Bridge)
    }

    /// Parse an explicit transport request. `None` means implicit selection.
    pub fn parse_requested(requested: Option<&str>) -> Result<Option<TransportKind>> {
        match requested.map(str::trim) {
            None | Some("") => Ok(None),
            Some(name) if name.eq_ignore_ascii_case("auto") || name.eq_ignore_ascii_case("default") => Ok(None),
            Some(name) => name.parse().map(Some),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "bridge" | "automation_bridge" | "websocket" => Ok(TransportKind::Bridge),
            "python" | "python_script" | "remote_python" => Ok(TransportKind::Python),
            "console" | "console_command" | "remote_console" => Ok(TransportKind::Console),
            _ => Err(RelayError::unsupported_transport(s.trim())),
        }
    }
}

/// Per-call transport choice, computed fresh on every call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportDecision {
    pub primary: TransportKind,
    /// Only implicit selection permits fallback
    pub allow_fallback: bool,
    /// Set when the primary is already known to be unusable
    pub fallback_reason: Option<String>,
}

impl TransportDecision {
    pub fn explicit(kind: TransportKind) -> Self {
        Self {
            primary: kind,
            allow_fallback: false,
            fallback_reason: None,
        }
    }

    pub fn implicit(fallback_reason: Option<String>) -> Self {
        Self {
            primary: TransportKind::Bridge,
            allow_fallback: true,
            fallback_reason,
        }
    }
}

/// Request sent to the automation runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportRequest {
    pub action: String,
    pub payload: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timeout_ms: Option<u64>,
}

impl TransportRequest {
    pub fn new<S: Into<String>>(action: S, payload: Map<String, Value>) -> Self {
        Self {
            action: action.into(),
            payload,
            timeout_ms: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    fn payload_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.payload.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    /// Script for the direct script channel
    pub fn script(&self) -> Option<&str> {
        self.payload_str(&["script", "pythonScript", "python"])
    }

    /// Console command equivalent of this request, if one exists
    pub fn console_command(&self) -> Option<String> {
        if let Some(command) = self.payload_str(&["command"]) {
            return Some(command.to_string());
        }
        match self.action.as_str() {
            "show_fps" => Some("stat fps".to_string()),
            "profile" => Some(format!("stat {}", self.payload_str(&["profileType"]).unwrap_or("unit"))),
            "set_quality" => {
                let level = self.payload.get("level").and_then(Value::as_i64)?;
                Some(format!("sg.ViewDistanceQuality {}", level.clamp(0, 4)))
            }
            "set_cvar" => {
                let name = self.payload_str(&["name"])?;
                let value = match self.payload.get("value")? {
                    Value::String(s) => s.clone(),
                    Value::Bool(b) => if *b { "1".to_string() } else { "0".to_string() },
                    other => other.to_string(),
                };
                Some(format!("{} {}", name, value))
            }
            _ => None,
        }
    }
}

/// Raw response of a single transport round trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportResponse {
    pub request_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<Value>,
}

/// Normalized outcome of `TransportSelector::execute`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Transport that produced the outcome; `None` when nothing was attempted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl TransportEnvelope {
    pub fn from_response(response: TransportResponse, transport: TransportKind, warnings: Vec<String>) -> Self {
        let error_code = if response.success {
            None
        } else {
            Some(ErrorCode::TransportFailure)
        };
        Self {
            success: response.success,
            message: response.message,
            error: response.error,
            error_code,
            result: response.result,
            request_id: Some(response.request_id),
            transport: Some(transport),
            warnings,
        }
    }

    pub fn failure(error: &RelayError, transport: Option<TransportKind>, warnings: Vec<String>) -> Self {
        Self {
            success: false,
            message: Some(error.to_string()),
            error: Some(error.to_string()),
            error_code: Some(error.code()),
            result: None,
            request_id: None,
            transport,
            warnings,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            json!({ "success": self.success, "error": self.error })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_names_select_nothing() {
        assert_eq!(TransportKind::parse_requested(None).unwrap(), None);
        assert_eq!(TransportKind::parse_requested(Some("  ")).unwrap(), None);
        assert_eq!(TransportKind::parse_requested(Some("AUTO")).unwrap(), None);
        assert_eq!(TransportKind::parse_requested(Some("default")).unwrap(), None);
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!(TransportKind::parse_requested(Some("automation_bridge")).unwrap(), Some(TransportKind::Bridge));
        assert_eq!(TransportKind::parse_requested(Some("remote_python")).unwrap(), Some(TransportKind::Python));
        assert_eq!(TransportKind::parse_requested(Some("Console")).unwrap(), Some(TransportKind::Console));
    }

    #[test]
    fn unknown_name_is_unsupported() {
        let err = TransportKind::parse_requested(Some("carrier_pigeon")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedTransport);
    }

    #[test]
    fn console_equivalents() {
        let mut payload = Map::new();
        payload.insert("name".into(), json!("r.VSync"));
        payload.insert("value".into(), json!(false));
        assert_eq!(
            TransportRequest::new("set_cvar", payload).console_command().as_deref(),
            Some("r.VSync 0")
        );
        assert_eq!(
            TransportRequest::new("show_fps", Map::new()).console_command().as_deref(),
            Some("stat fps")
        );
        assert_eq!(TransportRequest::new("spawn", Map::new()).console_command(), None);
    }
}
