//! Error types and handling for the tool relay

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Programmatic error code carried back to callers as `errorCode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Validation,
    NotFound,
    ProtectedTools,
    ProtectedCategory,
    NotConnected,
    UnsupportedTransport,
    TransportFailure,
    Timeout,
    CommandBlocked,
    Internal,
    ToolDisabled,
    MissingTools,
    MissingCategory,
    InvalidCategory,
    UnknownAction,
    Protocol,
    BuildFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ProtectedTools => "PROTECTED_TOOLS",
            ErrorCode::ProtectedCategory => "PROTECTED_CATEGORY",
            ErrorCode::NotConnected => "NOT_CONNECTED",
            ErrorCode::UnsupportedTransport => "UNSUPPORTED_TRANSPORT",
            ErrorCode::TransportFailure => "TRANSPORT_FAILURE",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::CommandBlocked => "COMMAND_BLOCKED",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::ToolDisabled => "TOOL_DISABLED",
            ErrorCode::MissingTools => "MISSING_TOOLS",
            ErrorCode::MissingCategory => "MISSING_CATEGORY",
            ErrorCode::InvalidCategory => "INVALID_CATEGORY",
            ErrorCode::UnknownAction => "UNKNOWN_ACTION",
            ErrorCode::Protocol => "PROTOCOL",
            ErrorCode::BuildFailed => "BUILD_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the tool relay
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Missing or invalid arguments
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Unknown tool or category
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Attempted disable of protected entries
    #[error("Protected: {message}")]
    Protected { message: String },

    /// The automation runtime is not reachable
    #[error("Not connected: {message}")]
    NotConnected { message: String },

    /// An explicit transport name that is not supported
    #[error("Unsupported transport: {transport}")]
    UnsupportedTransport { transport: String },

    /// Transport round trip failed
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Transport or elicitation deadline elapsed
    #[error("Timeout: {message}")]
    Timeout { message: String },

    /// Local safety rejection of a console command
    #[error("Command blocked: {message}")]
    CommandBlocked { message: String },

    /// Tool execution errors
    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    /// MCP protocol errors
    #[error("MCP protocol error: {message}")]
    Mcp { message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RelayError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a protected-entry error
    pub fn protected<S: Into<String>>(message: S) -> Self {
        Self::Protected {
            message: message.into(),
        }
    }

    /// Create a not-connected error
    pub fn not_connected<S: Into<String>>(message: S) -> Self {
        Self::NotConnected {
            message: message.into(),
        }
    }

    /// Create an unsupported-transport error
    pub fn unsupported_transport<S: Into<String>>(transport: S) -> Self {
        Self::UnsupportedTransport {
            transport: transport.into(),
        }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a command-blocked error
    pub fn command_blocked<S: Into<String>>(message: S) -> Self {
        Self::CommandBlocked {
            message: message.into(),
        }
    }

    /// Create a tool execution error
    pub fn tool_execution<S: Into<String>>(tool_name: S, message: S) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Create an MCP protocol error
    pub fn mcp<S: Into<String>>(message: S) -> Self {
        Self::Mcp {
            message: message.into(),
        }
    }

    /// Check if this error is retryable. Only retryable errors trigger a transport fallback.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::Transport { .. }
                | RelayError::Timeout { .. }
                | RelayError::WebSocket(_)
                | RelayError::Http(_)
                | RelayError::Io(_)
        )
    }

    /// Programmatic code for the canonical response envelope
    pub fn code(&self) -> ErrorCode {
        match self {
            RelayError::Config { .. } => ErrorCode::Internal,
            RelayError::Validation { .. } => ErrorCode::Validation,
            RelayError::NotFound { .. } => ErrorCode::NotFound,
            RelayError::Protected { .. } => ErrorCode::ProtectedTools,
            RelayError::NotConnected { .. } => ErrorCode::NotConnected,
            RelayError::UnsupportedTransport { .. } => ErrorCode::UnsupportedTransport,
            RelayError::Transport { .. }
            | RelayError::WebSocket(_)
            | RelayError::Http(_)
            | RelayError::Io(_) => ErrorCode::TransportFailure,
            RelayError::Timeout { .. } => ErrorCode::Timeout,
            RelayError::CommandBlocked { .. } => ErrorCode::CommandBlocked,
            RelayError::Mcp { .. } => ErrorCode::Protocol,
            RelayError::ToolExecution { .. }
            | RelayError::Serde(_)
            | RelayError::Yaml(_)
            | RelayError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Get the error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            RelayError::Config { .. } => "config",
            RelayError::Validation { .. } => "validation",
            RelayError::NotFound { .. } => "not_found",
            RelayError::Protected { .. } => "protected",
            RelayError::NotConnected { .. } => "connection",
            RelayError::UnsupportedTransport { .. } => "transport",
            RelayError::Transport { .. } => "transport",
            RelayError::Timeout { .. } => "timeout",
            RelayError::CommandBlocked { .. } => "security",
            RelayError::ToolExecution { .. } => "tool_execution",
            RelayError::Mcp { .. } => "mcp",
            RelayError::Io(_) => "io",
            RelayError::Serde(_) => "serialization",
            RelayError::Yaml(_) => "yaml",
            RelayError::Http(_) => "http",
            RelayError::WebSocket(_) => "websocket",
            RelayError::Internal(_) => "internal",
        }
    }
}

impl Clone for RelayError {
    fn clone(&self) -> Self {
        match self {
            RelayError::Config { message } => RelayError::config(message.clone()),
            RelayError::Validation { message } => RelayError::validation(message.clone()),
            RelayError::NotFound { message } => RelayError::not_found(message.clone()),
            RelayError::Protected { message } => RelayError::protected(message.clone()),
            RelayError::NotConnected { message } => RelayError::not_connected(message.clone()),
            RelayError::UnsupportedTransport { transport } => {
                RelayError::unsupported_transport(transport.clone())
            }
            RelayError::Transport { message } => RelayError::transport(message.clone()),
            RelayError::Timeout { message } => RelayError::timeout(message.clone()),
            RelayError::CommandBlocked { message } => RelayError::command_blocked(message.clone()),
            RelayError::ToolExecution { tool_name, message } => RelayError::ToolExecution {
                tool_name: tool_name.clone(),
                message: message.clone(),
            },
            RelayError::Mcp { message } => RelayError::mcp(message.clone()),

            // Non-cloneable sources keep their text and their retry class
            RelayError::Io(e) => RelayError::transport(format!("IO error: {}", e)),
            RelayError::Serde(e) => RelayError::Internal(anyhow::anyhow!("Serialization error: {}", e)),
            RelayError::Yaml(e) => RelayError::config(format!("YAML error: {}", e)),
            RelayError::Http(e) => RelayError::transport(format!("HTTP error: {}", e)),
            RelayError::WebSocket(e) => RelayError::transport(format!("WebSocket error: {}", e)),
            RelayError::Internal(e) => RelayError::Internal(anyhow::anyhow!("{}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_retryable() {
        assert!(RelayError::transport("socket closed").is_retryable());
        assert!(RelayError::timeout("no response").is_retryable());
        assert!(!RelayError::validation("missing action").is_retryable());
        assert!(!RelayError::command_blocked("quit").is_retryable());
    }

    #[test]
    fn codes_serialize_screaming_snake() {
        let json = serde_json::to_value(ErrorCode::ProtectedCategory).unwrap();
        assert_eq!(json, "PROTECTED_CATEGORY");
        assert_eq!(RelayError::unsupported_transport("carrier-pigeon").code(), ErrorCode::UnsupportedTransport);
        assert_eq!(ErrorCode::NotConnected.to_string(), "NOT_CONNECTED");
    }

    #[test]
    fn clone_keeps_retry_class() {
        let err = RelayError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe"));
        assert!(err.clone().is_retryable());
    }
}
