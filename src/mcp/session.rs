//! Per-connection client profile
//!
//! Derived once from the `initialize` handshake and never changed afterwards.

use crate::mcp::types::{ClientCapabilities, InitializeParams};
use serde::Serialize;
use tracing::info;

/// Facts about the connected client that shape discovery and elicitation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientProfile {
    pub client_name: Option<String>,
    /// Client reacts to list-changed notifications
    pub supports_dynamic_discovery: bool,
    /// Client implements `elicitation/create`
    pub supports_elicitation: bool,
}

impl ClientProfile {
    /// Profile for a client that never identified itself
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Derive the profile from the client name and advertised capabilities.
    /// A client supports dynamic discovery when its name contains one of
    /// `dynamic_clients`, compared case-insensitively.
    pub fn derive(
        client_name: Option<&str>,
        capabilities: &ClientCapabilities,
        dynamic_clients: &[String],
    ) -> Self {
        let supports_dynamic_discovery = client_name
            .map(|name| {
                let name = name.to_lowercase();
                dynamic_clients
                    .iter()
                    .filter(|id| !id.trim().is_empty())
                    .any(|id| name.contains(&id.trim().to_lowercase()))
            })
            .unwrap_or(false);

        let profile = Self {
            client_name: client_name.map(str::to_string),
            supports_dynamic_discovery,
            supports_elicitation: capabilities.supports_elicitation(),
        };
        info!(
            "Client profile: name={:?} dynamic_discovery={} elicitation={}",
            profile.client_name, profile.supports_dynamic_discovery, profile.supports_elicitation
        );
        profile
    }

    pub fn from_initialize(params: &InitializeParams, dynamic_clients: &[String]) -> Self {
        Self::derive(
            params.client_info.as_ref().map(|c| c.name.as_str()),
            &params.capabilities,
            dynamic_clients,
        )
    }
}
