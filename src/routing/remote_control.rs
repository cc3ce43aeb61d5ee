//! Secondary transports over the engine's Remote Control HTTP API

use crate::error::{RelayError, Result};
use crate::routing::transport::AutomationTransport;
use crate::routing::types::{TransportKind, TransportRequest, TransportResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

pub const PYTHON_LIBRARY: &str = "/Script/PythonScriptPlugin.Default__PythonScriptLibrary";
pub const SYSTEM_LIBRARY: &str = "/Script/Engine.Default__KismetSystemLibrary";

#[derive(Debug, Clone)]
pub struct RemoteControlConfig {
    pub base_url: String,
    pub enabled: bool,
    /// Timeout of the connectivity ping
    pub ping_timeout: Duration,
}

impl Default for RemoteControlConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:30010".to_string(),
            enabled: true,
            ping_timeout: Duration::from_millis(2_000),
        }
    }
}

/// HTTP client shared by the script and console channels
pub struct RemoteControlClient {
    client: Client,
    config: RemoteControlConfig,
}

impl RemoteControlClient {
    pub fn new(config: RemoteControlConfig) -> Result<Self> {
        let client = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| RelayError::config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RemoteControlConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Lightweight reachability check against `/remote/info`
    pub async fn ping(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        match self
            .client
            .get(self.endpoint("/remote/info"))
            .timeout(self.config.ping_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Remote Control ping failed: {}", e);
                false
            }
        }
    }

    /// Invoke `function_name` on `object_path` through `/remote/object/call`
    pub async fn call_function(
        &self,
        object_path: &str,
        function_name: &str,
        parameters: Value,
        timeout: Duration,
    ) -> Result<TransportResponse> {
        if !self.config.enabled {
            return Err(RelayError::not_connected("Remote Control API is disabled"));
        }

        let body = json!({
            "objectPath": object_path,
            "functionName": function_name,
            "parameters": parameters,
            "generateTransaction": false,
        });

        let response = self
            .client
            .put(self.endpoint("/remote/object/call"))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::timeout(format!("Remote Control call {} timed out", function_name))
                } else {
                    RelayError::from(e)
                }
            })?;

        let status = response.status();
        let text = response.text().await?;
        let result: Option<Value> = if text.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&text).unwrap_or(Value::String(text.clone())))
        };

        let request_id = Uuid::new_v4().to_string();
        if !status.is_success() {
            warn!("Remote Control call {} failed with HTTP {}", function_name, status);
            let error = result
                .as_ref()
                .and_then(|v| v.get("errorMessage"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Ok(TransportResponse {
                request_id,
                success: false,
                message: None,
                error: Some(error),
                result,
            });
        }

        let reported_failure = result
            .as_ref()
            .and_then(|v| v.get("ReturnValue"))
            .map_or(false, |v| v == &Value::Bool(false));

        Ok(TransportResponse {
            request_id,
            success: !reported_failure,
            message: None,
            error: reported_failure.then(|| format!("{} reported failure", function_name)),
            result,
        })
    }
}

/// One Remote Control channel: script execution or console commands
pub struct RemoteControlTransport {
    client: Arc<RemoteControlClient>,
    kind: TransportKind,
}

impl RemoteControlTransport {
    pub fn python(client: Arc<RemoteControlClient>) -> Self {
        Self {
            client,
            kind: TransportKind::Python,
        }
    }

    pub fn console(client: Arc<RemoteControlClient>) -> Self {
        Self {
            client,
            kind: TransportKind::Console,
        }
    }

    pub fn python_parameters(script: &str) -> Value {
        let mode = if script.contains('\n') {
            "ExecuteFile"
        } else {
            "ExecuteStatement"
        };
        json!({
            "PythonCommand": script,
            "ExecutionMode": mode,
            "FileExecutionScope": "Private",
        })
    }

    pub fn console_parameters(command: &str) -> Value {
        json!({
            "WorldContextObject": null,
            "Command": command,
            "SpecificPlayer": null,
        })
    }
}

#[async_trait]
impl AutomationTransport for RemoteControlTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn is_connected(&self) -> bool {
        self.client.ping().await
    }

    async fn send(&self, request: &TransportRequest, timeout: Duration) -> Result<TransportResponse> {
        match self.kind {
            TransportKind::Python => {
                let script = request.script().ok_or_else(|| {
                    RelayError::validation(format!(
                        "Action '{}' has no script equivalent; provide a 'script' argument",
                        request.action
                    ))
                })?;
                self.client
                    .call_function(PYTHON_LIBRARY, "ExecutePythonCommandEx", Self::python_parameters(script), timeout)
                    .await
            }
            TransportKind::Console => {
                let command = request.console_command().ok_or_else(|| {
                    RelayError::validation(format!(
                        "Action '{}' has no console equivalent; provide a 'command' argument",
                        request.action
                    ))
                })?;
                self.client
                    .call_function(SYSTEM_LIBRARY, "ExecuteConsoleCommand", Self::console_parameters(&command), timeout)
                    .await
            }
            TransportKind::Bridge => Err(RelayError::unsupported_transport(self.kind.as_str())),
        }
    }
}
