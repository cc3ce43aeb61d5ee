//! Local handler for `manage_pipeline`
//!
//! `run_ubt` launches UnrealBuildTool on this machine, and the two status
//! actions answer from the registry and health monitor, so none of them
//! needs the engine. Anything else goes to the engine.

use crate::error::{ErrorCode, RelayError, Result};
use crate::metrics::HealthMonitor;
use crate::registry::{CapabilityRegistry, ToolDescriptor};
use crate::routing::{AutomationForwarder, ToolHandler, TransportSelector, ValidatedCall};
use crate::services::project::{find_uproject, validate_project_path, ProjectConfig};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, warn};

/// Tail kept from each output stream of a build
pub const MAX_BUILD_OUTPUT: usize = 20 * 1024;

const FORBIDDEN_SEQUENCES: &[&str] = &["\n", "\r", ";", "|", "`", "&&", "||", ">", "<"];

pub struct PipelineHandler {
    registry: Arc<CapabilityRegistry>,
    health: Arc<HealthMonitor>,
    selector: Arc<TransportSelector>,
    forwarder: AutomationForwarder,
    project: ProjectConfig,
}

impl PipelineHandler {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        health: Arc<HealthMonitor>,
        selector: Arc<TransportSelector>,
        project: ProjectConfig,
    ) -> Self {
        Self {
            registry,
            health,
            forwarder: AutomationForwarder::new(selector.clone()),
            selector,
            project,
        }
    }

    async fn status(&self) -> Value {
        json!({
            "success": true,
            "bridgeConnected": self.selector.bridge_connected().await,
            "registry": self.registry.get_status(),
            "health": self.health.snapshot(),
        })
    }

    async fn run_build(&self, call: &ValidatedCall) -> Result<Value> {
        let target = call
            .arguments
            .get_str("target")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RelayError::validation("Target is required for run_ubt"))?;
        let platform = non_empty(call.arguments.get_str("platform")).unwrap_or("Win64");
        let configuration = non_empty(call.arguments.get_str("configuration")).unwrap_or("Development");
        let extra = call.arguments.get_str("arguments").unwrap_or_default();
        check_build_arguments(extra)?;

        let project = match (&self.project.project_path, call.arguments.get_str("projectPath")) {
            (Some(configured), _) => configured.clone(),
            (None, Some(requested)) => validate_project_path(requested)?,
            (None, None) => {
                return Err(RelayError::validation(
                    "UE_PROJECT_PATH is not set and no projectPath argument was provided",
                ))
            }
        };
        let uproject = find_uproject(&project)?;

        let mut args = vec![
            target.to_string(),
            platform.to_string(),
            configuration.to_string(),
            format!("-Project=\"{}\"", uproject.display()),
        ];
        args.extend(tokenize_arguments(extra));

        let tool = self.project.build_tool();
        self.spawn_build(&tool, &args).await
    }

    async fn spawn_build(&self, tool: &Path, args: &[String]) -> Result<Value> {
        let command_line = render_command(tool, args);
        info!("Running {}", command_line);

        let mut command = Command::new(tool);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);

        let output = match tokio::time::timeout(self.project.build_timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Failed to spawn UnrealBuildTool: {}", e);
                return Ok(json!({
                    "success": false,
                    "error": format!("Failed to spawn UnrealBuildTool: {}", e),
                    "errorCode": ErrorCode::BuildFailed,
                    "command": command_line,
                }));
            }
            Err(_) => {
                return Err(RelayError::timeout(format!(
                    "UnrealBuildTool did not finish within {} s",
                    self.project.build_timeout.as_secs()
                )))
            }
        };

        let (stdout, stdout_cut) = tail(&String::from_utf8_lossy(&output.stdout), MAX_BUILD_OUTPUT);
        let (stderr, stderr_cut) = tail(&String::from_utf8_lossy(&output.stderr), MAX_BUILD_OUTPUT);
        let note = if stdout_cut || stderr_cut {
            "\n[Output truncated for response payload]"
        } else {
            ""
        };

        if output.status.success() {
            return Ok(json!({
                "success": true,
                "message": "UnrealBuildTool finished successfully",
                "output": format!("{}{}", stdout, note),
                "command": command_line,
            }));
        }

        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        warn!("UnrealBuildTool exited with {}", code);
        Ok(json!({
            "success": false,
            "error": format!("UnrealBuildTool failed with code {}", code),
            "errorCode": ErrorCode::BuildFailed,
            "output": format!("{}{}", stdout, note),
            "errorOutput": format!("{}{}", stderr, note),
            "command": command_line,
        }))
    }
}

#[async_trait]
impl ToolHandler for PipelineHandler {
    async fn handle(&self, call: &ValidatedCall, descriptor: &ToolDescriptor) -> Result<Value> {
        match call.action.as_deref() {
            Some("run_ubt") => self.run_build(call).await,
            Some("list_categories") => Ok(json!({
                "success": true,
                "categories": self.registry.list_categories(),
            })),
            Some("get_status") => Ok(self.status().await),
            _ => self.forwarder.handle(call, descriptor).await,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Reject shell metacharacters in the extra build arguments
pub fn check_build_arguments(extra: &str) -> Result<()> {
    match FORBIDDEN_SEQUENCES.iter().find(|seq| extra.contains(**seq)) {
        Some(seq) => Err(RelayError::validation(format!(
            "UBT arguments contain forbidden character(s) and are blocked for safety. Blocked: {:?}",
            seq
        ))),
        None => Ok(()),
    }
}

/// Split on unquoted whitespace. Double quotes group, backslash escapes the next character.
pub fn tokenize_arguments(extra: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = extra.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => current.extend(chars.next()),
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn render_command(tool: &Path, args: &[String]) -> String {
    let mut rendered = tool.display().to_string();
    for arg in args {
        rendered.push(' ');
        if arg.contains(' ') {
            rendered.push_str(&format!("\"{}\"", arg));
        } else {
            rendered.push_str(arg);
        }
    }
    rendered
}

/// Last `limit` bytes of `text`, moved forward to a character boundary
fn tail(text: &str, limit: usize) -> (String, bool) {
    if text.len() <= limit {
        return (text.to_string(), false);
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    (text[start..].to_string(), true)
}
