//! Configuration structures and loading

use crate::discovery::CategorySelection;
use crate::error::{RelayError, Result};
use crate::mcp::server::ServerSettings;
use crate::registry::ToolCategory;
use crate::routing::{BridgeConfig, RemoteControlConfig, TransportKind, TransportTimeouts};
use crate::services::ProjectConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest accepted elicitation timeout
pub const MAX_ELICITATION_TIMEOUT_MS: u64 = 600_000;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub tools: ToolsConfig,
    pub elicitation: ElicitationConfig,
    pub bridge: BridgeSection,
    pub remote_control: RemoteControlSection,
    pub project: ProjectSection,
    pub transport: TransportTimeouts,
    pub logging: LoggingConfig,
}

/// Identity reported in the `initialize` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Tool catalogue and discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Categories enabled at startup. Empty enables everything.
    pub default_categories: Vec<String>,
    /// Categories advertised to dynamic-discovery clients
    pub active_categories: Vec<String>,
    /// Client-name fragments of clients that handle list-changed notifications
    pub dynamic_discovery_clients: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            default_categories: Vec::new(),
            active_categories: vec!["all".to_string()],
            dynamic_discovery_clients: Vec::new(),
        }
    }
}

impl ToolsConfig {
    /// Parsed startup categories
    pub fn default_categories(&self) -> Result<Vec<ToolCategory>> {
        self.default_categories
            .iter()
            .map(|name| name.parse::<ToolCategory>())
            .collect()
    }

    /// Parsed initial discovery selection
    pub fn active_selection(&self) -> Result<CategorySelection> {
        CategorySelection::parse(&self.active_categories)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElicitationConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl Default for ElicitationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: crate::mcp::elicitation::DEFAULT_ELICITATION_TIMEOUT_MS,
        }
    }
}

/// Engine-side WebSocket bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    pub host: String,
    pub port: u16,
    pub capability_token: Option<String>,
    pub enabled: bool,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8091,
            capability_token: None,
            enabled: true,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 60_000,
        }
    }
}

impl BridgeSection {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    /// Apply a `ws://host:port` URL given on the command line
    pub fn set_url(&mut self, url: &str) -> Result<()> {
        let rest = url
            .strip_prefix("ws://")
            .or_else(|| url.strip_prefix("wss://"))
            .unwrap_or(url)
            .trim_end_matches('/');
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| RelayError::config(format!("Invalid bridge URL '{}': expected host:port", url)))?;
        if host.is_empty() {
            return Err(RelayError::config(format!("Invalid bridge URL '{}': missing host", url)));
        }
        self.port = port
            .parse()
            .map_err(|e| RelayError::config(format!("Invalid bridge URL port '{}': {}", port, e)))?;
        self.host = host.to_string();
        Ok(())
    }
}

/// Remote Control HTTP API used by the fallback channels
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteControlSection {
    pub base_url: String,
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl Default for RemoteControlSection {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:30010".to_string(),
            enabled: true,
            timeout_ms: 2_000,
        }
    }
}

/// Local engine install and project, used by the handlers that work without the bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    /// Project directory or `.uproject` file
    pub project_path: Option<String>,
    /// Engine root containing `Engine/Binaries`
    pub engine_path: Option<String>,
    pub build_timeout_ms: u64,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            project_path: None,
            engine_path: None,
            build_timeout_ms: 1_800_000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, text, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Result<()> {
        match self.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(RelayError::config(format!(
                    "Invalid log level: '{}'. Valid levels: trace, debug, info, warn, error",
                    self.level
                )))
            }
        }

        match self.format.to_lowercase().as_str() {
            "json" | "text" | "pretty" => {}
            _ => {
                return Err(RelayError::config(format!(
                    "Invalid log format: '{}'. Valid formats: json, text, pretty",
                    self.format
                )))
            }
        }

        Ok(())
    }
}

/// Command-line values that win over file and environment
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub bridge_url: Option<String>,
    pub disable_bridge: bool,
}

impl Config {
    /// Load .env files in order of precedence
    fn load_env_files(environment: Option<&str>) {
        let env = environment
            .map(str::to_string)
            .or_else(|| std::env::var("TOOLRELAY_ENV").ok())
            .or_else(|| std::env::var("ENV").ok())
            .or_else(|| std::env::var("NODE_ENV").ok())
            .unwrap_or_else(|| "development".to_string());

        let env_specific_file = format!(".env.{}", env);
        let env_files = [".env", env_specific_file.as_str(), ".env.local"];

        for env_file in env_files {
            match dotenvy::from_filename(env_file) {
                Ok(_) => {
                    tracing::info!("Loaded environment variables from {}", env_file);
                }
                Err(e) if e.not_found() => {
                    tracing::debug!("No {} file found, skipping", env_file);
                }
                Err(e) => {
                    tracing::warn!("Failed to load {}: {}", env_file, e);
                }
            }
        }

        tracing::info!("Environment: {}", env);
    }

    /// Load configuration: .env files, then the YAML file, then environment
    /// variables, then command-line overrides.
    pub fn load<P: AsRef<Path>>(path: P, environment: Option<&str>, overrides: &CliOverrides) -> Result<Self> {
        Self::load_env_files(environment);

        let mut config = Self::from_file(path)?;
        config.apply_environment_overrides()?;
        config.apply_cli_overrides(overrides)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML file, or fall back to defaults when it does not exist
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| RelayError::config(format!("Failed to read config file: {}", e)))?;

            serde_yaml::from_str(&content)
                .map_err(|e| RelayError::config(format!("Failed to parse config file: {}", e)))
        } else {
            tracing::warn!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(level) = get("MCP_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = get("MCP_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Some(name) = get("MCP_SERVER_NAME") {
            self.server.name = name;
        }
        if let Some(version) = get("MCP_SERVER_VERSION") {
            self.server.version = version;
        }

        if let Some(list) = get("MCP_DEFAULT_CATEGORIES") {
            self.tools.default_categories = split_list(&list);
        }
        if let Some(list) = get("MCP_ACTIVE_CATEGORIES") {
            self.tools.active_categories = split_list(&list);
        }
        if let Some(list) = get("MCP_DYNAMIC_CLIENTS") {
            self.tools.dynamic_discovery_clients = split_list(&list);
        }

        if let Some((key, value)) = get("MCP_ELICITATION_TIMEOUT_MS")
            .map(|v| ("MCP_ELICITATION_TIMEOUT_MS", v))
            .or_else(|| get("ELICITATION_TIMEOUT_MS").map(|v| ("ELICITATION_TIMEOUT_MS", v)))
        {
            self.elicitation.timeout_ms = parse_var(key, &value)?;
        }

        if let Some(host) = get("MCP_AUTOMATION_WS_HOST") {
            self.bridge.host = host;
        }
        if let Some(port) = get("MCP_AUTOMATION_WS_PORT") {
            self.bridge.port = parse_var("MCP_AUTOMATION_WS_PORT", &port)?;
        }
        if let Some(token) = get("MCP_AUTOMATION_CAPABILITY_TOKEN") {
            self.bridge.capability_token = Some(token);
        }
        if let Some(enabled) = get("MCP_AUTOMATION_BRIDGE_ENABLED") {
            self.bridge.enabled = parse_var("MCP_AUTOMATION_BRIDGE_ENABLED", &enabled.to_lowercase())?;
        }
        if let Some(timeout) = get("MCP_AUTOMATION_REQUEST_TIMEOUT_MS") {
            self.bridge.request_timeout_ms = parse_var("MCP_AUTOMATION_REQUEST_TIMEOUT_MS", &timeout)?;
        }

        if let Some(url) = get("MCP_REMOTE_CONTROL_URL") {
            self.remote_control.base_url = url;
        }

        if let Some(path) = get("UE_PROJECT_PATH") {
            self.project.project_path = Some(path);
        }
        if let Some(path) = get("UE_ENGINE_PATH").or_else(|| get("UNREAL_ENGINE_PATH")) {
            self.project.engine_path = Some(path);
        }

        Ok(())
    }

    /// Apply command-line overrides (highest precedence)
    pub fn apply_cli_overrides(&mut self, overrides: &CliOverrides) -> Result<()> {
        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
        if let Some(ref format) = overrides.log_format {
            self.logging.format = format.clone();
        }
        if let Some(ref url) = overrides.bridge_url {
            self.bridge.set_url(url)?;
        }
        if overrides.disable_bridge {
            self.bridge.enabled = false;
        }
        Ok(())
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        self.tools.default_categories()?;
        self.tools.active_selection()?;

        if self.elicitation.timeout_ms == 0 || self.elicitation.timeout_ms > MAX_ELICITATION_TIMEOUT_MS {
            return Err(RelayError::config(format!(
                "Invalid elicitation timeout: {} ms. Must be between 1 and {} ms",
                self.elicitation.timeout_ms, MAX_ELICITATION_TIMEOUT_MS
            )));
        }

        if self.bridge.host.trim().is_empty() {
            return Err(RelayError::config("Bridge host cannot be empty"));
        }
        if self.bridge.port == 0 {
            return Err(RelayError::config("Bridge port cannot be 0"));
        }
        if self.bridge.request_timeout_ms == 0 {
            return Err(RelayError::config("Bridge request timeout must be greater than 0"));
        }

        if self.remote_control.enabled && self.remote_control.base_url.trim().is_empty() {
            return Err(RelayError::config(
                "Remote control URL cannot be empty while remote control is enabled",
            ));
        }

        if self.project.build_timeout_ms == 0 {
            return Err(RelayError::config("Build timeout must be greater than 0"));
        }

        self.transport.validate().map_err(RelayError::config)?;
        self.logging.validate()?;

        Ok(())
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            url: self.bridge.url(),
            capability_token: self.bridge.capability_token.clone(),
            connect_timeout: Duration::from_millis(self.bridge.connect_timeout_ms),
            enabled: self.bridge.enabled,
        }
    }

    pub fn remote_control_config(&self) -> RemoteControlConfig {
        RemoteControlConfig {
            base_url: self.remote_control.base_url.trim_end_matches('/').to_string(),
            enabled: self.remote_control.enabled,
            ping_timeout: Duration::from_millis(self.remote_control.timeout_ms),
        }
    }

    /// Transport timeouts with the bridge request timeout folded in
    pub fn transport_timeouts(&self) -> TransportTimeouts {
        let mut timeouts = self.transport.clone();
        timeouts.set_timeout(TransportKind::Bridge, self.bridge.request_timeout_ms);
        timeouts
    }

    pub fn project_config(&self) -> ProjectConfig {
        ProjectConfig {
            project_path: self.project.project_path.as_ref().map(PathBuf::from),
            engine_path: self.project.engine_path.as_ref().map(PathBuf::from),
            build_timeout: Duration::from_millis(self.project.build_timeout_ms),
        }
    }

    pub fn server_settings(&self) -> Result<ServerSettings> {
        Ok(ServerSettings {
            name: self.server.name.clone(),
            version: self.server.version.clone(),
            default_selection: self.tools.active_selection()?,
            dynamic_clients: self.tools.dynamic_discovery_clients.clone(),
            elicitation_enabled: self.elicitation.enabled,
            elicitation_timeout: Duration::from_millis(self.elicitation.timeout_ms),
            bridge_enabled: self.bridge.enabled,
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| RelayError::config(format!("Invalid {} environment variable: {}", key, e)))
}
