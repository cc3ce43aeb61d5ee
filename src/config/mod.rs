//! Configuration module for the tool relay
//!
//! YAML file plus `.env` files and environment overrides.

mod config;

pub use config::{
    BridgeSection, CliOverrides, Config, ElicitationConfig, LoggingConfig, ProjectSection, RemoteControlSection,
    ServerConfig, ToolsConfig, MAX_ELICITATION_TIMEOUT_MS,
};
