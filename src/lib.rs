//! toolrelay - capability-aware MCP tool invocation for an Unreal Engine automation runtime
//!
//! The crate keeps a registry of engine tools, decides which of them each MCP
//! client sees, fills in missing arguments through elicitation, and routes
//! calls to the engine over the automation bridge with Remote Control
//! fallbacks.

pub mod config;
pub mod discovery;
pub mod error;
pub mod mcp;
pub mod metrics;
pub mod registry;
pub mod routing;
pub mod security;
pub mod services;
pub mod startup;

pub use config::Config;
pub use error::{ErrorCode, RelayError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
