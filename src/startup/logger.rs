//! Startup summary logging

use crate::config::Config;
use crate::discovery::CategorySelection;
use tracing::{info, warn};

/// Facts only known after the runtime is assembled
#[derive(Debug, Clone, Default)]
pub struct StartupAdditionalInfo {
    pub tools_loaded: usize,
    pub tools_enabled: usize,
    pub bridge_connected: bool,
    pub config_path: Option<String>,
}

/// Logs what the relay is about to run with
pub struct StartupLogger;

impl StartupLogger {
    /// Display startup information
    pub fn display_startup_info(config: &Config, version: &str, additional_info: &StartupAdditionalInfo) {
        info!("🚀 {} v{} starting...", config.server.name, version);

        Self::display_configuration(config, additional_info);
        Self::display_transports(config, additional_info);
        Self::display_tools(config, additional_info);

        info!("✅ {} ready on stdio", config.server.name);
    }

    fn display_configuration(config: &Config, additional_info: &StartupAdditionalInfo) {
        info!("📁 Configuration:");
        match &additional_info.config_path {
            Some(path) => info!("   Config file: {}", path),
            None => info!("   Config file: built-in defaults"),
        }
        info!(
            "   Logging: level={} format={}",
            config.logging.level, config.logging.format
        );
    }

    fn display_transports(config: &Config, additional_info: &StartupAdditionalInfo) {
        info!("🔌 Transports:");
        if !config.bridge.enabled {
            warn!("   ⚠️  Automation bridge disabled");
        } else if additional_info.bridge_connected {
            info!("   ✅ Automation bridge connected ({})", config.bridge.url());
        } else {
            warn!(
                "   ⚠️  Automation bridge not reachable at {}; will retry on demand",
                config.bridge.url()
            );
        }

        if config.remote_control.enabled {
            info!("   ✅ Remote Control fallback ({})", config.remote_control.base_url);
        } else {
            info!("   ❌ Remote Control fallback disabled");
        }
    }

    fn display_tools(config: &Config, additional_info: &StartupAdditionalInfo) {
        info!("🎯 Tools:");
        info!(
            "   {} of {} tools enabled",
            additional_info.tools_enabled, additional_info.tools_loaded
        );

        match config.tools.active_selection() {
            Ok(CategorySelection::All) => info!("   Active categories: all"),
            Ok(selection) => info!("   Active categories: {}", selection.names().join(", ")),
            Err(e) => warn!("   ⚠️  Active categories invalid: {}", e),
        }

        if config.elicitation.enabled {
            info!("   Elicitation: enabled ({} ms timeout)", config.elicitation.timeout_ms);
        } else {
            info!("   Elicitation: disabled");
        }
    }
}
