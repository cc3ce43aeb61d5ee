use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use toolrelay::config::{CliOverrides, Config};
use toolrelay::mcp::McpServer;
use toolrelay::metrics::HealthMonitor;
use toolrelay::registry::{default_catalogue, CapabilityRegistry};
use toolrelay::routing::bridge::try_connect;
use toolrelay::routing::{
    AutomationBridge, AutomationForwarder, HandlerRegistry, RemoteControlClient, RemoteControlTransport,
    TransportSelector,
};
use toolrelay::services::{PipelineHandler, SystemControlHandler};
use toolrelay::startup::{StartupAdditionalInfo, StartupLogger};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = toolrelay::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log format (json, text, pretty)
    #[arg(long)]
    log_format: Option<String>,

    /// Environment name used to pick the .env.{environment} file
    #[arg(long)]
    env: Option<String>,

    /// Automation bridge URL (ws://host:port)
    #[arg(long)]
    bridge_url: Option<String>,

    /// Never connect to the automation bridge
    #[arg(long)]
    no_bridge: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config is not loaded yet, so the command line and the process environment decide
    let log_level = cli
        .log_level
        .clone()
        .or_else(|| std::env::var("MCP_LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string());
    let log_format = cli
        .log_format
        .clone()
        .or_else(|| std::env::var("MCP_LOG_FORMAT").ok())
        .unwrap_or_else(|| "text".to_string());
    init_logging(&log_level, &log_format)?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), toolrelay::VERSION);

    let overrides = CliOverrides {
        log_level: cli.log_level.clone(),
        log_format: cli.log_format.clone(),
        bridge_url: cli.bridge_url.clone(),
        disable_bridge: cli.no_bridge,
    };
    let config = Config::load(&cli.config, cli.env.as_deref(), &overrides).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let registry = Arc::new(CapabilityRegistry::with_default_categories(
        default_catalogue(),
        &config.tools.default_categories()?,
    )?);
    let health = Arc::new(HealthMonitor::new());

    let bridge = Arc::new(AutomationBridge::new(config.bridge_config()));
    let mut selector = TransportSelector::new(bridge.clone(), config.transport_timeouts(), health.clone());
    if config.remote_control.enabled {
        let client = Arc::new(RemoteControlClient::new(config.remote_control_config())?);
        selector = selector
            .with_python(Arc::new(RemoteControlTransport::python(client.clone())))
            .with_console(Arc::new(RemoteControlTransport::console(client)));
    }
    let selector = Arc::new(selector);
    let project = config.project_config();
    let handlers = HandlerRegistry::new(Arc::new(AutomationForwarder::new(selector.clone())))
        .with_handler(
            "manage_pipeline",
            Arc::new(PipelineHandler::new(
                registry.clone(),
                health.clone(),
                selector.clone(),
                project.clone(),
            )),
        )
        .with_handler("system_control", Arc::new(SystemControlHandler::new(selector.clone(), project)));

    let bridge_connected = config.bridge.enabled && try_connect(&bridge).await;

    let status = registry.get_status();
    StartupLogger::display_startup_info(
        &config,
        toolrelay::VERSION,
        &StartupAdditionalInfo {
            tools_loaded: status.total_tools,
            tools_enabled: status.enabled_tools,
            bridge_connected,
            config_path: cli
                .config
                .exists()
                .then(|| cli.config.display().to_string()),
        },
    );

    let server = McpServer::new(config.server_settings()?, registry, selector, handlers, health);
    let reader = tokio::io::BufReader::new(tokio::io::stdin());
    let writer = tokio::io::stdout();

    tokio::select! {
        result = server.run(reader, writer) => {
            if let Err(e) = result {
                error!("MCP session ended with error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, shutting down");
        }
    }

    bridge.disconnect().await;
    info!("Shutdown complete");
    Ok(())
}

/// Initialize logging on stderr; stdout carries the MCP session. `RUST_LOG` wins over the level.
fn init_logging(level: &str, format: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match format.to_lowercase().as_str() {
        "json" => tracing_subscriber::registry()
            .with(fmt_layer.json())
            .with(env_filter)
            .try_init()?,
        "pretty" => tracing_subscriber::registry()
            .with(fmt_layer.pretty())
            .with(env_filter)
            .try_init()?,
        _ => tracing_subscriber::registry()
            .with(fmt_layer.with_ansi(false))
            .with(env_filter)
            .try_init()?,
    }

    Ok(())
}
