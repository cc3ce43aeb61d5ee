//! Configuration file loading

use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio_test::{assert_err, assert_ok};
use toolrelay::config::{CliOverrides, Config};
use toolrelay::discovery::CategorySelection;
use toolrelay::registry::ToolCategory;
use toolrelay::routing::TransportKind;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_partial_yaml_keeps_defaults() {
    let file = write_config(
        r#"
server:
  name: unreal-relay
tools:
  default_categories: [core, world]
  active_categories: [core]
  dynamic_discovery_clients: [claude-code, cursor]
bridge:
  port: 9191
  capability_token: secret
transport:
  timeouts:
    console: 5000
"#,
    );

    let config = assert_ok!(Config::from_file(file.path()));
    assert_ok!(config.validate());

    assert_eq!(config.server.name, "unreal-relay");
    assert_eq!(config.server.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(
        config.tools.default_categories().unwrap(),
        vec![ToolCategory::Core, ToolCategory::World]
    );
    assert_eq!(config.bridge.url(), "ws://127.0.0.1:9191");
    assert_eq!(config.bridge_config().capability_token.as_deref(), Some("secret"));
    assert_eq!(config.elicitation.timeout_ms, 60_000);

    let timeouts = config.transport_timeouts();
    assert_eq!(timeouts.get_timeout(TransportKind::Console, None), Duration::from_millis(5_000));
    assert_eq!(timeouts.get_timeout(TransportKind::Bridge, None), Duration::from_millis(60_000));

    let settings = config.server_settings().unwrap();
    assert_eq!(settings.dynamic_clients, vec!["claude-code", "cursor"]);
    assert_eq!(settings.default_selection, CategorySelection::parse(&["core"]).unwrap());
    assert_eq!(settings.elicitation_timeout, Duration::from_millis(60_000));
}

#[test]
fn test_invalid_yaml_is_a_config_error() {
    let file = write_config("bridge: [not, a, map");
    let err = assert_err!(Config::from_file(file.path()));
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_unknown_category_fails_validation() {
    let file = write_config("tools:\n  default_categories: [core, audio]\n");
    let config = assert_ok!(Config::from_file(file.path()));
    assert_err!(config.validate());
}

#[test]
fn test_oversized_elicitation_timeout_fails_validation() {
    let file = write_config("elicitation:\n  timeout_ms: 900000\n");
    let config = assert_ok!(Config::from_file(file.path()));
    assert_err!(config.validate());
}

#[test]
fn test_missing_file_uses_defaults_and_cli_wins() {
    let dir = tempfile::tempdir().unwrap();
    let overrides = CliOverrides {
        log_level: Some("debug".into()),
        bridge_url: Some("ws://192.168.1.20:8100".into()),
        ..Default::default()
    };

    let config = Config::load(dir.path().join("absent.yaml"), Some("test"), &overrides).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.bridge.host, "192.168.1.20");
    assert_eq!(config.bridge.port, 8100);
    assert_eq!(config.tools.active_selection().unwrap(), CategorySelection::All);
}

#[test]
fn test_project_section_feeds_local_handlers() {
    let file = write_config("project:\n  project_path: /work/Game/Game.uproject\n  build_timeout_ms: 60000\n");
    let config = assert_ok!(Config::from_file(file.path()));
    assert_ok!(config.validate());

    let project = config.project_config();
    assert_eq!(project.project_path.as_deref(), Some(std::path::Path::new("/work/Game/Game.uproject")));
    assert_eq!(project.engine_path, None);
    assert_eq!(project.build_timeout, Duration::from_secs(60));
}
