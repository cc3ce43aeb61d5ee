//! Registry, visibility, and manage_tools working together

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use toolrelay::discovery::{CategorySelection, VisibilityFilter};
use toolrelay::error::{ErrorCode, Result};
use toolrelay::mcp::{ClientProfile, ListChangedNotifier, McpNotification, NotificationSink};
use toolrelay::metrics::HealthMonitor;
use toolrelay::registry::{default_catalogue, CapabilityRegistry, ToolCategory, ToolDescriptor, MANAGE_TOOLS};
use toolrelay::services::ToolManagementService;

struct ChannelSink(mpsc::UnboundedSender<McpNotification>);

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn send(&self, notification: McpNotification) -> Result<()> {
        let _ = self.0.send(notification);
        Ok(())
    }
}

struct Fixture {
    registry: Arc<CapabilityRegistry>,
    visibility: Arc<VisibilityFilter>,
    management: ToolManagementService,
    notifications: mpsc::UnboundedReceiver<McpNotification>,
}

fn fixture() -> Fixture {
    fixture_with(default_catalogue())
}

fn fixture_with(catalogue: Vec<ToolDescriptor>) -> Fixture {
    let registry = Arc::new(CapabilityRegistry::new(catalogue).unwrap());
    let (tx, rx) = mpsc::unbounded_channel();
    let notifier = Arc::new(ListChangedNotifier::new(
        Arc::new(ChannelSink(tx)),
        Arc::new(HealthMonitor::new()),
    ));
    let visibility = Arc::new(VisibilityFilter::new(
        registry.clone(),
        CategorySelection::All,
        notifier,
    ));
    let management = ToolManagementService::new(registry.clone(), visibility.clone());
    Fixture {
        registry,
        visibility,
        management,
        notifications: rx,
    }
}

fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("arguments must be an object"),
    }
}

fn dynamic_client() -> ClientProfile {
    ClientProfile {
        client_name: Some("claude-code".into()),
        supports_dynamic_discovery: true,
        supports_elicitation: false,
    }
}

fn names(tools: &[toolrelay::mcp::Tool]) -> Vec<String> {
    tools.iter().map(|t| t.name.clone()).collect()
}

#[test]
fn test_default_categories_keep_protected_tools_enabled() {
    let registry =
        CapabilityRegistry::with_default_categories(default_catalogue(), &[ToolCategory::World]).unwrap();

    assert_eq!(registry.is_enabled("build_environment"), Some(true));
    assert_eq!(registry.is_enabled("manage_asset"), Some(false));
    assert_eq!(registry.is_enabled(MANAGE_TOOLS), Some(true));
    assert_eq!(registry.is_enabled("inspect"), Some(true));
    assert_eq!(registry.is_enabled("no_such_tool"), None);

    let status = registry.get_status();
    assert_eq!(status.total_tools, 17);
    assert_eq!(status.enabled_tools + status.disabled_tools, 17);
}

#[test]
fn test_static_clients_see_every_enabled_tool_but_management() {
    let f = fixture();
    f.visibility
        .set_selection(CategorySelection::parse(&["world"]).unwrap());

    let visible = names(&f.visibility.visible_tools(&ClientProfile::anonymous()));
    assert_eq!(visible.len(), 16);
    assert!(!visible.contains(&MANAGE_TOOLS.to_string()));
    assert!(visible.contains(&"manage_blueprint".to_string()));
}

#[test]
fn test_dynamic_clients_follow_active_categories() {
    let f = fixture();
    f.visibility
        .set_selection(CategorySelection::parse(&["world"]).unwrap());

    let visible = names(&f.visibility.visible_tools(&dynamic_client()));
    assert_eq!(visible, vec!["build_environment", "manage_lighting"]);
}

#[tokio::test]
async fn test_disable_category_hides_tools_and_notifies_once() {
    let mut f = fixture();

    let result = f
        .management
        .handle(&args(json!({"action": "disable_category", "category": "world"})));
    assert!(result.success(), "{}", result.text());

    let notification = timeout(Duration::from_millis(100), f.notifications.recv())
        .await
        .expect("Should receive notification")
        .expect("Channel should stay open");
    assert_eq!(notification.method, "notifications/tools/list_changed");
    assert!(timeout(Duration::from_millis(50), f.notifications.recv()).await.is_err());

    let visible = names(&f.visibility.visible_tools(&ClientProfile::anonymous()));
    assert!(!visible.contains(&"build_environment".to_string()));
    assert!(!visible.contains(&"manage_lighting".to_string()));
    assert_eq!(f.registry.is_enabled("build_environment"), Some(false));
}

#[tokio::test]
async fn test_disabling_only_protected_tools_fails_without_notification() {
    let mut f = fixture();

    let result = f
        .management
        .handle(&args(json!({"action": "disable_tools", "tools": [MANAGE_TOOLS, "inspect"]})));
    assert!(!result.success());
    assert_eq!(result.error_code(), Some(ErrorCode::ProtectedTools));
    assert_eq!(f.registry.is_enabled(MANAGE_TOOLS), Some(true));
    assert!(timeout(Duration::from_millis(50), f.notifications.recv()).await.is_err());
}

#[tokio::test]
async fn test_core_category_disable_spares_protected_members() {
    let f = fixture();

    let result = f
        .management
        .handle(&args(json!({"action": "disable_category", "category": "core"})));
    assert!(result.success());
    let payload = result.structured_content.unwrap();
    let protected: Vec<&str> = payload["protected"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(protected, vec![MANAGE_TOOLS, "inspect"]);
    assert_eq!(f.registry.is_enabled("inspect"), Some(true));
    assert_eq!(f.registry.is_enabled("control_actor"), Some(false));
}

#[tokio::test]
async fn test_partial_batches_report_each_name() {
    let f = fixture();

    let result = f.management.handle(&args(json!({
        "action": "disable_tools",
        "tools": ["manage_rc", "ghost_tool", "inspect"]
    })));
    assert!(result.success());
    let payload = result.structured_content.unwrap();
    assert_eq!(payload["disabled"], json!(["manage_rc"]));
    assert_eq!(payload["notFound"], json!(["ghost_tool"]));
    assert_eq!(payload["protected"], json!(["inspect"]));
}

#[tokio::test]
async fn test_reset_restores_everything() {
    let f = fixture();
    f.registry.disable_category("utility");
    f.registry.disable_tools(&["manage_asset"]);

    let result = f.management.handle(&args(json!({"action": "reset"})));
    assert!(result.success());
    assert_eq!(result.structured_content.unwrap()["enabled"], 3);
    assert_eq!(f.registry.get_status().disabled_tools, 0);
}

#[tokio::test]
async fn test_set_categories_validates_names() {
    let f = fixture();

    let result = f
        .management
        .handle(&args(json!({"action": "set_categories", "categories": ["core", "weather"]})));
    assert_eq!(result.error_code(), Some(ErrorCode::InvalidCategory));
    assert_eq!(f.visibility.selection(), CategorySelection::All);

    let result = f
        .management
        .handle(&args(json!({"action": "set_categories", "categories": ["Gameplay"]})));
    assert!(result.success());
    assert_eq!(f.visibility.selection().names(), vec!["gameplay"]);
}

#[test]
fn test_unknown_action_is_reported() {
    let f = fixture();
    let result = f.management.handle(&args(json!({"action": "explode"})));
    assert_eq!(result.error_code(), Some(ErrorCode::UnknownAction));
}

fn enabled_count(registry: &CapabilityRegistry, category: ToolCategory) -> usize {
    registry
        .list_categories()
        .into_iter()
        .find(|c| c.name == category)
        .map_or(0, |c| c.enabled_count)
}

#[tokio::test]
async fn test_fully_protected_category_cannot_be_disabled() {
    let object = json!({"type": "object"});
    let mut f = fixture_with(vec![
        ToolDescriptor::new("engine_ping", "Check the engine", ToolCategory::Utility, object.clone()).protected(),
        ToolDescriptor::new("engine_info", "Engine version", ToolCategory::Utility, object.clone()).protected(),
        ToolDescriptor::new("manage_lighting", "Lights", ToolCategory::World, object),
    ]);
    let before = enabled_count(&f.registry, ToolCategory::Utility);

    let result = f
        .management
        .handle(&args(json!({"action": "disable_category", "category": "utility"})));

    assert!(!result.success());
    assert_eq!(result.error_code(), Some(ErrorCode::ProtectedCategory));
    assert!(result.text().contains("engine_ping"));
    assert_eq!(before, 2);
    assert_eq!(enabled_count(&f.registry, ToolCategory::Utility), before);
    assert_eq!(f.registry.get_status().disabled_tools, 0);
    assert!(timeout(Duration::from_millis(50), f.notifications.recv()).await.is_err());
}

#[tokio::test]
async fn test_every_category_survives_a_disable_enable_cycle() {
    let f = fixture();
    let catalogue = default_catalogue();
    let total = f.registry.get_status().total_tools;

    for category in ToolCategory::ALL.iter().copied() {
        let members: Vec<&ToolDescriptor> = catalogue.iter().filter(|d| d.category == category).collect();
        if members.is_empty() {
            continue;
        }
        let protected: Vec<&str> = members.iter().filter(|d| d.protected).map(|d| d.name.as_str()).collect();
        let unprotected: Vec<&str> = members.iter().filter(|d| !d.protected).map(|d| d.name.as_str()).collect();

        let disabled = f
            .management
            .handle(&args(json!({"action": "disable_category", "category": category.as_str()})));
        assert!(disabled.success(), "{}: {}", category.as_str(), disabled.text());
        let payload = disabled.structured_content.unwrap();
        assert_eq!(payload["protected"], json!(protected), "{}", category.as_str());
        assert_eq!(payload["disabled"], json!(unprotected), "{}", category.as_str());
        assert_eq!(enabled_count(&f.registry, category), protected.len());
        for name in &protected {
            assert_eq!(f.registry.is_enabled(name), Some(true));
        }

        let enabled = f
            .management
            .handle(&args(json!({"action": "enable_category", "category": category.as_str()})));
        assert!(enabled.success(), "{}: {}", category.as_str(), enabled.text());
        assert_eq!(enabled_count(&f.registry, category), members.len());
        assert_eq!(f.registry.get_status().enabled_tools, total);
    }
}
