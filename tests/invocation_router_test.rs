//! End-to-end behaviour of the invocation router with stubbed collaborators

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use toolrelay::discovery::{CategorySelection, VisibilityFilter};
use toolrelay::error::{ErrorCode, RelayError, Result};
use toolrelay::mcp::types::elicitation::{ElicitationRequest, ElicitationResult};
use toolrelay::mcp::{
    ClientProfile, ElicitationCoordinator, Elicitor, ListChangedNotifier, McpNotification, NotificationSink,
    ToolCall,
};
use toolrelay::metrics::HealthMonitor;
use toolrelay::registry::{
    default_catalogue, CapabilityRegistry, OfflinePolicy, ToolCategory, ToolDescriptor, MANAGE_TOOLS,
};
use toolrelay::routing::{
    AutomationForwarder, AutomationTransport, HandlerRegistry, InvocationRouter, ToolHandler, TransportKind,
    TransportRequest, TransportResponse, TransportSelector, TransportTimeouts, ValidatedCall,
};
use toolrelay::services::ToolManagementService;

struct StubBridge {
    connected: bool,
    sent: Mutex<Vec<TransportRequest>>,
    response: Mutex<Option<TransportResponse>>,
}

impl StubBridge {
    fn new(connected: bool) -> Arc<Self> {
        Arc::new(Self {
            connected,
            sent: Mutex::new(Vec::new()),
            response: Mutex::new(None),
        })
    }

    fn respond_with(&self, response: TransportResponse) {
        *self.response.lock().unwrap() = Some(response);
    }

    fn sent(&self) -> Vec<TransportRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl AutomationTransport for StubBridge {
    fn kind(&self) -> TransportKind {
        TransportKind::Bridge
    }

    async fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send(&self, request: &TransportRequest, _timeout: Duration) -> Result<TransportResponse> {
        if !self.connected {
            return Err(RelayError::not_connected("bridge offline"));
        }
        self.sent.lock().unwrap().push(request.clone());
        Ok(self.response.lock().unwrap().clone().unwrap_or(TransportResponse {
            request_id: "req-1".into(),
            success: true,
            message: Some("done".into()),
            error: None,
            result: Some(json!({"spawned": true})),
        }))
    }
}

/// Answers every elicitation with fixed values after an optional delay
struct ScriptedElicitor {
    delay: Duration,
    values: Value,
    calls: AtomicUsize,
    requests: Mutex<Vec<ElicitationRequest>>,
}

impl ScriptedElicitor {
    fn new(values: Value, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            values,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Elicitor for ScriptedElicitor {
    async fn elicit(&self, request: &ElicitationRequest) -> Result<ElicitationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        tokio::time::sleep(self.delay).await;
        Ok(ElicitationResult::accepted(
            self.values.as_object().cloned().unwrap_or_default(),
        ))
    }
}

struct UnsupportedElicitor {
    calls: AtomicUsize,
}

#[async_trait]
impl Elicitor for UnsupportedElicitor {
    async fn elicit(&self, _request: &ElicitationRequest) -> Result<ElicitationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RelayError::mcp("elicitation/create failed (-32601): Method not found"))
    }
}

struct PanickingHandler;

#[async_trait]
impl ToolHandler for PanickingHandler {
    async fn handle(&self, _call: &ValidatedCall, _descriptor: &ToolDescriptor) -> Result<Value> {
        panic!("handler exploded");
    }
}

struct SettingsHandler;

#[async_trait]
impl ToolHandler for SettingsHandler {
    async fn handle(&self, call: &ValidatedCall, _descriptor: &ToolDescriptor) -> Result<Value> {
        Ok(json!({"action": call.action, "settings": {"project": "Demo"}}))
    }
}

struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn send(&self, _notification: McpNotification) -> Result<()> {
        Ok(())
    }
}

fn spawn_prop() -> ToolDescriptor {
    ToolDescriptor::new(
        "spawn_prop",
        "Spawn a prop",
        ToolCategory::Core,
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string" },
                "name": { "type": "string" },
                "count": { "type": "integer", "minimum": 1 }
            },
            "required": ["name", "count"]
        }),
    )
}

fn catalogue() -> Vec<ToolDescriptor> {
    let manage = default_catalogue()
        .into_iter()
        .find(|t| t.name == MANAGE_TOOLS)
        .unwrap();
    vec![
        manage,
        spawn_prop(),
        ToolDescriptor::new("explode", "Always panics", ToolCategory::Utility, json!({"type": "object"})),
        ToolDescriptor::new(
            "project_settings",
            "Read settings",
            ToolCategory::Core,
            json!({"type": "object", "properties": {"action": {"type": "string"}}}),
        )
        .with_offline(OfflinePolicy::Actions(vec!["get_project_settings".into()])),
    ]
}

struct Harness {
    router: InvocationRouter,
    registry: Arc<CapabilityRegistry>,
    health: Arc<HealthMonitor>,
    bridge: Arc<StubBridge>,
}

fn harness(bridge: Arc<StubBridge>, elicitation: ElicitationCoordinator) -> Harness {
    let health = Arc::new(HealthMonitor::new());
    let registry = Arc::new(CapabilityRegistry::new(catalogue()).unwrap());
    let notifier = Arc::new(ListChangedNotifier::new(Arc::new(NullSink), health.clone()));
    let visibility = Arc::new(VisibilityFilter::new(
        registry.clone(),
        CategorySelection::All,
        notifier,
    ));
    let management = Arc::new(ToolManagementService::new(registry.clone(), visibility));
    let selector = Arc::new(TransportSelector::new(
        bridge.clone(),
        TransportTimeouts::default(),
        health.clone(),
    ));
    let handlers = HandlerRegistry::new(Arc::new(AutomationForwarder::new(selector.clone())))
        .with_handler("explode", Arc::new(PanickingHandler))
        .with_handler("project_settings", Arc::new(SettingsHandler));

    let router = InvocationRouter::new(
        registry.clone(),
        management,
        selector,
        handlers,
        Arc::new(elicitation),
        health.clone(),
    );
    Harness {
        router,
        registry,
        health,
        bridge,
    }
}

fn eliciting_client() -> ClientProfile {
    ClientProfile {
        client_name: Some("inspector".into()),
        supports_dynamic_discovery: false,
        supports_elicitation: true,
    }
}

#[tokio::test]
async fn test_successful_call_goes_through_bridge() {
    let h = harness(StubBridge::new(true), ElicitationCoordinator::disabled());

    let result = h
        .router
        .call(
            ToolCall::new("spawn_prop", json!({"action": "spawn", "name": "Crate", "count": 2, "transport": "auto"})),
            &ClientProfile::anonymous(),
        )
        .await;

    assert!(result.success(), "{}", result.text());
    let payload = result.structured_content.unwrap();
    assert_eq!(payload["success"], true);
    assert_eq!(payload["transport"], "bridge");
    assert_eq!(payload["result"]["spawned"], true);

    let sent = h.bridge.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].action, "spawn");
    assert_eq!(sent[0].payload.get("name"), Some(&json!("Crate")));
    assert!(!sent[0].payload.contains_key("transport"));

    let snapshot = h.health.snapshot();
    assert_eq!(snapshot.total_requests, 1);
    assert_eq!(snapshot.successful_requests, 1);
}

#[tokio::test]
async fn test_runtime_failure_is_normalized() {
    let bridge = StubBridge::new(true);
    bridge.respond_with(TransportResponse {
        request_id: "req-9".into(),
        success: false,
        message: None,
        error: Some("Actor not found".into()),
        result: None,
    });
    let h = harness(bridge, ElicitationCoordinator::disabled());

    let result = h
        .router
        .call(
            ToolCall::new("spawn_prop", json!({"name": "Crate", "count": 1})),
            &ClientProfile::anonymous(),
        )
        .await;

    assert!(result.is_error);
    assert_eq!(result.error_code(), Some(ErrorCode::TransportFailure));
    let payload = result.structured_content.unwrap();
    assert_eq!(payload["message"], "Actor not found");
    assert_eq!(h.health.errors_for("spawn_prop").len(), 1);
}

#[tokio::test]
async fn test_unknown_tool_is_not_found() {
    let h = harness(StubBridge::new(true), ElicitationCoordinator::disabled());

    let result = h
        .router
        .call(ToolCall::new("ghost", json!({})), &ClientProfile::anonymous())
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::NotFound));
    assert!(result.text().contains("Tool 'ghost' not found"));
    assert_eq!(h.health.snapshot().failed_requests, 1);
}

#[tokio::test]
async fn test_non_object_arguments_are_rejected() {
    let h = harness(StubBridge::new(true), ElicitationCoordinator::disabled());

    let result = h
        .router
        .call(ToolCall::new("spawn_prop", json!([1, 2])), &ClientProfile::anonymous())
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::Validation));
    assert!(h.bridge.sent().is_empty());
}

#[tokio::test]
async fn test_disabled_tool_never_reaches_transport() {
    let h = harness(StubBridge::new(true), ElicitationCoordinator::disabled());
    h.registry.disable_tools(&["spawn_prop"]);

    let result = h
        .router
        .call(
            ToolCall::new("spawn_prop", json!({"name": "Crate", "count": 1})),
            &ClientProfile::anonymous(),
        )
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::ToolDisabled));
    assert!(h.bridge.sent().is_empty());
}

#[tokio::test]
async fn test_disconnected_engine_is_refused_unless_offline_allowed() {
    let h = harness(StubBridge::new(false), ElicitationCoordinator::disabled());

    let result = h
        .router
        .call(
            ToolCall::new("spawn_prop", json!({"name": "Crate", "count": 1})),
            &ClientProfile::anonymous(),
        )
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::NotConnected));
    assert!(result.text().contains("Unreal Engine is not connected"));

    let result = h
        .router
        .call(
            ToolCall::new("project_settings", json!({"action": "get_project_settings"})),
            &ClientProfile::anonymous(),
        )
        .await;
    assert!(result.success(), "{}", result.text());
    assert_eq!(result.structured_content.unwrap()["settings"]["project"], "Demo");

    let result = h
        .router
        .call(
            ToolCall::new("project_settings", json!({"action": "set_project_settings"})),
            &ClientProfile::anonymous(),
        )
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::NotConnected));
}

#[tokio::test]
async fn test_management_tool_works_offline() {
    let h = harness(StubBridge::new(false), ElicitationCoordinator::disabled());

    let result = h
        .router
        .call(
            ToolCall::new(MANAGE_TOOLS, json!({"action": "disable_tools", "tools": ["spawn_prop"]})),
            &ClientProfile::anonymous(),
        )
        .await;
    assert!(result.success(), "{}", result.text());
    assert_eq!(h.registry.is_enabled("spawn_prop"), Some(false));
}

#[tokio::test]
async fn test_elicitation_fills_only_requested_fields() {
    let elicitor = ScriptedElicitor::new(json!({"count": 3, "name": "ignored", "extra": true}), Duration::ZERO);
    let h = harness(
        StubBridge::new(true),
        ElicitationCoordinator::new(elicitor.clone(), Duration::from_millis(500)),
    );

    let result = h
        .router
        .call(ToolCall::new("spawn_prop", json!({"name": "Barrel"})), &eliciting_client())
        .await;

    assert!(result.success(), "{}", result.text());
    let requests = elicitor.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].schema.required, vec!["count"]);

    let sent = h.bridge.sent();
    assert_eq!(sent[0].payload.get("count"), Some(&json!(3)));
    assert_eq!(sent[0].payload.get("name"), Some(&json!("Barrel")));
    assert!(!sent[0].payload.contains_key("extra"));
}

#[tokio::test]
async fn test_elicitation_timeout_falls_through_to_validation() {
    let elicitor = ScriptedElicitor::new(json!({"count": 3}), Duration::from_millis(300));
    let h = harness(
        StubBridge::new(true),
        ElicitationCoordinator::new(elicitor.clone(), Duration::from_millis(30)),
    );

    let result = h
        .router
        .call(ToolCall::new("spawn_prop", json!({"name": "Barrel"})), &eliciting_client())
        .await;

    assert_eq!(result.error_code(), Some(ErrorCode::Validation));
    assert!(result.text().contains("count"));
    assert_eq!(elicitor.calls.load(Ordering::SeqCst), 1);
    assert!(h.bridge.sent().is_empty());
}

#[tokio::test]
async fn test_clients_without_elicitation_are_never_asked() {
    let elicitor = ScriptedElicitor::new(json!({"count": 3}), Duration::ZERO);
    let h = harness(
        StubBridge::new(true),
        ElicitationCoordinator::new(elicitor.clone(), Duration::from_millis(500)),
    );

    let result = h
        .router
        .call(ToolCall::new("spawn_prop", json!({"name": "Barrel"})), &ClientProfile::anonymous())
        .await;

    assert_eq!(result.error_code(), Some(ErrorCode::Validation));
    assert_eq!(elicitor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_method_not_found_disables_elicitation_for_the_session() {
    let elicitor = Arc::new(UnsupportedElicitor {
        calls: AtomicUsize::new(0),
    });
    let h = harness(
        StubBridge::new(true),
        ElicitationCoordinator::new(elicitor.clone(), Duration::from_millis(500)),
    );

    for _ in 0..2 {
        let result = h
            .router
            .call(ToolCall::new("spawn_prop", json!({"name": "Barrel"})), &eliciting_client())
            .await;
        assert_eq!(result.error_code(), Some(ErrorCode::Validation));
    }
    assert_eq!(elicitor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_handler_panic_becomes_internal_error() {
    let h = harness(StubBridge::new(true), ElicitationCoordinator::disabled());

    let result = h
        .router
        .call(ToolCall::new("explode", json!({})), &ClientProfile::anonymous())
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::Internal));
    assert!(result.text().contains("handler exploded"));

    let result = h
        .router
        .call(
            ToolCall::new("spawn_prop", json!({"name": "Crate", "count": 1})),
            &ClientProfile::anonymous(),
        )
        .await;
    assert!(result.success());
    assert_eq!(h.health.snapshot().total_requests, 2);
}

#[tokio::test]
async fn test_unsupported_transport_name_fails_cleanly() {
    let h = harness(StubBridge::new(true), ElicitationCoordinator::disabled());

    let result = h
        .router
        .call(
            ToolCall::new("spawn_prop", json!({"name": "Crate", "count": 1, "transport": "telnet"})),
            &ClientProfile::anonymous(),
        )
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::UnsupportedTransport));
    assert!(h.bridge.sent().is_empty());
}

#[tokio::test]
async fn test_pending_elicitation_does_not_block_other_calls() {
    let elicitor = ScriptedElicitor::new(json!({"count": 1}), Duration::from_millis(200));
    let h = harness(
        StubBridge::new(true),
        ElicitationCoordinator::new(elicitor, Duration::from_secs(1)),
    );
    let profile = eliciting_client();

    let waiting = h
        .router
        .call(ToolCall::new("spawn_prop", json!({"name": "Slow"})), &profile);
    let immediate = async {
        let started = Instant::now();
        let result = h
            .router
            .call(ToolCall::new("spawn_prop", json!({"name": "Fast", "count": 1})), &profile)
            .await;
        (result, started.elapsed())
    };

    let (waited, (finished, elapsed)) = futures::future::join(waiting, immediate).await;
    assert!(waited.success(), "{}", waited.text());
    assert!(finished.success(), "{}", finished.text());
    assert!(elapsed < Duration::from_millis(150));

    let order: Vec<String> = h
        .bridge
        .sent()
        .iter()
        .filter_map(|r| r.payload.get("name").and_then(Value::as_str).map(str::to_string))
        .collect();
    assert_eq!(order, vec!["Fast", "Slow"]);
}
