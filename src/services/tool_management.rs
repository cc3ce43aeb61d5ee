//! Tool Management Service
//!
//! Backs the `manage_tools` tool: runtime enable/disable of tools and
//! categories, status reporting, and the active category filter. Every
//! successful mutation sends one best-effort list-changed notification.

use crate::discovery::{CategorySelection, VisibilityFilter};
use crate::error::ErrorCode;
use crate::mcp::types::ToolResult;
use crate::registry::{CapabilityRegistry, CategoryOutcome, CategoryView, ToolCategory};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Actions accepted by `manage_tools`
pub const MANAGEMENT_ACTIONS: &[&str] = &[
    "list_tools",
    "list_categories",
    "enable_tools",
    "disable_tools",
    "enable_category",
    "disable_category",
    "get_status",
    "reset",
    "set_categories",
];

const DESCRIPTION_LIMIT: usize = 100;

/// One `manage_tools` request
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ManagementAction {
    ListTools,
    ListCategories,
    EnableTools {
        #[serde(default)]
        tools: Vec<String>,
    },
    DisableTools {
        #[serde(default)]
        tools: Vec<String>,
    },
    EnableCategory {
        #[serde(default)]
        category: Option<String>,
    },
    DisableCategory {
        #[serde(default)]
        category: Option<String>,
    },
    GetStatus,
    Reset,
    SetCategories {
        #[serde(default)]
        categories: Vec<String>,
    },
}

impl ManagementAction {
    /// Parse raw arguments. An absent or unknown action is `UNKNOWN_ACTION`.
    pub fn parse(args: &Map<String, Value>) -> Result<Self, ToolResult> {
        let action = args.get("action").and_then(Value::as_str).unwrap_or_default();
        if !MANAGEMENT_ACTIONS.contains(&action) {
            return Err(ToolResult::failure(
                format!("Unknown action: {}. Available: {}", action, MANAGEMENT_ACTIONS.join(", ")),
                ErrorCode::UnknownAction,
            ));
        }
        serde_json::from_value(Value::Object(args.clone())).map_err(|e| {
            ToolResult::failure(format!("Invalid arguments for {}: {}", action, e), ErrorCode::Validation)
        })
    }

    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            ManagementAction::ListTools | ManagementAction::ListCategories | ManagementAction::GetStatus
        )
    }
}

fn success(message: String, data: Value) -> ToolResult {
    let mut payload = Map::new();
    payload.insert("success".into(), Value::Bool(true));
    payload.insert("message".into(), Value::String(message));
    if let Value::Object(fields) = data {
        payload.extend(fields);
    }
    ToolResult::from_payload(Value::Object(payload), true)
}

fn category_rows(categories: &[CategoryView]) -> Vec<Value> {
    categories
        .iter()
        .map(|c| {
            json!({
                "name": c.name,
                "enabled": c.enabled,
                "toolCount": c.tool_count,
                "enabledCount": c.enabled_count,
            })
        })
        .collect()
}

fn truncate(description: &str) -> String {
    if description.chars().count() > DESCRIPTION_LIMIT {
        let head: String = description.chars().take(DESCRIPTION_LIMIT).collect();
        format!("{}...", head)
    } else {
        description.to_string()
    }
}

/// Management operations over the registry and the session's visibility filter
pub struct ToolManagementService {
    registry: Arc<CapabilityRegistry>,
    visibility: Arc<VisibilityFilter>,
}

impl ToolManagementService {
    pub fn new(registry: Arc<CapabilityRegistry>, visibility: Arc<VisibilityFilter>) -> Self {
        Self { registry, visibility }
    }

    /// Run one `manage_tools` call
    pub fn handle(&self, args: &Map<String, Value>) -> ToolResult {
        let action = match ManagementAction::parse(args) {
            Ok(action) => action,
            Err(failure) => return failure,
        };
        debug!("manage_tools: {:?}", action);

        let mutating = action.is_mutating();
        let result = self.execute(action);
        if mutating && result.success() {
            self.visibility.notify_changed();
        }
        result
    }

    fn execute(&self, action: ManagementAction) -> ToolResult {
        match action {
            ManagementAction::ListTools => self.list_tools(),
            ManagementAction::ListCategories => {
                let categories = self.registry.list_categories();
                success(
                    format!("Listed {} categories", categories.len()),
                    json!({
                        "categories": category_rows(&categories),
                        "totalCategories": categories.len(),
                    }),
                )
            }
            ManagementAction::EnableTools { tools } => self.enable_tools(&tools),
            ManagementAction::DisableTools { tools } => self.disable_tools(&tools),
            ManagementAction::EnableCategory { category } => self.apply_category(category.as_deref(), true),
            ManagementAction::DisableCategory { category } => self.apply_category(category.as_deref(), false),
            ManagementAction::GetStatus => {
                let status = self.registry.get_status();
                success(
                    format!("{}/{} tools enabled", status.enabled_tools, status.total_tools),
                    json!({
                        "totalTools": status.total_tools,
                        "enabledTools": status.enabled_tools,
                        "disabledTools": status.disabled_tools,
                        "categories": category_rows(&status.categories),
                    }),
                )
            }
            ManagementAction::Reset => {
                let count = self.registry.reset();
                success(
                    format!("Reset complete. {} tools re-enabled.", count),
                    json!({ "enabled": count }),
                )
            }
            ManagementAction::SetCategories { categories } => self.set_categories(&categories),
        }
    }

    fn list_tools(&self) -> ToolResult {
        let tools = self.registry.list_tools();
        let enabled = tools.iter().filter(|t| t.enabled).count();
        let disabled = tools.len() - enabled;
        let rows: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "category": t.category,
                    "enabled": t.enabled,
                    "protected": t.protected,
                    "description": truncate(&t.description),
                })
            })
            .collect();

        success(
            format!("Listed {} tools ({} enabled, {} disabled)", rows.len(), enabled, disabled),
            json!({
                "tools": rows,
                "totalTools": tools.len(),
                "enabledCount": enabled,
                "disabledCount": disabled,
            }),
        )
    }

    fn enable_tools(&self, names: &[String]) -> ToolResult {
        if names.is_empty() {
            return ToolResult::failure("No tools specified. Provide tools array.", ErrorCode::MissingTools);
        }
        let outcome = self.registry.enable_tools(names);

        let mut message = format!("Enabled {} tools", outcome.enabled.len());
        if !outcome.not_found.is_empty() {
            message.push_str(&format!(". {} not found", outcome.not_found.len()));
        }
        if !outcome.protected.is_empty() {
            message.push_str(&format!(". {} protected", outcome.protected.len()));
        }
        success(
            message,
            json!({
                "enabled": outcome.enabled,
                "notFound": outcome.not_found,
                "protected": outcome.protected,
            }),
        )
    }

    fn disable_tools(&self, names: &[String]) -> ToolResult {
        if names.is_empty() {
            return ToolResult::failure("No tools specified. Provide tools array.", ErrorCode::MissingTools);
        }
        let outcome = self.registry.disable_tools(names);

        if outcome.only_protected() {
            return ToolResult::failure(
                format!("Cannot disable protected tools: {}", outcome.protected.join(", ")),
                ErrorCode::ProtectedTools,
            );
        }

        let mut parts = Vec::new();
        if !outcome.disabled.is_empty() {
            parts.push(format!("Disabled {} tools", outcome.disabled.len()));
        }
        if !outcome.not_found.is_empty() {
            parts.push(format!("{} not found", outcome.not_found.len()));
        }
        if !outcome.protected.is_empty() {
            parts.push(format!("{} protected", outcome.protected.len()));
        }
        success(
            parts.join(". "),
            json!({
                "disabled": outcome.disabled,
                "notFound": outcome.not_found,
                "protected": outcome.protected,
            }),
        )
    }

    fn apply_category(&self, category: Option<&str>, enable: bool) -> ToolResult {
        let name = match category.map(str::trim).filter(|c| !c.is_empty()) {
            Some(name) => name,
            None => return ToolResult::failure("No category specified.", ErrorCode::MissingCategory),
        };
        if name.parse::<ToolCategory>().is_err() {
            let valid: Vec<&str> = ToolCategory::ALL.iter().map(|c| c.as_str()).collect();
            return ToolResult::failure(
                format!("Invalid category '{}'. Valid: {}", name, valid.join(", ")),
                ErrorCode::InvalidCategory,
            );
        }

        let outcome = if enable {
            self.registry.enable_category(name)
        } else {
            self.registry.disable_category(name)
        };
        let change = match outcome {
            CategoryOutcome::NotFound { category } => {
                return ToolResult::failure(format!("Category '{}' not found", category), ErrorCode::NotFound);
            }
            CategoryOutcome::Applied(change) => change,
        };

        if enable {
            return success(
                format!("Enabled category '{}' ({} tools)", change.category, change.changed.len()),
                json!({ "category": change.category, "enabled": change.changed }),
            );
        }

        if change.all_protected() {
            return ToolResult::failure(
                format!(
                    "Cannot fully disable protected category '{}'. Protected tools: {}",
                    change.category,
                    change.protected.join(", ")
                ),
                ErrorCode::ProtectedCategory,
            );
        }
        success(
            format!("Disabled category '{}' ({} tools disabled)", change.category, change.changed.len()),
            json!({
                "category": change.category,
                "disabled": change.changed,
                "protected": change.protected,
            }),
        )
    }

    fn set_categories(&self, categories: &[String]) -> ToolResult {
        if categories.iter().all(|c| c.trim().is_empty()) {
            return ToolResult::failure("No categories specified.", ErrorCode::MissingCategory);
        }
        let selection = match CategorySelection::parse(categories) {
            Ok(selection) => selection,
            Err(e) => return ToolResult::failure(e.to_string(), ErrorCode::InvalidCategory),
        };

        let changed = self.visibility.set_selection(selection.clone());
        info!("Active categories now {:?} (changed: {})", selection.names(), changed);
        success(
            format!("Active categories: {}", selection.names().join(", ")),
            json!({ "categories": selection, "changed": changed }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_and_missing_actions() {
        let mut args = Map::new();
        let failure = ManagementAction::parse(&args).unwrap_err();
        assert_eq!(failure.error_code(), Some(ErrorCode::UnknownAction));

        args.insert("action".into(), json!("explode"));
        let failure = ManagementAction::parse(&args).unwrap_err();
        assert_eq!(failure.error_code(), Some(ErrorCode::UnknownAction));
    }

    #[test]
    fn routing_keys_are_ignored() {
        let args = json!({"action": "enable_tools", "tools": ["a"], "timeoutMs": 10});
        let action = ManagementAction::parse(args.as_object().unwrap()).unwrap();
        assert_eq!(action, ManagementAction::EnableTools { tools: vec!["a".into()] });
        assert!(action.is_mutating());
        assert!(!ManagementAction::GetStatus.is_mutating());
    }

    #[test]
    fn descriptions_are_truncated() {
        let long = "x".repeat(150);
        let short = truncate(&long);
        assert_eq!(short.len(), DESCRIPTION_LIMIT + 3);
        assert!(short.ends_with("..."));
        assert_eq!(truncate("short"), "short");
    }
}
