//! Visibility filter
//!
//! Decides which registry entries a client sees in `tools/list`. Clients that
//! cannot react to list-changed notifications always get every enabled tool,
//! whatever the active category selection says.

use crate::error::{RelayError, Result};
use crate::mcp::notifications::ListChangedNotifier;
use crate::mcp::session::ClientProfile;
use crate::mcp::types::Tool;
use crate::registry::{CapabilityRegistry, ToolCategory, ToolRuntimeState};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Sentinel that selects every category
pub const ALL_CATEGORIES: &str = "all";

/// Active category selection of a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategorySelection {
    #[default]
    All,
    Only(BTreeSet<ToolCategory>),
}

impl CategorySelection {
    /// Parse category names. Any `all` entry selects everything.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        if names.is_empty() {
            return Err(RelayError::validation("At least one category is required"));
        }

        let mut selected = BTreeSet::new();
        let mut invalid = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.eq_ignore_ascii_case(ALL_CATEGORIES) {
                return Ok(CategorySelection::All);
            }
            match name.parse::<ToolCategory>() {
                Ok(category) => {
                    selected.insert(category);
                }
                Err(_) => invalid.push(name.to_string()),
            }
        }

        if !invalid.is_empty() {
            return Err(RelayError::validation(format!(
                "Invalid categories: {}. Valid: all, core, world, authoring, gameplay, utility",
                invalid.join(", ")
            )));
        }
        Ok(CategorySelection::Only(selected))
    }

    pub fn includes(&self, category: ToolCategory) -> bool {
        match self {
            CategorySelection::All => true,
            CategorySelection::Only(set) => set.contains(&category),
        }
    }

    pub fn names(&self) -> Vec<String> {
        match self {
            CategorySelection::All => vec![ALL_CATEGORIES.to_string()],
            CategorySelection::Only(set) => set.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Serialize for CategorySelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.names().serialize(serializer)
    }
}

/// Pure visibility computation over a registry snapshot
pub fn filter_tools(
    profile: &ClientProfile,
    selection: &CategorySelection,
    snapshot: &[ToolRuntimeState],
) -> Vec<ToolRuntimeState> {
    let all = CategorySelection::All;
    let effective = if profile.supports_dynamic_discovery {
        selection
    } else {
        &all
    };

    snapshot
        .iter()
        .filter(|t| t.enabled)
        .filter(|t| effective.includes(t.category()))
        .filter(|t| profile.supports_dynamic_discovery || !t.descriptor.management_only)
        .cloned()
        .collect()
}

/// Session-scoped view over the shared registry
pub struct VisibilityFilter {
    registry: Arc<CapabilityRegistry>,
    selection: RwLock<CategorySelection>,
    notifier: Arc<ListChangedNotifier>,
}

impl VisibilityFilter {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        selection: CategorySelection,
        notifier: Arc<ListChangedNotifier>,
    ) -> Self {
        Self {
            registry,
            selection: RwLock::new(selection),
            notifier,
        }
    }

    pub fn selection(&self) -> CategorySelection {
        self.selection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the active selection. Returns whether it changed.
    pub fn set_selection(&self, selection: CategorySelection) -> bool {
        let mut current = self.selection.write().unwrap_or_else(PoisonError::into_inner);
        let changed = *current != selection;
        if changed {
            info!("Active categories set to {:?}", selection.names());
        }
        *current = selection;
        changed
    }

    /// Tools to advertise to `profile`, in catalogue order
    pub fn visible_tools(&self, profile: &ClientProfile) -> Vec<Tool> {
        let snapshot = self.registry.snapshot();
        let selection = self.selection();
        let visible = filter_tools(profile, &selection, &snapshot);
        debug!("Advertising {} of {} tools", visible.len(), snapshot.len());
        visible
            .iter()
            .map(|t| Tool::from_descriptor(&t.descriptor))
            .collect()
    }

    /// Best-effort list-changed notification
    pub fn notify_changed(&self) -> Option<JoinHandle<bool>> {
        self.notifier.notify_tools_list_changed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolDescriptor;
    use serde_json::json;

    fn state(name: &str, category: ToolCategory, enabled: bool, management_only: bool) -> ToolRuntimeState {
        let mut descriptor = ToolDescriptor::new(name, "test", category, json!({"type": "object"}));
        if management_only {
            descriptor = descriptor.management_only();
        }
        ToolRuntimeState {
            descriptor: Arc::new(descriptor),
            enabled,
        }
    }

    fn snapshot() -> Vec<ToolRuntimeState> {
        vec![
            state("manage_tools", ToolCategory::Core, true, true),
            state("control_actor", ToolCategory::Core, true, false),
            state("manage_lighting", ToolCategory::World, true, false),
            state("manage_input", ToolCategory::Gameplay, false, false),
        ]
    }

    fn names(tools: Vec<ToolRuntimeState>) -> Vec<String> {
        tools.iter().map(|t| t.name().to_string()).collect()
    }

    #[test]
    fn dynamic_client_respects_selection() {
        let profile = ClientProfile {
            supports_dynamic_discovery: true,
            ..Default::default()
        };
        let selection = CategorySelection::parse(&["world"]).unwrap();
        assert_eq!(names(filter_tools(&profile, &selection, &snapshot())), vec!["manage_lighting"]);
    }

    #[test]
    fn static_client_ignores_selection_and_management_tools() {
        let profile = ClientProfile::anonymous();
        let selection = CategorySelection::parse(&["world"]).unwrap();
        assert_eq!(
            names(filter_tools(&profile, &selection, &snapshot())),
            vec!["control_actor", "manage_lighting"]
        );
    }

    #[test]
    fn disabled_tools_are_never_visible() {
        let profile = ClientProfile {
            supports_dynamic_discovery: true,
            ..Default::default()
        };
        let visible = names(filter_tools(&profile, &CategorySelection::All, &snapshot()));
        assert!(!visible.contains(&"manage_input".to_string()));
        assert!(visible.contains(&"manage_tools".to_string()));
    }

    #[test]
    fn parse_selection() {
        assert_eq!(CategorySelection::parse(&["core", "ALL"]).unwrap(), CategorySelection::All);
        assert!(CategorySelection::parse::<&str>(&[]).is_err());
        let err = CategorySelection::parse(&["core", "physics"]).unwrap_err();
        assert!(err.to_string().contains("physics"));
        assert_eq!(
            serde_json::to_value(CategorySelection::parse(&["world", "core"]).unwrap()).unwrap(),
            json!(["core", "world"])
        );
    }
}
