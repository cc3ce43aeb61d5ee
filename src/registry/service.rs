//! Capability registry: tool descriptors, enabled state, and category views
//!
//! Every operation is synchronous and total. Unknown names come back as
//! `notFound` entries in the outcome rather than as errors. All state sits
//! behind a single mutex per registry instance.

use crate::error::{RelayError, Result};
use crate::registry::types::*;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// In-memory registry owning every `ToolRuntimeState`
pub struct CapabilityRegistry {
    state: Mutex<RegistryState>,
}

struct RegistryState {
    /// Catalogue order
    tools: Vec<ToolRuntimeState>,
    index: HashMap<String, usize>,
}

impl RegistryState {
    fn get_mut(&mut self, name: &str) -> Option<&mut ToolRuntimeState> {
        let idx = *self.index.get(name)?;
        self.tools.get_mut(idx)
    }

    fn category_view(&self, category: ToolCategory) -> Option<CategoryView> {
        let members: Vec<&ToolRuntimeState> = self
            .tools
            .iter()
            .filter(|t| t.category() == category)
            .collect();
        if members.is_empty() {
            return None;
        }

        let enabled_count = members.iter().filter(|t| t.enabled).count();
        Some(CategoryView {
            name: category,
            enabled: enabled_count > 0,
            tool_count: members.len(),
            enabled_count,
            tools: members.iter().map(|t| t.name().to_string()).collect(),
        })
    }

    fn category_views(&self) -> Vec<CategoryView> {
        ToolCategory::ALL
            .iter()
            .filter_map(|c| self.category_view(*c))
            .collect()
    }
}

impl CapabilityRegistry {
    /// Build a registry with every tool enabled
    pub fn new(descriptors: Vec<ToolDescriptor>) -> Result<Self> {
        Self::with_default_categories(descriptors, &[])
    }

    /// Build a registry where only tools in `default_categories` start enabled.
    /// An empty slice enables every category. Protected tools always start enabled.
    pub fn with_default_categories(
        descriptors: Vec<ToolDescriptor>,
        default_categories: &[ToolCategory],
    ) -> Result<Self> {
        let mut tools = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if index.contains_key(&descriptor.name) {
                return Err(RelayError::config(format!(
                    "Duplicate tool name in catalogue: {}",
                    descriptor.name
                )));
            }

            let enabled = descriptor.protected
                || default_categories.is_empty()
                || default_categories.contains(&descriptor.category);
            index.insert(descriptor.name.clone(), tools.len());
            tools.push(ToolRuntimeState {
                descriptor: Arc::new(descriptor),
                enabled,
            });
        }

        let categories: HashSet<ToolCategory> = tools.iter().map(|t| t.category()).collect();
        info!(
            "Initialized capability registry with {} tools across {} categories",
            tools.len(),
            categories.len()
        );

        Ok(Self {
            state: Mutex::new(RegistryState { tools, index }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // No operation leaves the state half-written, so a poisoned lock is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read-only listing of every tool
    pub fn list_tools(&self) -> Vec<ToolSnapshot> {
        self.lock()
            .tools
            .iter()
            .map(|t| ToolSnapshot {
                name: t.name().to_string(),
                category: t.category(),
                enabled: t.enabled,
                protected: t.descriptor.protected,
                description: t.descriptor.description.clone(),
            })
            .collect()
    }

    /// Read-only listing of the categories that have at least one tool
    pub fn list_categories(&self) -> Vec<CategoryView> {
        self.lock().category_views()
    }

    /// Full runtime snapshot, used by the visibility filter
    pub fn snapshot(&self) -> Vec<ToolRuntimeState> {
        self.lock().tools.clone()
    }

    pub fn get_status(&self) -> RegistryStatus {
        let state = self.lock();
        let total_tools = state.tools.len();
        let enabled_tools = state.tools.iter().filter(|t| t.enabled).count();
        RegistryStatus {
            total_tools,
            enabled_tools,
            disabled_tools: total_tools - enabled_tools,
            categories: state.category_views(),
        }
    }

    /// Look up a descriptor by name
    pub fn descriptor(&self, name: &str) -> Option<Arc<ToolDescriptor>> {
        let state = self.lock();
        let idx = *state.index.get(name)?;
        state.tools.get(idx).map(|t| Arc::clone(&t.descriptor))
    }

    /// Enabled flag of a tool, `None` when unknown
    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        let state = self.lock();
        let idx = *state.index.get(name)?;
        state.tools.get(idx).map(|t| t.enabled)
    }

    /// Enable each named tool. Best effort per name.
    pub fn enable_tools<S: AsRef<str>>(&self, names: &[S]) -> EnableOutcome {
        let mut state = self.lock();
        let mut outcome = EnableOutcome::default();

        for name in names {
            let name = name.as_ref();
            match state.get_mut(name) {
                None => outcome.not_found.push(name.to_string()),
                Some(tool) if tool.descriptor.protected => outcome.protected.push(name.to_string()),
                Some(tool) => {
                    tool.enabled = true;
                    outcome.enabled.push(name.to_string());
                }
            }
        }

        info!(
            "Enabled {} tools ({} not found, {} protected)",
            outcome.enabled.len(),
            outcome.not_found.len(),
            outcome.protected.len()
        );
        outcome
    }

    /// Disable each named tool. Protected tools are reported and left enabled.
    pub fn disable_tools<S: AsRef<str>>(&self, names: &[S]) -> DisableOutcome {
        let mut state = self.lock();
        let mut outcome = DisableOutcome::default();

        for name in names {
            let name = name.as_ref();
            match state.get_mut(name) {
                None => outcome.not_found.push(name.to_string()),
                Some(tool) if tool.descriptor.protected => {
                    debug!("Refusing to disable protected tool: {}", name);
                    outcome.protected.push(name.to_string());
                }
                Some(tool) => {
                    tool.enabled = false;
                    outcome.disabled.push(name.to_string());
                }
            }
        }

        info!(
            "Disabled {} tools ({} not found, {} protected)",
            outcome.disabled.len(),
            outcome.not_found.len(),
            outcome.protected.len()
        );
        outcome
    }

    pub fn enable_category(&self, name: &str) -> CategoryOutcome {
        self.apply_category(name, true)
    }

    pub fn disable_category(&self, name: &str) -> CategoryOutcome {
        self.apply_category(name, false)
    }

    fn apply_category(&self, name: &str, enable: bool) -> CategoryOutcome {
        let category = match name.parse::<ToolCategory>() {
            Ok(category) => category,
            Err(_) => {
                return CategoryOutcome::NotFound {
                    category: name.to_string(),
                }
            }
        };

        let mut state = self.lock();
        let mut change = CategoryChange {
            category,
            changed: Vec::new(),
            protected: Vec::new(),
            tool_count: 0,
        };

        for tool in state.tools.iter_mut().filter(|t| t.category() == category) {
            change.tool_count += 1;
            if tool.descriptor.protected {
                change.protected.push(tool.name().to_string());
                continue;
            }
            if tool.enabled != enable {
                tool.enabled = enable;
                change.changed.push(tool.name().to_string());
            }
        }

        if change.tool_count == 0 {
            return CategoryOutcome::NotFound {
                category: name.to_string(),
            };
        }

        info!(
            "{} category '{}': {} tools changed, {} protected",
            if enable { "Enabled" } else { "Disabled" },
            category,
            change.changed.len(),
            change.protected.len()
        );
        CategoryOutcome::Applied(change)
    }

    /// Re-enable every non-protected tool. Returns how many flipped.
    pub fn reset(&self) -> usize {
        let mut state = self.lock();
        let mut count = 0;
        for tool in state.tools.iter_mut().filter(|t| !t.enabled) {
            tool.enabled = true;
            count += 1;
        }
        info!("Reset registry: re-enabled {} tools", count);
        count
    }
}
