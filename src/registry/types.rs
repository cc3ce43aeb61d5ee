//! Registry types and structures

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Fixed tool grouping used for coarse-grained enable/disable and discovery filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Core,
    World,
    Authoring,
    Gameplay,
    Utility,
}

impl ToolCategory {
    /// Every category in display order
    pub const ALL: [ToolCategory; 5] = [
        ToolCategory::Core,
        ToolCategory::World,
        ToolCategory::Authoring,
        ToolCategory::Gameplay,
        ToolCategory::Utility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Core => "core",
            ToolCategory::World => "world",
            ToolCategory::Authoring => "authoring",
            ToolCategory::Gameplay => "gameplay",
            ToolCategory::Utility => "utility",
        }
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolCategory {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "core" => Ok(ToolCategory::Core),
            "world" => Ok(ToolCategory::World),
            "authoring" => Ok(ToolCategory::Authoring),
            "gameplay" => Ok(ToolCategory::Gameplay),
            "utility" => Ok(ToolCategory::Utility),
            other => Err(RelayError::validation(format!(
                "Invalid category: '{}'. Valid categories: core, world, authoring, gameplay, utility",
                other
            ))),
        }
    }
}

/// Which secondary channel can stand in for the primary transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    /// General scripted work; falls back to direct script execution
    Script,
    /// Simple administrative actions; falls back to the filtered console channel
    Administrative,
    /// No secondary channel applies
    PrimaryOnly,
}

/// Whether a tool may run while the engine is unreachable
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OfflinePolicy {
    #[default]
    Never,
    Always,
    /// Only the listed values of the `action` argument
    Actions(Vec<String>),
}

impl OfflinePolicy {
    pub fn allows(&self, action: Option<&str>) -> bool {
        match self {
            OfflinePolicy::Never => false,
            OfflinePolicy::Always => true,
            OfflinePolicy::Actions(actions) => {
                action.map_or(false, |a| actions.iter().any(|allowed| allowed == a))
            }
        }
    }
}

/// Declared type of a required field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    /// Enum of strings
    Enum(Vec<String>),
    Array,
    Object,
    Other,
}

impl FieldType {
    /// Derive a field type from a JSON schema property
    pub fn from_property(property: &Value) -> Self {
        if let Some(values) = property.get("enum").and_then(Value::as_array) {
            let strings: Vec<String> = values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            if strings.len() == values.len() {
                return FieldType::Enum(strings);
            }
            return FieldType::Other;
        }

        match property.get("type").and_then(Value::as_str) {
            Some("string") => FieldType::String,
            Some("number") => FieldType::Number,
            Some("integer") => FieldType::Integer,
            Some("boolean") => FieldType::Boolean,
            Some("array") => FieldType::Array,
            Some("object") => FieldType::Object,
            _ => FieldType::Other,
        }
    }

    /// Primitive fields are the only ones a client can be asked to fill in
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            FieldType::String
                | FieldType::Number
                | FieldType::Integer
                | FieldType::Boolean
                | FieldType::Enum(_)
        )
    }
}

/// A required field of a tool's input
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    /// The property schema exactly as declared
    pub property: Value,
}

/// Immutable tool definition, created once from the static catalogue
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub input_schema: Value,
    pub output_schema: Option<Value>,
    /// Ordered as declared in the schema's `required` list
    pub required_fields: Vec<FieldSpec>,
    /// Protected tools can never be disabled
    pub protected: bool,
    /// Hidden from clients that cannot react to list changes
    pub management_only: bool,
    pub offline: OfflinePolicy,
    pub action_class: ActionClass,
}

impl ToolDescriptor {
    /// Create a descriptor, deriving its required fields from the input schema
    pub fn new<S: Into<String>>(name: S, description: S, category: ToolCategory, input_schema: Value) -> Self {
        let required_fields = Self::derive_required_fields(&input_schema);
        Self {
            name: name.into(),
            description: description.into(),
            category,
            input_schema,
            output_schema: None,
            required_fields,
            protected: false,
            management_only: false,
            offline: OfflinePolicy::Never,
            action_class: ActionClass::Script,
        }
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    pub fn management_only(mut self) -> Self {
        self.management_only = true;
        self
    }

    pub fn with_offline(mut self, policy: OfflinePolicy) -> Self {
        self.offline = policy;
        self
    }

    pub fn with_action_class(mut self, class: ActionClass) -> Self {
        self.action_class = class;
        self
    }

    /// Look up a required field by name
    pub fn required_field(&self, name: &str) -> Option<&FieldSpec> {
        self.required_fields.iter().find(|f| f.name == name)
    }

    fn derive_required_fields(schema: &Value) -> Vec<FieldSpec> {
        let properties = schema.get("properties");
        schema
            .get("required")
            .and_then(Value::as_array)
            .map(|required| {
                required
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|name| {
                        let property = properties
                            .and_then(|p| p.get(name))
                            .cloned()
                            .unwrap_or(Value::Null);
                        FieldSpec {
                            name: name.to_string(),
                            field_type: FieldType::from_property(&property),
                            property,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Mutable runtime state, one per descriptor
#[derive(Debug, Clone)]
pub struct ToolRuntimeState {
    pub descriptor: Arc<ToolDescriptor>,
    pub enabled: bool,
}

impl ToolRuntimeState {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn category(&self) -> ToolCategory {
        self.descriptor.category
    }
}

/// Read-only row of `list_tools`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSnapshot {
    pub name: String,
    pub category: ToolCategory,
    pub enabled: bool,
    pub protected: bool,
    pub description: String,
}

/// Derived category view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryView {
    pub name: ToolCategory,
    /// True while at least one member is enabled
    pub enabled: bool,
    pub tool_count: usize,
    pub enabled_count: usize,
    pub tools: Vec<String>,
}

/// Aggregate registry status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatus {
    pub total_tools: usize,
    pub enabled_tools: usize,
    pub disabled_tools: usize,
    pub categories: Vec<CategoryView>,
}

/// Per-name result of an enable batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableOutcome {
    pub enabled: Vec<String>,
    pub not_found: Vec<String>,
    pub protected: Vec<String>,
}

/// Per-name result of a disable batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisableOutcome {
    pub disabled: Vec<String>,
    pub not_found: Vec<String>,
    pub protected: Vec<String>,
}

impl DisableOutcome {
    /// A batch that only touched protected tools is reported as a failure
    pub fn only_protected(&self) -> bool {
        !self.protected.is_empty() && self.disabled.is_empty()
    }
}

/// Result of a category-wide enable or disable
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryOutcome {
    /// No tools belong to the named category, or the name is not a category
    NotFound { category: String },
    Applied(CategoryChange),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryChange {
    pub category: ToolCategory,
    /// Tools whose state actually flipped
    pub changed: Vec<String>,
    pub protected: Vec<String>,
    pub tool_count: usize,
}

impl CategoryChange {
    pub fn all_protected(&self) -> bool {
        self.tool_count > 0 && self.protected.len() == self.tool_count
    }
}
