//! Static tool catalogue
//!
//! Every tool the server can advertise. Descriptors are built once at startup
//! and never mutated afterwards.

use crate::registry::types::{ActionClass, OfflinePolicy, ToolCategory, ToolDescriptor};
use serde_json::{json, Value};

/// Name of the runtime management tool
pub const MANAGE_TOOLS: &str = "manage_tools";

/// Shared output fields every tool reports
fn output_base() -> Value {
    json!({
        "type": "object",
        "properties": {
            "success": { "type": "boolean" },
            "message": { "type": "string" },
            "error": { "type": "string" },
            "errorCode": { "type": "string" },
            "warnings": { "type": "array", "items": { "type": "string" } }
        }
    })
}

fn action_schema(actions: &[&str], extra: Value, required: &[&str]) -> Value {
    let mut properties = json!({
        "action": { "type": "string", "enum": actions },
        "transport": {
            "type": "string",
            "description": "Execution channel: auto (default), bridge, python, console"
        },
        "timeoutMs": { "type": "integer", "minimum": 1 }
    });
    if let (Some(props), Some(extra)) = (properties.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            props.insert(key.clone(), value.clone());
        }
    }

    let mut required_fields = vec!["action"];
    required_fields.extend_from_slice(required);
    json!({
        "type": "object",
        "properties": properties,
        "required": required_fields
    })
}

fn tool(name: &str, description: &str, category: ToolCategory, input_schema: Value) -> ToolDescriptor {
    ToolDescriptor::new(name, description, category, input_schema).with_output_schema(output_base())
}

/// The full catalogue in advertised order
pub fn default_catalogue() -> Vec<ToolDescriptor> {
    vec![
        // core
        tool(
            "manage_pipeline",
            "Build automation and pipeline control. Actions: run_ubt (compile targets), list_categories (show tool categories), get_status (bridge status).",
            ToolCategory::Core,
            action_schema(
                &["run_ubt", "list_categories", "get_status"],
                json!({
                    "target": { "type": "string", "description": "Build target name (e.g., MyProjectEditor)" },
                    "platform": { "type": "string", "description": "Target platform (Win64, Linux, Mac)" },
                    "configuration": { "type": "string", "description": "Build configuration (Development, Shipping, Debug)" },
                    "arguments": { "type": "string", "description": "Additional UBT arguments" },
                    "projectPath": { "type": "string", "description": "Absolute project directory or .uproject file, used when UE_PROJECT_PATH is unset" }
                }),
                &[],
            ),
        )
        .with_offline(OfflinePolicy::Always),
        tool(
            MANAGE_TOOLS,
            "Dynamic MCP tool management. Enable/disable tools and categories at runtime. Actions: list_tools, list_categories, enable_tools, disable_tools, enable_category, disable_category, get_status, reset, set_categories.",
            ToolCategory::Core,
            json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": [
                            "list_tools", "list_categories", "enable_tools", "disable_tools",
                            "enable_category", "disable_category", "get_status", "reset", "set_categories"
                        ]
                    },
                    "tools": { "type": "array", "items": { "type": "string" }, "description": "Tool names to enable/disable" },
                    "category": { "type": "string", "description": "Category name (core, world, authoring, gameplay, utility)" },
                    "categories": { "type": "array", "items": { "type": "string" }, "description": "Active categories, or [\"all\"]" }
                },
                "required": ["action"]
            }),
        )
        .protected()
        .management_only()
        .with_offline(OfflinePolicy::Always)
        .with_action_class(ActionClass::PrimaryOnly),
        tool(
            "manage_asset",
            "Asset creation, import, and manipulation. Actions: list, import, duplicate, rename, delete, create_material.",
            ToolCategory::Core,
            action_schema(
                &["list", "import", "duplicate", "rename", "delete", "create_material"],
                json!({
                    "path": { "type": "string", "description": "Content path (e.g., /Game/Meshes)" },
                    "destination": { "type": "string" },
                    "sourcePath": { "type": "string", "description": "File on disk to import" },
                    "script": { "type": "string", "description": "Python fallback script" }
                }),
                &[],
            ),
        ),
        tool(
            "control_actor",
            "Actor spawn, transform, physics, and components. Actions: spawn, delete, set_transform, get_components, apply_force.",
            ToolCategory::Core,
            action_schema(
                &["spawn", "delete", "set_transform", "get_components", "apply_force"],
                json!({
                    "actorName": { "type": "string" },
                    "classPath": { "type": "string", "description": "Class or asset path to spawn" },
                    "location": { "type": "object", "properties": { "x": { "type": "number" }, "y": { "type": "number" }, "z": { "type": "number" } } },
                    "rotation": { "type": "object" },
                    "script": { "type": "string", "description": "Python fallback script" }
                }),
                &[],
            ),
        ),
        tool(
            "control_editor",
            "Editor control: PIE, camera, screenshots. Actions: play, stop, pause, set_camera, screenshot.",
            ToolCategory::Core,
            action_schema(
                &["play", "stop", "pause", "set_camera", "screenshot"],
                json!({
                    "location": { "type": "object" },
                    "rotation": { "type": "object" },
                    "filename": { "type": "string" },
                    "script": { "type": "string", "description": "Python fallback script" }
                }),
                &[],
            ),
        ),
        tool(
            "manage_level",
            "Level load/save, streaming, and World Partition. Actions: load, save, stream, create_level.",
            ToolCategory::Core,
            action_schema(
                &["load", "save", "stream", "create_level"],
                json!({
                    "levelPath": { "type": "string", "description": "Level asset path (e.g., /Game/Maps/Main)" },
                    "shouldBeVisible": { "type": "boolean" },
                    "script": { "type": "string", "description": "Python fallback script" }
                }),
                &["levelPath"],
            ),
        ),
        tool(
            "system_control",
            "Profiling, CVars, quality settings, and project settings. Actions: profile, show_fps, set_quality, set_cvar, get_project_settings, run_tests.",
            ToolCategory::Core,
            action_schema(
                &["profile", "show_fps", "set_quality", "set_cvar", "get_project_settings", "run_tests"],
                json!({
                    "command": { "type": "string", "description": "Raw console command" },
                    "name": { "type": "string", "description": "CVar name" },
                    "value": { "type": ["string", "number", "boolean"] },
                    "enabled": { "type": "boolean" },
                    "level": { "type": "integer", "minimum": 0, "maximum": 4 },
                    "category": { "type": "string", "description": "Settings category (Project, Engine, Game, Input)" },
                    "section": { "type": "string", "description": "Alias of category" }
                }),
                &[],
            ),
        )
        .with_offline(OfflinePolicy::Actions(vec!["get_project_settings".to_string()]))
        .with_action_class(ActionClass::Administrative),
        tool(
            "inspect",
            "Object introspection. Actions: inspect_object, get_property, set_property, find_by_class.",
            ToolCategory::Core,
            action_schema(
                &["inspect_object", "get_property", "set_property", "find_by_class"],
                json!({
                    "objectPath": { "type": "string" },
                    "propertyName": { "type": "string" },
                    "value": {},
                    "className": { "type": "string" }
                }),
                &[],
            ),
        )
        .protected(),
        // world
        tool(
            "build_environment",
            "Landscape, foliage, and sky setup. Actions: create_landscape, sculpt, paint_foliage, create_sky.",
            ToolCategory::World,
            action_schema(
                &["create_landscape", "sculpt", "paint_foliage", "create_sky"],
                json!({
                    "name": { "type": "string" },
                    "location": { "type": "object" },
                    "script": { "type": "string", "description": "Python fallback script" }
                }),
                &[],
            ),
        ),
        tool(
            "manage_lighting",
            "Light spawning and lighting builds. Actions: spawn_light, build_lighting, set_time_of_day.",
            ToolCategory::World,
            action_schema(
                &["spawn_light", "build_lighting", "set_time_of_day"],
                json!({
                    "lightType": { "type": "string", "enum": ["point", "spot", "directional", "rect", "sky"] },
                    "intensity": { "type": "number" },
                    "timeOfDay": { "type": "number" },
                    "script": { "type": "string", "description": "Python fallback script" }
                }),
                &[],
            ),
        ),
        // authoring
        tool(
            "manage_blueprint",
            "Blueprint authoring. Actions: create, add_component, add_variable, compile.",
            ToolCategory::Authoring,
            action_schema(
                &["create", "add_component", "add_variable", "compile"],
                json!({
                    "name": { "type": "string", "description": "Blueprint asset path" },
                    "parentClass": { "type": "string" },
                    "componentType": { "type": "string" },
                    "script": { "type": "string", "description": "Python fallback script" }
                }),
                &["name"],
            ),
        ),
        tool(
            "manage_sequence",
            "Level Sequence editing. Actions: create, open, add_actor, play.",
            ToolCategory::Authoring,
            action_schema(
                &["create", "open", "add_actor", "play"],
                json!({
                    "path": { "type": "string" },
                    "actorName": { "type": "string" },
                    "script": { "type": "string", "description": "Python fallback script" }
                }),
                &[],
            ),
        ),
        tool(
            "create_effect",
            "Niagara systems and debug shapes. Actions: niagara, particle, debug_shape.",
            ToolCategory::Authoring,
            action_schema(
                &["niagara", "particle", "debug_shape"],
                json!({
                    "systemPath": { "type": "string" },
                    "location": { "type": "object" },
                    "shape": { "type": "string" },
                    "script": { "type": "string", "description": "Python fallback script" }
                }),
                &[],
            ),
        ),
        // gameplay
        tool(
            "animation_physics",
            "Animation blueprints, montages, and ragdolls. Actions: create_animation_bp, play_montage, setup_ragdoll.",
            ToolCategory::Gameplay,
            action_schema(
                &["create_animation_bp", "play_montage", "setup_ragdoll"],
                json!({
                    "skeletonPath": { "type": "string" },
                    "montagePath": { "type": "string" },
                    "actorName": { "type": "string" },
                    "script": { "type": "string", "description": "Python fallback script" }
                }),
                &[],
            ),
        ),
        tool(
            "manage_input",
            "Enhanced Input assets. Actions: create_input_action, create_mapping_context, add_mapping.",
            ToolCategory::Gameplay,
            action_schema(
                &["create_input_action", "create_mapping_context", "add_mapping"],
                json!({
                    "name": { "type": "string" },
                    "path": { "type": "string" },
                    "key": { "type": "string" },
                    "script": { "type": "string", "description": "Python fallback script" }
                }),
                &[],
            ),
        ),
        // utility
        tool(
            "console_command",
            "Execute a console command in the editor. Destructive commands are rejected.",
            ToolCategory::Utility,
            json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "Console command to execute" },
                    "transport": { "type": "string" },
                    "timeoutMs": { "type": "integer", "minimum": 1 }
                },
                "required": ["command"]
            }),
        )
        .with_action_class(ActionClass::Administrative),
        tool(
            "manage_rc",
            "Remote Control presets. Actions: create_preset, expose_actor, list_presets, set_property.",
            ToolCategory::Utility,
            action_schema(
                &["create_preset", "expose_actor", "list_presets", "set_property"],
                json!({
                    "presetPath": { "type": "string" },
                    "actorName": { "type": "string" },
                    "propertyName": { "type": "string" },
                    "value": {},
                    "script": { "type": "string", "description": "Python fallback script" }
                }),
                &[],
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalogue_names_are_unique() {
        let catalogue = default_catalogue();
        let names: HashSet<&str> = catalogue.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), catalogue.len());
    }

    #[test]
    fn management_tool_is_protected_and_hidden() {
        let catalogue = default_catalogue();
        let manage = catalogue.iter().find(|t| t.name == MANAGE_TOOLS).unwrap();
        assert!(manage.protected);
        assert!(manage.management_only);
        let protected: Vec<&str> = catalogue
            .iter()
            .filter(|t| t.protected)
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(protected, vec![MANAGE_TOOLS, "inspect"]);
    }

    #[test]
    fn every_category_is_populated() {
        let catalogue = default_catalogue();
        for category in ToolCategory::ALL {
            assert!(catalogue.iter().any(|t| t.category == category), "{} is empty", category);
        }
    }

    #[test]
    fn schemas_compile() {
        for descriptor in default_catalogue() {
            assert!(
                jsonschema::JSONSchema::compile(&descriptor.input_schema).is_ok(),
                "{} has an invalid schema",
                descriptor.name
            );
        }
    }
}
