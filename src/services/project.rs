//! Local project files
//!
//! Project path resolution and the INI reader behind the disk fallback of
//! `get_project_settings`.

use crate::error::{RelayError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::debug;

static CATEGORY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("Invalid regex pattern"));

/// Platform folders under `Saved/Config`, searched in order
const SAVED_PLATFORMS: &[&str] = &["WindowsEditor", "Windows", "Mac", "Linux"];

/// Where the engine install and the project live on this machine
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectConfig {
    pub project_path: Option<PathBuf>,
    pub engine_path: Option<PathBuf>,
    pub build_timeout: Duration,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            project_path: None,
            engine_path: None,
            build_timeout: Duration::from_secs(1800),
        }
    }
}

impl ProjectConfig {
    /// UnrealBuildTool under the engine install, or the bare name for a PATH lookup
    pub fn build_tool(&self) -> PathBuf {
        self.engine_path
            .as_ref()
            .map(|root| {
                root.join("Engine")
                    .join("Binaries")
                    .join("DotNET")
                    .join("UnrealBuildTool")
                    .join("UnrealBuildTool.exe")
            })
            .filter(|path| path.exists())
            .unwrap_or_else(|| PathBuf::from("UnrealBuildTool"))
    }
}

/// Check a caller-supplied project path: absolute, no `..`, existing,
/// and either a directory or a `.uproject` file
pub fn validate_project_path(raw: &str) -> Result<PathBuf> {
    let path = PathBuf::from(raw.trim());
    if raw.trim().is_empty() {
        return Err(RelayError::validation("Project path must be a non-empty string"));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(RelayError::validation(
            "Directory traversal (..) is not allowed in project path",
        ));
    }
    if !path.is_absolute() {
        return Err(RelayError::validation("Project path must be an absolute path"));
    }
    if !path.exists() {
        return Err(RelayError::validation(format!(
            "Project path does not exist: {}",
            path.display()
        )));
    }
    if !path.is_dir() && !is_uproject(&path) {
        return Err(RelayError::validation("Project path must be a directory or .uproject file"));
    }
    Ok(path)
}

/// The `.uproject` file for a project path. Directories are searched one level deep.
pub fn find_uproject(project: &Path) -> Result<PathBuf> {
    if is_uproject(project) {
        return Ok(project.to_path_buf());
    }
    let entries = std::fs::read_dir(project).map_err(|e| {
        RelayError::validation(format!("Could not read project directory {}: {}", project.display(), e))
    })?;
    let found = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .find(|path| is_uproject(path));
    Ok(found.unwrap_or_else(|| project.to_path_buf()))
}

fn is_uproject(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("uproject"))
}

/// Settings category with any `Default` prefix removed
pub fn normalize_category(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let category = trimmed.strip_prefix("Default").unwrap_or(trimmed);
    if !CATEGORY_PATTERN.is_match(category) {
        return Err(RelayError::validation(format!("Invalid settings category: '{}'", raw)));
    }
    Ok(category.to_string())
}

/// Parse INI text into `{section: {key: value}}`. Comment lines start with
/// `;` or `#`. Keys outside any section are ignored.
pub fn parse_ini(text: &str) -> Map<String, Value> {
    let mut sections = Map::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            let name = line[1..line.len() - 1].to_string();
            sections.insert(name.clone(), Value::Object(Map::new()));
            current = Some(name);
            continue;
        }
        let (Some(section), Some((key, value))) = (current.as_ref(), line.split_once('=')) else {
            continue;
        };
        if let Some(Value::Object(entries)) = sections.get_mut(section) {
            entries.insert(key.trim().to_string(), Value::String(value.trim().to_string()));
        }
    }

    sections
}

/// Candidate files for a category, most authoritative first
pub fn settings_candidates(project: &Path, category: &str) -> Vec<PathBuf> {
    let root = if is_uproject(project) {
        project.parent().unwrap_or(project)
    } else {
        project
    };
    let mut candidates = vec![root.join("Config").join(format!("Default{}.ini", category))];
    candidates.extend(
        SAVED_PLATFORMS
            .iter()
            .map(|platform| root.join("Saved").join("Config").join(platform).join(format!("{}.ini", category))),
    );
    candidates
}

/// Settings of one category read from disk. The first readable file with
/// at least one section wins; an empty map means nothing was found.
pub async fn read_project_settings(project: &Path, category: &str) -> Result<Map<String, Value>> {
    let category = normalize_category(category)?;
    for candidate in settings_candidates(project, &category) {
        match tokio::fs::read_to_string(&candidate).await {
            Ok(text) => {
                let sections = parse_ini(&text);
                if !sections.is_empty() {
                    debug!("Read project settings from {}", candidate.display());
                    return Ok(sections);
                }
            }
            Err(e) => debug!("Skipping {}: {}", candidate.display(), e),
        }
    }
    Ok(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn ini_sections_and_comments() {
        let parsed = parse_ini(
            "; header\norphan=1\n[/Script/Engine.RendererSettings]\nr.Lumen = True\n# note\nurl=http://host/?a=b\n\n[Empty]\n",
        );
        assert_eq!(
            Value::Object(parsed),
            json!({
                "/Script/Engine.RendererSettings": { "r.Lumen": "True", "url": "http://host/?a=b" },
                "Empty": {}
            })
        );
    }

    #[test]
    fn category_prefix_is_stripped_and_checked() {
        assert_eq!(normalize_category("DefaultEngine").unwrap(), "Engine");
        assert_eq!(normalize_category("Game").unwrap(), "Game");
        assert!(normalize_category("../Engine").is_err());
        assert!(normalize_category("Default").is_err());
    }

    #[test]
    fn relative_and_traversing_paths_are_rejected() {
        assert!(validate_project_path("Projects/Game").is_err());
        assert!(validate_project_path("/tmp/../etc").is_err());
        assert!(validate_project_path("").is_err());
    }

    #[test]
    fn project_directory_resolves_to_uproject() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Game.uproject"), "{}").unwrap();

        let validated = validate_project_path(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(find_uproject(&validated).unwrap(), dir.path().join("Game.uproject"));
    }

    #[test]
    fn missing_engine_binary_uses_path_lookup() {
        let dir = TempDir::new().unwrap();
        let config = ProjectConfig {
            engine_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(config.build_tool(), PathBuf::from("UnrealBuildTool"));
    }

    #[tokio::test]
    async fn saved_config_is_used_when_default_is_missing() {
        let dir = TempDir::new().unwrap();
        let saved = dir.path().join("Saved").join("Config").join("Linux");
        std::fs::create_dir_all(&saved).unwrap();
        std::fs::write(saved.join("Game.ini"), "[/Script/Game]\nMaxPlayers=8\n").unwrap();

        let settings = read_project_settings(dir.path(), "DefaultGame").await.unwrap();
        assert_eq!(settings["/Script/Game"]["MaxPlayers"], "8");

        let none = read_project_settings(dir.path(), "Input").await.unwrap();
        assert!(none.is_empty());
    }
}
