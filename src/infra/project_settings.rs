//! Usage: Persisted per-project settings (publish targets) with atomic read/modify/write.

use crate::infra::app_paths;
use crate::shared::error::AppResult;
use crate::shared::mutex_ext::MutexExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SETTINGS_FILE_NAME: &str = "settings.json";

/// A named deployment profile; `configuration` is the pretty-printed JSON blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTarget {
    pub name: String,
    #[serde(rename = "type")]
    pub target_type: String,
    pub configuration: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    #[serde(default)]
    pub publish_targets: Vec<PublishTarget>,
    /// Keys owned by other parts of the authoring tool; preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// File-backed settings store rooted at the app data dir.
///
/// Writers go through [`ProjectSettingsStore::update`], which holds a process-wide lock for the
/// whole read/modify/write so two poll tasks finishing together cannot drop each other's target.
#[derive(Debug)]
pub struct ProjectSettingsStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ProjectSettingsStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn settings_path(&self, project_id: &str) -> AppResult<PathBuf> {
        validate_project_id(project_id)?;
        Ok(app_paths::project_dir(&self.data_dir, project_id).join(SETTINGS_FILE_NAME))
    }

    pub fn read(&self, project_id: &str) -> AppResult<ProjectSettings> {
        let path = self.settings_path(project_id)?;
        read_settings_file(&path)
    }

    pub fn update<F>(&self, project_id: &str, mutate: F) -> AppResult<ProjectSettings>
    where
        F: FnOnce(&mut ProjectSettings),
    {
        let path = self.settings_path(project_id)?;
        let _guard = self.write_lock.lock_or_recover();
        let mut settings = read_settings_file(&path)?;
        mutate(&mut settings);
        write_settings_file(&path, &settings)?;
        Ok(settings)
    }

    pub fn append_publish_target(
        &self,
        project_id: &str,
        target: PublishTarget,
    ) -> AppResult<ProjectSettings> {
        self.update(project_id, move |settings| {
            settings.publish_targets.push(target);
        })
    }
}

fn validate_project_id(project_id: &str) -> AppResult<()> {
    let trimmed = project_id.trim();
    if trimmed.is_empty() {
        return Err("SEC_INVALID_INPUT: project id is required".into());
    }
    if trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." {
        return Err("SEC_INVALID_INPUT: project id must not contain path separators".into());
    }
    Ok(())
}

fn read_settings_file(path: &Path) -> AppResult<ProjectSettings> {
    if !path.exists() {
        return Ok(ProjectSettings::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("SYSTEM_ERROR: failed to read project settings: {e}"))?;
    if content.trim().is_empty() {
        return Ok(ProjectSettings::default());
    }
    serde_json::from_str(&content)
        .map_err(|e| format!("SYSTEM_ERROR: failed to parse project settings: {e}").into())
}

fn write_settings_file(path: &Path, settings: &ProjectSettings) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("SYSTEM_ERROR: failed to create project dir: {e}"))?;
    }

    let tmp_path = path.with_file_name("settings.json.tmp");
    let backup_path = path.with_file_name("settings.json.bak");

    let content = serde_json::to_vec_pretty(settings)
        .map_err(|e| format!("SYSTEM_ERROR: failed to serialize project settings: {e}"))?;

    std::fs::write(&tmp_path, content)
        .map_err(|e| format!("SYSTEM_ERROR: failed to write temp settings file: {e}"))?;

    if backup_path.exists() {
        let _ = std::fs::remove_file(&backup_path);
    }

    if path.exists() {
        std::fs::rename(path, &backup_path)
            .map_err(|e| format!("SYSTEM_ERROR: failed to create settings backup: {e}"))?;
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::rename(&backup_path, path);
        return Err(format!("SYSTEM_ERROR: failed to finalize project settings: {e}").into());
    }

    if backup_path.exists() {
        let _ = std::fs::remove_file(&backup_path);
    }

    Ok(())
}
