//! Usage: Discover `*luis.settings*` files under a bot's dialog tree and merge their app ids.

use crate::shared::error::AppResult;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub const DIALOGS_DIR_NAME: &str = "ComposerDialogs";

static SETTINGS_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"luis\.settings").expect("valid settings file pattern"));

#[derive(Debug, Deserialize)]
struct LuisSettingsFile {
    #[serde(default)]
    luis: HashMap<String, LuisAppEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LuisAppEntry {
    #[serde(default)]
    app_id: Option<String>,
}

/// Sorted list of matching files; a missing directory yields an empty list.
pub fn find_settings_files(dialogs_dir: &Path) -> AppResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    if !dialogs_dir.exists() {
        return Ok(found);
    }
    collect(dialogs_dir, &mut found)?;
    found.sort();
    Ok(found)
}

fn collect(dir: &Path, found: &mut Vec<PathBuf>) -> AppResult<()> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("SYSTEM_ERROR: failed to read dir {}: {e}", dir.display()))?;
    for entry in entries {
        let entry =
            entry.map_err(|e| format!("SYSTEM_ERROR: failed to read dir entry: {e}"))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| format!("SYSTEM_ERROR: failed to stat {}: {e}", path.display()))?;
        if file_type.is_dir() {
            collect(&path, found)?;
        } else if file_type.is_file()
            && SETTINGS_NAME.is_match(&entry.file_name().to_string_lossy())
        {
            found.push(path);
        }
    }
    Ok(())
}

/// Merges every file's `luis` map into `dialogKey -> appId`; later files win on duplicates.
pub fn read_app_ids(files: &[PathBuf]) -> AppResult<BTreeMap<String, String>> {
    let mut merged = BTreeMap::new();
    for path in files {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("SYSTEM_ERROR: failed to read {}: {e}", path.display()))?;
        let parsed: LuisSettingsFile = serde_json::from_str(&content).map_err(|e| {
            format!("SEC_INVALID_INPUT: invalid luis settings {}: {e}", path.display())
        })?;
        for (dialog_key, entry) in parsed.luis {
            match entry.app_id.filter(|id| !id.trim().is_empty()) {
                Some(app_id) => {
                    merged.insert(dialog_key, app_id);
                }
                None => tracing::warn!(
                    file = %path.display(),
                    dialog = %dialog_key,
                    "luis settings entry has no appId; skipped"
                ),
            }
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_nested_settings_files_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dialogs = dir.path().join(DIALOGS_DIR_NAME);
        std::fs::create_dir_all(dialogs.join("generated")).expect("mkdir");
        std::fs::write(dialogs.join("generated/luis.settings.dev.westus.json"), "{}").expect("w");
        std::fs::write(dialogs.join("main.dialog"), "{}").expect("w");
        std::fs::write(dialogs.join("luis-settings.json"), "{}").expect("w");

        let files = find_settings_files(&dialogs).expect("scan");
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("generated/luis.settings.dev.westus.json"));
    }

    #[test]
    fn missing_dir_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let files = find_settings_files(&dir.path().join("nope")).expect("scan");
        assert!(files.is_empty());
    }

    #[test]
    fn merges_app_ids_and_skips_blank() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.luis.settings.json");
        let b = dir.path().join("b.luis.settings.json");
        std::fs::write(
            &a,
            r#"{"luis":{"Main_en-us_lu":{"appId":"app-1","version":"0.1"},"Empty_lu":{"appId":""}}}"#,
        )
        .expect("w");
        std::fs::write(&b, r#"{"luis":{"Help_en-us_lu":{"appId":"app-2"}}}"#).expect("w");

        let merged = read_app_ids(&[a, b]).expect("merge");
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["Main_en-us_lu"], "app-1");
        assert_eq!(merged["Help_en-us_lu"], "app-2");
    }
}
