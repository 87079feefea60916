//! Usage: Resolve and create the app data directory (`~/.composer-hub` unless overridden).

use crate::shared::error::AppResult;
use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "COMPOSER_HUB_DATA_DIR";
const DEFAULT_DOTDIR_NAME: &str = ".composer-hub";

/// Resolution order: explicit override, `COMPOSER_HUB_DATA_DIR`, then `~/.composer-hub`.
pub fn app_data_dir(override_dir: Option<&Path>) -> AppResult<PathBuf> {
    let dir = resolve_data_dir(override_dir, |key| std::env::var_os(key).map(PathBuf::from))?;
    std::fs::create_dir_all(&dir).map_err(|e| {
        format!(
            "SYSTEM_ERROR: failed to create data dir {}: {e}",
            dir.display()
        )
    })?;
    Ok(dir)
}

fn resolve_data_dir(
    override_dir: Option<&Path>,
    get_env: impl Fn(&str) -> Option<PathBuf>,
) -> AppResult<PathBuf> {
    if let Some(dir) = override_dir.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = get_env(DATA_DIR_ENV).filter(|p| !p.as_os_str().is_empty()) {
        return Ok(dir);
    }
    let home = dirs::home_dir()
        .ok_or_else(|| "SYSTEM_ERROR: unable to resolve home directory".to_string())?;
    Ok(home.join(DEFAULT_DOTDIR_NAME))
}

pub(crate) fn logs_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

pub(crate) fn project_dir(data_dir: &Path, project_id: &str) -> PathBuf {
    data_dir.join("projects").join(project_id)
}
