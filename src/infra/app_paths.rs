//! Usage: Resolve the app data directory (supports $SPOTIFY_PROFILE_HOME).

use crate::shared::error::AppResult;
use std::path::{Path, PathBuf};

pub(crate) const ENV_APP_HOME: &str = "SPOTIFY_PROFILE_HOME";
const DEFAULT_DIR_NAME: &str = ".spotify-profile";
const SETTINGS_FILE_NAME: &str = "settings.json";
const STORAGE_FILE_NAME: &str = "storage.json";
const LOGS_DIR_NAME: &str = "logs";

fn home_dir() -> AppResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or_else(|| "SYSTEM_ERROR: failed to resolve home dir".to_string().into())
}

fn expand_tilde(home: &Path, raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim();
    if trimmed == "~" {
        return Some(home.to_path_buf());
    }

    let rest = trimmed
        .strip_prefix("~/")
        .or_else(|| trimmed.strip_prefix("~\\"));

    rest.map(|suffix| home.join(suffix))
}

fn resolve_under_home(home: &Path, raw: &str) -> PathBuf {
    if let Some(p) = expand_tilde(home, raw) {
        return p;
    }

    let candidate = PathBuf::from(raw.trim());
    if candidate.is_absolute() {
        return candidate;
    }

    home.join(candidate)
}

/// App dir for a given home and optional override value.
pub(crate) fn app_home_dir_from(home: &Path, override_value: Option<&str>) -> PathBuf {
    match override_value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => resolve_under_home(home, v),
        None => home.join(DEFAULT_DIR_NAME),
    }
}

pub(crate) fn app_home_dir() -> AppResult<PathBuf> {
    let home = home_dir()?;
    let raw = std::env::var(ENV_APP_HOME).ok();
    Ok(app_home_dir_from(&home, raw.as_deref()))
}

pub(crate) fn ensure_dir(dir: &Path) -> AppResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        format!(
            "SYSTEM_ERROR: failed to create directory {}: {e}",
            dir.display()
        )
        .into()
    })
}

pub(crate) fn settings_path(app_dir: &Path) -> PathBuf {
    app_dir.join(SETTINGS_FILE_NAME)
}

pub(crate) fn storage_path(app_dir: &Path) -> PathBuf {
    app_dir.join(STORAGE_FILE_NAME)
}

pub(crate) fn logs_dir(app_dir: &Path) -> PathBuf {
    app_dir.join(LOGS_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dir_lives_under_home() {
        let home = Path::new("/home/listener");
        assert_eq!(
            app_home_dir_from(home, None),
            PathBuf::from("/home/listener/.spotify-profile")
        );
        assert_eq!(
            app_home_dir_from(home, Some("   ")),
            PathBuf::from("/home/listener/.spotify-profile")
        );
    }

    #[test]
    fn override_expands_tilde_and_relative_paths() {
        let home = Path::new("/home/listener");
        assert_eq!(
            app_home_dir_from(home, Some("~/spotify")),
            PathBuf::from("/home/listener/spotify")
        );
        assert_eq!(
            app_home_dir_from(home, Some("data/spotify")),
            PathBuf::from("/home/listener/data/spotify")
        );
    }

    #[cfg(unix)]
    #[test]
    fn override_keeps_absolute_paths() {
        let home = Path::new("/home/listener");
        assert_eq!(
            app_home_dir_from(home, Some("/var/lib/spotify")),
            PathBuf::from("/var/lib/spotify")
        );
    }

    #[test]
    fn file_layout_is_stable() {
        let dir = Path::new("/tmp/app");
        assert_eq!(settings_path(dir), PathBuf::from("/tmp/app/settings.json"));
        assert_eq!(storage_path(dir), PathBuf::from("/tmp/app/storage.json"));
        assert_eq!(logs_dir(dir), PathBuf::from("/tmp/app/logs"));
    }
}
