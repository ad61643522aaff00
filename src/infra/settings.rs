//! Usage: Persisted application settings (schema + read/write helpers + env overrides).

use crate::shared::error::AppResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub(crate) const SCHEMA_VERSION: u32 = 1;
pub(crate) const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:5173/callback";
pub(crate) const SPOTIFY_AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
pub(crate) const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub(crate) const SPOTIFY_API_BASE_URL: &str = "https://api.spotify.com/v1";
pub(crate) const MIN_VERIFIER_LENGTH: usize = 43;
pub(crate) const MAX_VERIFIER_LENGTH: usize = 128;
pub(crate) const DEFAULT_VERIFIER_LENGTH: usize = 128;
pub(crate) const DEFAULT_CALLBACK_TIMEOUT_SECONDS: u64 = 300;
const MAX_CALLBACK_TIMEOUT_SECONDS: u64 = 60 * 60;
const DEFAULT_SCOPES: &[&str] = &["user-read-private", "user-read-email"];
const DEFAULT_LOG_LEVEL: &str = "info";

pub(crate) const ENV_CLIENT_ID: &str = "SPOTIFY_CLIENT_ID";
pub(crate) const ENV_REDIRECT_URI: &str = "SPOTIFY_REDIRECT_URI";

/// Where the verifier and tokens live between steps of the flow.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// In-process only; gone when the process exits.
    Session,
    /// JSON file in the app data dir; survives restarts.
    #[default]
    Local,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::Session => "session",
            StorageKind::Local => "local",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub schema_version: u32,
    pub client_id: String,
    // Must match the value registered for the client in the Spotify dashboard.
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub storage: StorageKind,
    pub refresh_on_expiry: bool,
    pub authorize_url: String,
    pub token_url: String,
    pub api_base_url: String,
    pub verifier_length: usize,
    pub callback_timeout_seconds: u64,
    pub log_level: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            client_id: String::new(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            storage: StorageKind::default(),
            refresh_on_expiry: true,
            authorize_url: SPOTIFY_AUTHORIZE_URL.to_string(),
            token_url: SPOTIFY_TOKEN_URL.to_string(),
            api_base_url: SPOTIFY_API_BASE_URL.to_string(),
            verifier_length: DEFAULT_VERIFIER_LENGTH,
            callback_timeout_seconds: DEFAULT_CALLBACK_TIMEOUT_SECONDS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

fn sanitize_verifier_length(settings: &mut AppSettings) -> bool {
    let clamped = settings
        .verifier_length
        .clamp(MIN_VERIFIER_LENGTH, MAX_VERIFIER_LENGTH);
    if clamped != settings.verifier_length {
        settings.verifier_length = clamped;
        return true;
    }
    false
}

fn sanitize_callback_timeout(settings: &mut AppSettings) -> bool {
    if settings.callback_timeout_seconds == 0 {
        settings.callback_timeout_seconds = DEFAULT_CALLBACK_TIMEOUT_SECONDS;
        return true;
    }
    if settings.callback_timeout_seconds > MAX_CALLBACK_TIMEOUT_SECONDS {
        settings.callback_timeout_seconds = MAX_CALLBACK_TIMEOUT_SECONDS;
        return true;
    }
    false
}

fn sanitize_scopes(settings: &mut AppSettings) -> bool {
    let cleaned: Vec<String> = settings
        .scopes
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if cleaned != settings.scopes {
        settings.scopes = cleaned;
        return true;
    }
    false
}

fn sanitize_endpoints(settings: &mut AppSettings) -> bool {
    let mut changed = false;
    let defaults = [
        (&mut settings.authorize_url, SPOTIFY_AUTHORIZE_URL),
        (&mut settings.token_url, SPOTIFY_TOKEN_URL),
        (&mut settings.api_base_url, SPOTIFY_API_BASE_URL),
    ];
    for (value, default) in defaults {
        if value.trim().is_empty() {
            *value = default.to_string();
            changed = true;
        }
    }
    changed
}

fn migrate_bump_schema_version(settings: &mut AppSettings, schema_version_present: bool) -> bool {
    if schema_version_present && settings.schema_version >= SCHEMA_VERSION {
        return false;
    }
    settings.schema_version = SCHEMA_VERSION;
    true
}

fn parse_settings_json(content: &str) -> AppResult<(AppSettings, bool)> {
    let raw: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| format!("SEC_INVALID_INPUT: failed to parse settings.json: {e}"))?;
    let schema_version_present = raw.get("schema_version").is_some();
    let settings: AppSettings = serde_json::from_value(raw)
        .map_err(|e| format!("SEC_INVALID_INPUT: failed to parse settings.json: {e}"))?;
    Ok((settings, schema_version_present))
}

/// Reads settings, creating a default file on first use and repairing out-of-range values.
pub(crate) fn read(path: &Path) -> AppResult<AppSettings> {
    if !path.exists() {
        let settings = AppSettings::default();
        // Best-effort: make the config discoverable/editable.
        if let Err(err) = write(path, &settings) {
            tracing::warn!(path = %path.display(), "failed to create default settings: {}", err);
        }
        return Ok(settings);
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("SYSTEM_ERROR: failed to read settings: {e}"))?;
    let (mut settings, schema_version_present) = parse_settings_json(&content)?;

    let mut repaired = false;
    repaired |= migrate_bump_schema_version(&mut settings, schema_version_present);
    repaired |= sanitize_verifier_length(&mut settings);
    repaired |= sanitize_callback_timeout(&mut settings);
    repaired |= sanitize_scopes(&mut settings);
    repaired |= sanitize_endpoints(&mut settings);
    if repaired {
        tracing::info!(path = %path.display(), "settings repaired on read");
        let _ = write(path, &settings);
    }

    Ok(settings)
}

pub(crate) fn write(path: &Path, settings: &AppSettings) -> AppResult<AppSettings> {
    if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&settings.verifier_length) {
        return Err(format!(
            "SEC_INVALID_INPUT: verifier_length must be between {MIN_VERIFIER_LENGTH} and {MAX_VERIFIER_LENGTH}"
        )
        .into());
    }
    if settings.callback_timeout_seconds == 0 {
        return Err("SEC_INVALID_INPUT: callback_timeout_seconds must be >= 1".into());
    }
    if settings.callback_timeout_seconds > MAX_CALLBACK_TIMEOUT_SECONDS {
        return Err(format!(
            "SEC_INVALID_INPUT: callback_timeout_seconds must be <= {MAX_CALLBACK_TIMEOUT_SECONDS}"
        )
        .into());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("SYSTEM_ERROR: failed to create settings dir: {e}"))?;
    }

    let tmp_path = path.with_file_name("settings.json.tmp");
    let backup_path = path.with_file_name("settings.json.bak");

    let content = serde_json::to_vec_pretty(settings)
        .map_err(|e| format!("SYSTEM_ERROR: failed to serialize settings: {e}"))?;

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
        return Err(format!("SYSTEM_ERROR: failed to finalize settings: {e}").into());
    }

    if backup_path.exists() {
        let _ = std::fs::remove_file(&backup_path);
    }

    Ok(settings.clone())
}

/// Applies `SPOTIFY_CLIENT_ID` / `SPOTIFY_REDIRECT_URI` style overrides.
///
/// `lookup` abstracts the environment so callers can pass `std::env::var(..).ok()`
/// in production and a fixed map in tests.
pub(crate) fn apply_env_overrides(settings: &mut AppSettings, lookup: impl Fn(&str) -> Option<String>) {
    let non_empty = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    if let Some(client_id) = non_empty(ENV_CLIENT_ID) {
        settings.client_id = client_id;
    }
    if let Some(redirect_uri) = non_empty(ENV_REDIRECT_URI) {
        settings.redirect_uri = redirect_uri;
    }
}
