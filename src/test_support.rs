//! Usage: Public test helpers for integration tests.

use std::path::Path;

pub use crate::app::flow::{FlowConfig, FlowOutcome, FlowState, ProfileFlow};
pub use crate::app::render::render_profile;
pub use crate::infra::settings::{AppSettings, StorageKind};
pub use crate::infra::storage::{
    open_store, KeyValueStore, MemoryStore, KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_VERIFIER,
};
pub use crate::oauth::authorize::Navigator;
pub use crate::oauth::endpoints::{OAuthClientConfig, ProviderEndpoints};
pub use crate::oauth::pkce::code_challenge_s256;
pub use crate::oauth::profile::{ExternalUrls, Followers, Image, UserProfile};
pub use crate::oauth::token_exchange::OAuthTokenSet;
pub use crate::shared::error::{AppError, AppResult};

/// Settings pointing every provider endpoint at `base_url` (a local mock server).
pub fn settings_for_provider(base_url: &str, client_id: &str) -> AppSettings {
    let base_url = base_url.trim_end_matches('/');
    AppSettings {
        client_id: client_id.to_string(),
        authorize_url: format!("{base_url}/authorize"),
        token_url: format!("{base_url}/api/token"),
        api_base_url: format!("{base_url}/v1"),
        ..AppSettings::default()
    }
}

pub fn read_settings(path: &Path) -> AppResult<AppSettings> {
    crate::infra::settings::read(path)
}

pub fn app_home_dir_from(home: &Path, override_value: Option<&str>) -> std::path::PathBuf {
    crate::infra::app_paths::app_home_dir_from(home, override_value)
}

pub fn http_client() -> AppResult<reqwest::Client> {
    crate::oauth::http_client()
}
