#![allow(dead_code)]

use spotify_profile_lib::test_support::{
    settings_for_provider, AppResult, FlowConfig, KeyValueStore, Navigator, ProfileFlow,
};
use std::sync::Mutex;

pub const CLIENT_ID: &str = "client-test";

pub const PROFILE_JSON: &str = r#"{
    "display_name": "Jane",
    "email": "jane@example.com",
    "external_urls": {"spotify": "https://open.spotify.com/user/jane"},
    "followers": {"href": null, "total": 3},
    "href": "https://api.spotify.com/v1/users/jane",
    "id": "jane",
    "images": [],
    "type": "user",
    "uri": "spotify:user:jane"
}"#;

pub const EXPIRED_JSON: &str =
    r#"{"error": {"status": 401, "message": "The access token expired"}}"#;

/// Records every URL the flow navigates to instead of opening a browser.
#[derive(Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().expect("lock visited").clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &reqwest::Url) -> AppResult<()> {
        self.visited
            .lock()
            .expect("lock visited")
            .push(url.to_string());
        Ok(())
    }
}

pub fn flow_config(server_url: &str, refresh_on_expiry: bool) -> FlowConfig {
    let mut settings = settings_for_provider(server_url, CLIENT_ID);
    settings.refresh_on_expiry = refresh_on_expiry;
    FlowConfig::from_settings(&settings).expect("flow config")
}

pub fn flow<'a>(
    config: FlowConfig,
    store: &'a dyn KeyValueStore,
    navigator: &'a dyn Navigator,
) -> ProfileFlow<'a> {
    ProfileFlow::new(config, reqwest::Client::new(), store, navigator)
}
