//! Usage: Spotify OAuth (Authorization Code + PKCE) building blocks.
//!
//! Each step takes its collaborators explicitly (HTTP client, config, key-value
//! store, navigator) so the flow in `app::flow` can be driven against test doubles.

pub(crate) mod authorize;
pub(crate) mod callback_server;
pub(crate) mod endpoints;
pub(crate) mod pkce;
pub(crate) mod profile;
pub(crate) mod refresh;
pub(crate) mod token_exchange;

use crate::shared::error::AppResult;
use std::time::Duration;

pub(crate) fn http_client() -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(format!("spotify-profile/{}", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| format!("SYSTEM_ERROR: oauth client init failed: {e}").into())
}
