//! Usage: Fetch the current user's profile (`GET /me`) with a bounded refresh-and-retry.

use crate::infra::storage::{get_non_empty, KeyValueStore, KEY_ACCESS_TOKEN};
use crate::oauth::endpoints::OAuthClientConfig;
use crate::oauth::refresh::{refresh_stored_token, RetryPolicy};
use crate::oauth::token_exchange::parse_provider_error;
use crate::shared::error::{AppError, AppResult};
use crate::shared::security::sanitize_error_body_snippet;
use serde::{Deserialize, Serialize};

pub(crate) const CODE_ACCESS_TOKEN_MISSING: &str = "ACCESS_TOKEN_MISSING";
pub(crate) const CODE_INVALID_TOKEN: &str = "INVALID_TOKEN";
pub(crate) const CODE_API_ERROR: &str = "API_ERROR";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Followers {
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Image {
    pub url: String,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

/// Subset of the Web API user object. Unknown fields are ignored; absent ones default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
    pub product: Option<String>,
    pub uri: String,
    pub href: String,
    #[serde(rename = "type")]
    pub object_type: String,
    pub external_urls: ExternalUrls,
    pub followers: Followers,
    pub images: Vec<Image>,
}

impl UserProfile {
    pub(crate) fn primary_image(&self) -> Option<&Image> {
        self.images.first().filter(|img| !img.url.trim().is_empty())
    }
}

pub(crate) async fn fetch_profile(
    client: &reqwest::Client,
    profile_url: &str,
    access_token: &str,
) -> AppResult<UserProfile> {
    let response = client
        .get(profile_url)
        .bearer_auth(access_token.trim())
        .send()
        .await
        .map_err(|e| {
            AppError::new("SYSTEM_ERROR", format!("profile request failed: {e}")).with_source(e)
        })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("SYSTEM_ERROR: profile response read failed: {e}"))?;

    if !status.is_success() {
        let provider = parse_provider_error(status.as_u16(), &body);
        let code = if status.as_u16() == 401 {
            CODE_INVALID_TOKEN
        } else {
            CODE_API_ERROR
        };
        let message = format!(
            "profile request returned {provider} body={}",
            sanitize_error_body_snippet(&body)
        );
        return Err(AppError::new(code, message).with_provider_error(provider));
    }

    serde_json::from_str(&body)
        .map_err(|e| format!("SYSTEM_ERROR: profile response json invalid: {e}").into())
}

/// Fetches the profile with the stored access token.
///
/// When the request fails with an invalid-token error and `policy` allows it, the
/// stored refresh token is exchanged once and the request is repeated with the new
/// access token. A second failure is returned as-is. `on_refresh` is called with the
/// triggering error right before each refresh.
pub(crate) async fn fetch_profile_with_retry(
    client: &reqwest::Client,
    config: &OAuthClientConfig,
    store: &dyn KeyValueStore,
    policy: RetryPolicy,
    mut on_refresh: impl FnMut(&AppError),
) -> AppResult<UserProfile> {
    let mut access_token = get_non_empty(store, KEY_ACCESS_TOKEN)?.ok_or_else(|| {
        AppError::new(CODE_ACCESS_TOKEN_MISSING, "no access token in storage; log in first")
    })?;
    let profile_url = config.endpoints.profile_url();
    let mut retries_used = 0u32;

    loop {
        match fetch_profile(client, &profile_url, &access_token).await {
            Ok(profile) => return Ok(profile),
            Err(err) if policy.should_retry(retries_used, &err) => {
                retries_used += 1;
                tracing::info!(
                    code = err.code(),
                    attempt = retries_used,
                    "profile request rejected access token; refreshing"
                );
                on_refresh(&err);
                access_token = refresh_stored_token(client, config, store)
                    .await?
                    .access_token;
            }
            Err(err) => return Err(err),
        }
    }
}
