//! Usage: Provider endpoint + client configuration for the Spotify OAuth flow.

use crate::shared::error::AppResult;
use reqwest::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub api_base_url: String,
}

impl ProviderEndpoints {
    pub(crate) fn profile_url(&self) -> String {
        format!("{}/me", self.api_base_url.trim().trim_end_matches('/'))
    }

    pub(crate) fn validate(&self) -> AppResult<()> {
        parse_http_url("authorize_url", &self.authorize_url)?;
        parse_http_url("token_url", &self.token_url)?;
        parse_http_url("api_base_url", &self.api_base_url)?;
        Ok(())
    }
}

/// Public (secret-less) client registered with the provider.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub endpoints: ProviderEndpoints,
}

impl OAuthClientConfig {
    pub(crate) fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }

    pub(crate) fn validate(&self) -> AppResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(
                "SEC_INVALID_INPUT: client_id is not configured (set SPOTIFY_CLIENT_ID or client_id in settings.json)"
                    .to_string()
                    .into(),
            );
        }
        parse_http_url("redirect_uri", &self.redirect_uri)?;
        self.endpoints.validate()
    }
}

pub(crate) fn parse_http_url(field: &str, raw: &str) -> AppResult<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| format!("SEC_INVALID_INPUT: invalid {field} '{raw}': {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("SEC_INVALID_INPUT: {field} must use http or https").into());
    }
    Ok(url)
}
