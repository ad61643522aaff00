//! Usage: Refresh-token grant against stored credentials, plus the bounded retry policy used by profile fetches.

use crate::infra::storage::{get_non_empty, KeyValueStore, KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN};
use crate::oauth::endpoints::OAuthClientConfig;
use crate::oauth::token_exchange::{refresh_access_token, OAuthTokenSet, TokenRefreshRequest};
use crate::shared::error::{AppError, AppResult, ProviderError};
use crate::shared::security::mask_token;

pub(crate) const CODE_REFRESH_TOKEN_MISSING: &str = "REFRESH_TOKEN_MISSING";

/// Upper bound on refresh-and-retry cycles for a single request.
pub(crate) const MAX_REFRESH_RETRIES: u32 = 1;

/// True when the provider says the presented access token is unusable.
pub(crate) fn is_invalid_token_error(provider: &ProviderError) -> bool {
    if provider.status == 401 {
        return true;
    }
    if provider
        .code
        .as_deref()
        .is_some_and(|code| code.eq_ignore_ascii_case("invalid_token"))
    {
        return true;
    }
    provider.message.as_deref().is_some_and(|message| {
        let lower = message.to_ascii_lowercase();
        lower.contains("invalid access token") || lower.contains("access token expired")
    })
}

/// How often a failed request may be retried after refreshing the access token.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub(crate) max_retries: u32,
    pub(crate) is_token_invalid: fn(&ProviderError) -> bool,
}

impl RetryPolicy {
    pub(crate) fn new(max_retries: u32, is_token_invalid: fn(&ProviderError) -> bool) -> Self {
        Self {
            max_retries: max_retries.min(MAX_REFRESH_RETRIES),
            is_token_invalid,
        }
    }

    pub(crate) fn none() -> Self {
        Self::new(0, is_invalid_token_error)
    }

    pub(crate) fn refresh_once() -> Self {
        Self::new(1, is_invalid_token_error)
    }

    pub(crate) fn should_retry(&self, retries_used: u32, err: &AppError) -> bool {
        if retries_used >= self.max_retries {
            return false;
        }
        err.provider_error()
            .is_some_and(|provider| (self.is_token_invalid)(provider))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::refresh_once()
    }
}

/// Exchanges the stored refresh token and writes the new credentials back.
///
/// Returns the new access token. A rotated refresh token replaces the stored one;
/// otherwise the existing refresh token stays in place.
pub(crate) async fn refresh_stored_token(
    client: &reqwest::Client,
    config: &OAuthClientConfig,
    store: &dyn KeyValueStore,
) -> AppResult<OAuthTokenSet> {
    let refresh_token = get_non_empty(store, KEY_REFRESH_TOKEN)?.ok_or_else(|| {
        AppError::new(
            CODE_REFRESH_TOKEN_MISSING,
            "no refresh token in storage; log in again",
        )
    })?;

    let tokens = refresh_access_token(
        client,
        &TokenRefreshRequest {
            token_uri: config.endpoints.token_url.clone(),
            client_id: config.client_id.clone(),
            refresh_token,
        },
    )
    .await?;

    store.set(KEY_ACCESS_TOKEN, &tokens.access_token)?;
    if let Some(rotated) = tokens.refresh_token.as_deref() {
        store.set(KEY_REFRESH_TOKEN, rotated)?;
    }

    tracing::info!(
        access_token = %mask_token(&tokens.access_token),
        rotated_refresh_token = tokens.refresh_token.is_some(),
        "access token refreshed"
    );
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::storage::MemoryStore;
    use crate::oauth::endpoints::ProviderEndpoints;
    use mockito::Matcher;

    fn provider(status: u16, code: Option<&str>, message: Option<&str>) -> ProviderError {
        ProviderError {
            status,
            code: code.map(str::to_string),
            message: message.map(str::to_string),
        }
    }

    fn config_for(server_url: &str) -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: "client-1".to_string(),
            redirect_uri: "http://127.0.0.1:5173/callback".to_string(),
            scopes: Vec::new(),
            endpoints: ProviderEndpoints {
                authorize_url: format!("{server_url}/authorize"),
                token_url: format!("{server_url}/api/token"),
                api_base_url: format!("{server_url}/v1"),
            },
        }
    }

    #[test]
    fn invalid_token_detection() {
        assert!(is_invalid_token_error(&provider(401, None, None)));
        assert!(is_invalid_token_error(&provider(400, Some("invalid_token"), None)));
        assert!(is_invalid_token_error(&provider(
            400,
            None,
            Some("The access token expired")
        )));
        assert!(!is_invalid_token_error(&provider(403, None, Some("Insufficient client scope"))));
        assert!(!is_invalid_token_error(&provider(500, Some("server_error"), None)));
    }

    #[test]
    fn retry_policy_is_bounded_to_one_retry() {
        let policy = RetryPolicy::new(5, is_invalid_token_error);
        assert_eq!(policy.max_retries, 1);

        let err = AppError::new("INVALID_TOKEN", "expired").with_provider_error(provider(401, None, None));
        assert!(policy.should_retry(0, &err));
        assert!(!policy.should_retry(1, &err));
        assert!(!RetryPolicy::none().should_retry(0, &err));
    }

    #[test]
    fn retry_policy_ignores_non_token_errors() {
        let policy = RetryPolicy::refresh_once();
        let plain = AppError::new("SYSTEM_ERROR", "connection refused");
        assert!(!policy.should_retry(0, &plain));
        let server = AppError::new("API_ERROR", "boom").with_provider_error(provider(500, None, None));
        assert!(!policy.should_retry(0, &server));
    }

    #[tokio::test]
    async fn missing_refresh_token_is_reported() {
        let store = MemoryStore::new();
        let client = reqwest::Client::new();
        let err = refresh_stored_token(&client, &config_for("http://127.0.0.1:9"), &store)
            .await
            .expect_err("missing refresh token");
        assert_eq!(err.code(), CODE_REFRESH_TOKEN_MISSING);
    }

    #[tokio::test]
    async fn refresh_keeps_refresh_token_when_not_rotated() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "AQB-refresh".into()),
                Matcher::UrlEncoded("client_id".into(), "client-1".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"access_token":"BQA-new","token_type":"Bearer","expires_in":3600}"#)
            .create_async()
            .await;

        let store = MemoryStore::new();
        store.set(KEY_ACCESS_TOKEN, "BQA-old").expect("set");
        store.set(KEY_REFRESH_TOKEN, "AQB-refresh").expect("set");
        let client = reqwest::Client::new();

        let tokens = refresh_stored_token(&client, &config_for(&server.url()), &store)
            .await
            .expect("refresh");

        mock.assert_async().await;
        assert_eq!(tokens.access_token, "BQA-new");
        assert_eq!(store.get(KEY_ACCESS_TOKEN).expect("get").as_deref(), Some("BQA-new"));
        assert_eq!(store.get(KEY_REFRESH_TOKEN).expect("get").as_deref(), Some("AQB-refresh"));
    }

    #[tokio::test]
    async fn refresh_stores_rotated_refresh_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/token")
            .with_status(200)
            .with_body(r#"{"access_token":"BQA-new","refresh_token":"AQB-rotated","expires_in":3600}"#)
            .create_async()
            .await;

        let store = MemoryStore::new();
        store.set(KEY_REFRESH_TOKEN, "AQB-refresh").expect("set");
        let client = reqwest::Client::new();
        refresh_stored_token(&client, &config_for(&server.url()), &store)
            .await
            .expect("refresh");

        assert_eq!(store.get(KEY_REFRESH_TOKEN).expect("get").as_deref(), Some("AQB-rotated"));
    }
}
