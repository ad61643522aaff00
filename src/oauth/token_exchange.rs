//! Usage: Token endpoint helpers (authorization_code + refresh_token grants) and provider error parsing.

use crate::infra::storage::{
    get_non_empty, KeyValueStore, KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_VERIFIER,
};
use crate::oauth::endpoints::OAuthClientConfig;
use crate::shared::error::{AppError, AppResult, ProviderError};
use crate::shared::security::{mask_token, sanitize_error_body_snippet};
use crate::shared::time::now_unix_seconds;
use serde_json::Value;
use std::collections::HashMap;

pub(crate) const CODE_TOKEN_EXCHANGE_REJECTED: &str = "TOKEN_EXCHANGE_REJECTED";
pub(crate) const CODE_TOKEN_REFRESH_REJECTED: &str = "TOKEN_REFRESH_REJECTED";
pub(crate) const CODE_VERIFIER_MISSING: &str = "VERIFIER_MISSING";

#[derive(Debug, Clone)]
pub(crate) struct TokenExchangeRequest {
    pub(crate) token_uri: String,
    pub(crate) client_id: String,
    pub(crate) code: String,
    pub(crate) redirect_uri: String,
    pub(crate) code_verifier: String,
}

#[derive(Debug, Clone)]
pub(crate) struct TokenRefreshRequest {
    pub(crate) token_uri: String,
    pub(crate) client_id: String,
    pub(crate) refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthTokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub scope: Option<String>,
}

pub(crate) async fn exchange_authorization_code(
    client: &reqwest::Client,
    req: &TokenExchangeRequest,
) -> AppResult<OAuthTokenSet> {
    let mut form: HashMap<&str, String> = HashMap::new();
    form.insert("grant_type", "authorization_code".to_string());
    form.insert("code", req.code.trim().to_string());
    form.insert("redirect_uri", req.redirect_uri.trim().to_string());
    form.insert("client_id", req.client_id.trim().to_string());
    form.insert("code_verifier", req.code_verifier.trim().to_string());

    let response = client
        .post(req.token_uri.trim())
        .form(&form)
        .send()
        .await
        .map_err(|e| {
            AppError::new("SYSTEM_ERROR", format!("oauth token exchange request failed: {e}"))
                .with_source(e)
        })?;

    parse_token_response(response, CODE_TOKEN_EXCHANGE_REJECTED).await
}

pub(crate) async fn refresh_access_token(
    client: &reqwest::Client,
    req: &TokenRefreshRequest,
) -> AppResult<OAuthTokenSet> {
    let mut form: HashMap<&str, String> = HashMap::new();
    form.insert("grant_type", "refresh_token".to_string());
    form.insert("refresh_token", req.refresh_token.trim().to_string());
    form.insert("client_id", req.client_id.trim().to_string());

    let response = client
        .post(req.token_uri.trim())
        .form(&form)
        .send()
        .await
        .map_err(|e| {
            AppError::new("SYSTEM_ERROR", format!("oauth refresh request failed: {e}")).with_source(e)
        })?;

    parse_token_response(response, CODE_TOKEN_REFRESH_REJECTED).await
}

/// Exchanges `code` using the verifier left in `store` by the redirect step.
///
/// The verifier is removed once the request has been sent, whatever the outcome:
/// authorization codes are single-use, so a verifier is never presented twice.
pub(crate) async fn exchange_code_with_store(
    client: &reqwest::Client,
    config: &OAuthClientConfig,
    store: &dyn KeyValueStore,
    code: &str,
) -> AppResult<OAuthTokenSet> {
    let code_verifier = get_non_empty(store, KEY_VERIFIER)?.ok_or_else(|| {
        AppError::new(
            CODE_VERIFIER_MISSING,
            "no pkce code verifier in storage; restart the login flow",
        )
    })?;

    let request = TokenExchangeRequest {
        token_uri: config.endpoints.token_url.clone(),
        client_id: config.client_id.clone(),
        code: code.to_string(),
        redirect_uri: config.redirect_uri.clone(),
        code_verifier,
    };
    let result = exchange_authorization_code(client, &request).await;

    if let Err(err) = store.remove(KEY_VERIFIER) {
        tracing::warn!("failed to discard used pkce verifier: {}", err);
    }

    let tokens = result?;
    persist_tokens(store, &tokens)?;
    tracing::info!(
        access_token = %mask_token(&tokens.access_token),
        has_refresh_token = tokens.refresh_token.is_some(),
        expires_at = tokens.expires_at,
        scope = tokens.scope.as_deref().unwrap_or_default(),
        "oauth token exchange succeeded"
    );
    Ok(tokens)
}

fn persist_tokens(store: &dyn KeyValueStore, tokens: &OAuthTokenSet) -> AppResult<()> {
    store.set(KEY_ACCESS_TOKEN, &tokens.access_token)?;
    match tokens.refresh_token.as_deref() {
        Some(refresh_token) => store.set(KEY_REFRESH_TOKEN, refresh_token),
        // A refresh token from an older grant does not belong to this access token.
        None => store.remove(KEY_REFRESH_TOKEN),
    }
}

async fn parse_token_response(
    response: reqwest::Response,
    rejected_code: &'static str,
) -> AppResult<OAuthTokenSet> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("SYSTEM_ERROR: oauth token response read failed: {e}"))?;

    if !status.is_success() {
        let provider = parse_provider_error(status.as_u16(), &body);
        let message = format!(
            "token endpoint returned {provider} body={}",
            sanitize_error_body_snippet(&body)
        );
        tracing::warn!(code = rejected_code, status = status.as_u16(), "oauth token request rejected");
        return Err(AppError::new(rejected_code, message).with_provider_error(provider));
    }

    let value: Value = serde_json::from_str(&body)
        .map_err(|e| format!("SYSTEM_ERROR: oauth token response json invalid: {e}"))?;

    let access_token = non_empty_str(&value, "access_token")
        .ok_or_else(|| "SYSTEM_ERROR: oauth token response missing access_token".to_string())?;
    let refresh_token = non_empty_str(&value, "refresh_token");
    let scope = non_empty_str(&value, "scope");

    let expires_in = value.get("expires_in").and_then(parse_i64_lossy);
    let now = now_unix_seconds();
    let expires_at = expires_in.and_then(|v| {
        if v <= 0 {
            None
        } else {
            Some(now.saturating_add(v))
        }
    });

    Ok(OAuthTokenSet {
        access_token,
        refresh_token,
        expires_at,
        scope,
    })
}

fn non_empty_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_i64_lossy(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Extracts `{error, error_description}` or `{error: {status, message}}` from an error body.
pub(crate) fn parse_provider_error(status: u16, body: &str) -> ProviderError {
    let mut provider = ProviderError {
        status,
        code: None,
        message: None,
    };
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return provider,
    };

    provider.code = non_empty_str(&value, "code");
    provider.message = non_empty_str(&value, "error_description");

    if let Some(error_value) = value.get("error") {
        if let Some(err_str) = error_value.as_str() {
            if provider.code.is_none() {
                provider.code = Some(err_str.trim().to_string()).filter(|v| !v.is_empty());
            }
        } else if error_value.is_object() {
            if provider.code.is_none() {
                provider.code =
                    non_empty_str(error_value, "code").or_else(|| non_empty_str(error_value, "type"));
            }
            if provider.message.is_none() {
                provider.message = non_empty_str(error_value, "message");
            }
        }
    }

    provider
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::storage::MemoryStore;
    use crate::oauth::endpoints::ProviderEndpoints;
    use mockito::Matcher;

    fn config_for(server_url: &str) -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: "client-1".to_string(),
            redirect_uri: "http://127.0.0.1:5173/callback".to_string(),
            scopes: vec!["user-read-private".to_string()],
            endpoints: ProviderEndpoints {
                authorize_url: format!("{server_url}/authorize"),
                token_url: format!("{server_url}/api/token"),
                api_base_url: format!("{server_url}/v1"),
            },
        }
    }

    #[test]
    fn parse_i64_lossy_supports_number_and_string() {
        assert_eq!(parse_i64_lossy(&Value::from(3600)), Some(3600));
        assert_eq!(parse_i64_lossy(&Value::from("3600")), Some(3600));
        assert_eq!(parse_i64_lossy(&Value::from("x")), None);
    }

    #[test]
    fn parse_provider_error_supports_oauth_standard_fields() {
        let provider = parse_provider_error(
            400,
            r#"{"error": "invalid_grant", "error_description": "Invalid authorization code"}"#,
        );
        assert_eq!(provider.status, 400);
        assert_eq!(provider.code.as_deref(), Some("invalid_grant"));
        assert_eq!(provider.message.as_deref(), Some("Invalid authorization code"));
    }

    #[test]
    fn parse_provider_error_supports_web_api_shape() {
        let provider = parse_provider_error(
            401,
            r#"{"error": {"status": 401, "message": "The access token expired"}}"#,
        );
        assert_eq!(provider.status, 401);
        assert_eq!(provider.code, None);
        assert_eq!(provider.message.as_deref(), Some("The access token expired"));
    }

    #[test]
    fn parse_provider_error_tolerates_non_json() {
        let provider = parse_provider_error(502, "<html>Bad gateway</html>");
        assert_eq!(provider.status, 502);
        assert_eq!(provider.code, None);
        assert_eq!(provider.message, None);
    }

    #[tokio::test]
    async fn exchange_sends_pkce_form_and_persists_tokens() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "auth-code-1".into()),
                Matcher::UrlEncoded("client_id".into(), "client-1".into()),
                Matcher::UrlEncoded(
                    "redirect_uri".into(),
                    "http://127.0.0.1:5173/callback".into(),
                ),
                Matcher::UrlEncoded("code_verifier".into(), "stored-verifier".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"BQA-access","token_type":"Bearer","scope":"user-read-private","expires_in":3600,"refresh_token":"AQB-refresh"}"#,
            )
            .create_async()
            .await;

        let store = MemoryStore::new();
        store.set(KEY_VERIFIER, "stored-verifier").expect("set");
        let client = reqwest::Client::new();

        let tokens = exchange_code_with_store(&client, &config_for(&server.url()), &store, "auth-code-1")
            .await
            .expect("exchange");

        mock.assert_async().await;
        assert_eq!(tokens.access_token, "BQA-access");
        assert_eq!(tokens.refresh_token.as_deref(), Some("AQB-refresh"));
        assert_eq!(tokens.scope.as_deref(), Some("user-read-private"));
        assert!(tokens.expires_at.is_some());
        assert_eq!(store.get(KEY_ACCESS_TOKEN).expect("get").as_deref(), Some("BQA-access"));
        assert_eq!(store.get(KEY_REFRESH_TOKEN).expect("get").as_deref(), Some("AQB-refresh"));
        assert_eq!(store.get(KEY_VERIFIER).expect("get"), None);
    }

    #[tokio::test]
    async fn exchange_without_verifier_fails_before_any_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/token")
            .expect(0)
            .create_async()
            .await;

        let store = MemoryStore::new();
        let client = reqwest::Client::new();
        let err = exchange_code_with_store(&client, &config_for(&server.url()), &store, "code")
            .await
            .expect_err("no verifier");

        assert_eq!(err.code(), CODE_VERIFIER_MISSING);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_exchange_surfaces_error_and_description() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant","error_description":"code_verifier was incorrect"}"#)
            .create_async()
            .await;

        let store = MemoryStore::new();
        store.set(KEY_VERIFIER, "wrong-verifier").expect("set");
        let client = reqwest::Client::new();
        let err = exchange_code_with_store(&client, &config_for(&server.url()), &store, "code")
            .await
            .expect_err("rejected");

        assert_eq!(err.code(), CODE_TOKEN_EXCHANGE_REJECTED);
        let text = err.to_string();
        assert!(text.contains("invalid_grant"));
        assert!(text.contains("code_verifier was incorrect"));
        let provider = err.provider_error().expect("provider error attached");
        assert_eq!(provider.status, 400);
        assert_eq!(store.get(KEY_VERIFIER).expect("get"), None);
        assert_eq!(store.get(KEY_ACCESS_TOKEN).expect("get"), None);
    }

    #[tokio::test]
    async fn success_without_access_token_is_system_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/token")
            .with_status(200)
            .with_body(r#"{"token_type":"Bearer"}"#)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let err = exchange_authorization_code(
            &client,
            &TokenExchangeRequest {
                token_uri: format!("{}/api/token", server.url()),
                client_id: "client-1".to_string(),
                code: "c".to_string(),
                redirect_uri: "http://127.0.0.1:5173/callback".to_string(),
                code_verifier: "v".to_string(),
            },
        )
        .await
        .expect_err("missing access token");
        assert_eq!(err.code(), "SYSTEM_ERROR");
    }

    #[tokio::test]
    async fn rejected_refresh_uses_refresh_code() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/token")
            .match_body(Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()))
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let err = refresh_access_token(
            &client,
            &TokenRefreshRequest {
                token_uri: format!("{}/api/token", server.url()),
                client_id: "client-1".to_string(),
                refresh_token: "AQB-refresh".to_string(),
            },
        )
        .await
        .expect_err("rejected");
        assert_eq!(err.code(), CODE_TOKEN_REFRESH_REJECTED);
        assert!(err.to_string().contains("Refresh token revoked"));
    }
}
