//! Usage: The single sign-in flow: redirect, exchange, fetch (optionally refresh), render.
//!
//! `resume` is driven by the callback query (or its absence), `login` adds the local
//! callback listener around it.

use crate::infra::settings::{AppSettings, StorageKind};
use crate::infra::storage::KeyValueStore;
use crate::oauth::authorize::{begin_authorization, generate_state, Navigator};
use crate::oauth::callback_server::{
    bind_callback_listener, callback_target, parse_location, wait_for_callback,
    OAuthCallbackPayload,
};
use crate::oauth::endpoints::{OAuthClientConfig, ProviderEndpoints};
use crate::oauth::profile::{fetch_profile_with_retry, UserProfile};
use crate::oauth::refresh::{refresh_stored_token, RetryPolicy};
use crate::oauth::token_exchange::{exchange_code_with_store, OAuthTokenSet};
use crate::shared::error::{AppError, AppResult};
use reqwest::Url;
use std::time::Duration;

pub(crate) const CODE_AUTHORIZATION_DENIED: &str = "AUTHORIZATION_DENIED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Unauthenticated,
    Redirecting,
    Exchanging,
    Fetching,
    Refreshing,
    Rendered,
}

impl FlowState {
    pub fn as_str(self) -> &'static str {
        match self {
            FlowState::Unauthenticated => "unauthenticated",
            FlowState::Redirecting => "redirecting",
            FlowState::Exchanging => "exchanging",
            FlowState::Fetching => "fetching",
            FlowState::Refreshing => "refreshing",
            FlowState::Rendered => "rendered",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub client: OAuthClientConfig,
    pub storage: StorageKind,
    pub refresh_on_expiry: bool,
    pub verifier_length: usize,
    pub callback_timeout: Duration,
}

impl FlowConfig {
    pub fn from_settings(settings: &AppSettings) -> AppResult<Self> {
        let client = OAuthClientConfig {
            client_id: settings.client_id.trim().to_string(),
            redirect_uri: settings.redirect_uri.trim().to_string(),
            scopes: settings.scopes.clone(),
            endpoints: ProviderEndpoints {
                authorize_url: settings.authorize_url.trim().to_string(),
                token_url: settings.token_url.trim().to_string(),
                api_base_url: settings.api_base_url.trim().to_string(),
            },
        };
        client.validate()?;

        Ok(Self {
            client,
            storage: settings.storage,
            refresh_on_expiry: settings.refresh_on_expiry,
            verifier_length: settings.verifier_length,
            callback_timeout: Duration::from_secs(settings.callback_timeout_seconds),
        })
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        if self.refresh_on_expiry {
            RetryPolicy::refresh_once()
        } else {
            RetryPolicy::none()
        }
    }
}

#[derive(Debug, Clone)]
pub enum FlowOutcome {
    /// No authorization code yet; the user was sent to the authorize URL.
    Redirected { url: Url },
    Rendered(UserProfile),
}

pub struct ProfileFlow<'a> {
    config: FlowConfig,
    client: reqwest::Client,
    store: &'a dyn KeyValueStore,
    navigator: &'a dyn Navigator,
    state: FlowState,
}

impl<'a> ProfileFlow<'a> {
    pub fn new(
        config: FlowConfig,
        client: reqwest::Client,
        store: &'a dyn KeyValueStore,
        navigator: &'a dyn Navigator,
    ) -> Self {
        Self {
            config,
            client,
            store,
            navigator,
            state: FlowState::Unauthenticated,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Continues the flow from the query string the provider redirected back with.
    ///
    /// Without a `code` (or without a query at all) this starts a new authorization
    /// and makes no token or profile request.
    pub async fn resume(&mut self, location: Option<&str>) -> AppResult<FlowOutcome> {
        let payload = match location.map(str::trim).filter(|v| !v.is_empty()) {
            Some(location) => parse_location(location).map_err(|err| self.fail(err))?,
            None => OAuthCallbackPayload::default(),
        };
        self.continue_with(payload).await
    }

    /// Interactive sign-in: listens on the redirect URI, opens the authorize URL and
    /// completes the flow once the provider redirects back.
    pub async fn login(&mut self) -> AppResult<FlowOutcome> {
        let target = callback_target(&self.config.client.redirect_uri).map_err(|e| self.fail(e))?;
        let listener = bind_callback_listener(&target)
            .await
            .map_err(|e| self.fail(e))?;
        tracing::info!(
            port = listener.port(),
            path = %target.path,
            storage = self.config.storage.as_str(),
            "waiting for oauth callback"
        );

        let state = generate_state();
        let url = self.redirect(Some(state.clone()))?;
        tracing::debug!(authorize_host = url.host_str().unwrap_or_default(), "authorization opened");

        let payload = wait_for_callback(
            listener,
            &target.path,
            Some(&state),
            self.config.callback_timeout,
        )
        .await
        .map_err(|e| self.fail(e))?;

        // The listener only returns payloads carrying `code` or `error`.
        self.continue_with(payload).await
    }

    /// Fetches the profile with whatever tokens are already stored.
    pub async fn current_profile(&mut self) -> AppResult<UserProfile> {
        self.fetch().await
    }

    /// Forces a refresh-token grant and stores the result.
    pub async fn refresh(&mut self) -> AppResult<OAuthTokenSet> {
        self.transition(FlowState::Refreshing);
        refresh_stored_token(&self.client, &self.config.client, self.store)
            .await
            .map_err(|e| self.fail(e))
    }

    async fn continue_with(&mut self, payload: OAuthCallbackPayload) -> AppResult<FlowOutcome> {
        if let Some(error) = payload.error.as_deref() {
            let mut message = format!("provider returned error={error}");
            if let Some(description) = payload.error_description.as_deref() {
                message.push_str(&format!(" error_description={description}"));
            }
            return Err(self.fail(AppError::new(CODE_AUTHORIZATION_DENIED, message)));
        }

        let Some(code) = payload.code.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
            let url = self.redirect(None)?;
            return Ok(FlowOutcome::Redirected { url });
        };

        self.transition(FlowState::Exchanging);
        exchange_code_with_store(&self.client, &self.config.client, self.store, code)
            .await
            .map_err(|e| self.fail(e))?;

        let profile = self.fetch().await?;
        Ok(FlowOutcome::Rendered(profile))
    }

    fn redirect(&mut self, state: Option<String>) -> AppResult<Url> {
        self.transition(FlowState::Redirecting);
        let request = begin_authorization(
            &self.config.client,
            self.config.verifier_length,
            state,
            self.store,
            self.navigator,
        )
        .map_err(|e| self.fail(e))?;
        tracing::info!(with_state = request.state.is_some(), "redirected to authorize url");
        Ok(request.url)
    }

    async fn fetch(&mut self) -> AppResult<UserProfile> {
        self.transition(FlowState::Fetching);
        let policy = self.config.retry_policy();
        let state = &mut self.state;
        let result = fetch_profile_with_retry(
            &self.client,
            &self.config.client,
            self.store,
            policy,
            |err| {
                tracing::debug!(
                    from = state.as_str(),
                    to = FlowState::Refreshing.as_str(),
                    trigger = err.code(),
                    "flow state"
                );
                *state = FlowState::Refreshing;
            },
        )
        .await;
        if self.state == FlowState::Refreshing && result.is_ok() {
            self.transition(FlowState::Fetching);
        }

        let profile = result.map_err(|e| self.fail(e))?;
        self.transition(FlowState::Rendered);
        Ok(profile)
    }

    fn transition(&mut self, next: FlowState) {
        tracing::debug!(from = self.state.as_str(), to = next.as_str(), "flow state");
        self.state = next;
    }

    fn fail(&self, err: AppError) -> AppError {
        tracing::error!(
            state = self.state.as_str(),
            code = err.code(),
            error = err.message(),
            "flow failed"
        );
        err
    }
}
