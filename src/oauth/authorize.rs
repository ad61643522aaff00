//! Usage: Build the Spotify authorize URL and hand it to a navigator (browser redirect).

use crate::infra::storage::{KeyValueStore, KEY_VERIFIER};
use crate::oauth::endpoints::{parse_http_url, OAuthClientConfig};
use crate::oauth::pkce;
use crate::shared::error::AppResult;
use rand::RngCore;
use reqwest::Url;
use std::process::Command;

#[derive(Debug, Clone)]
pub(crate) struct AuthorizationRequest {
    pub(crate) url: Url,
    pub(crate) state: Option<String>,
}

/// Destination for the authorize redirect.
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &Url) -> AppResult<()>;
}

/// Opens the system default browser.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn navigate(&self, url: &Url) -> AppResult<()> {
        tracing::info!(host = url.host_str().unwrap_or_default(), "opening browser for authorization");
        open_browser(url.as_str())
    }
}

/// Prints the URL for the user to open manually (`--no-browser`).
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn navigate(&self, url: &Url) -> AppResult<()> {
        println!("Open this URL in a browser to authorize:\n{url}");
        Ok(())
    }
}

pub(crate) fn generate_state() -> String {
    use rand::rngs::OsRng;
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub(crate) fn build_authorize_url(
    config: &OAuthClientConfig,
    code_challenge: &str,
    state: Option<&str>,
) -> AppResult<Url> {
    let mut url = parse_http_url("authorize_url", &config.endpoints.authorize_url)?;
    {
        let scope = config.scope_param();
        let mut query = url.query_pairs_mut();
        query.append_pair("client_id", config.client_id.trim());
        query.append_pair("response_type", "code");
        query.append_pair("redirect_uri", config.redirect_uri.trim());
        query.append_pair("scope", &scope);
        query.append_pair("code_challenge_method", "S256");
        query.append_pair("code_challenge", code_challenge);
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    Ok(url)
}

/// Generates a fresh PKCE pair, stores the verifier, and navigates to the authorize URL.
///
/// The verifier is written before navigation so it is in place when the provider
/// redirects back. Any verifier from an earlier, abandoned attempt is replaced.
pub(crate) fn begin_authorization(
    config: &OAuthClientConfig,
    verifier_length: usize,
    state: Option<String>,
    store: &dyn KeyValueStore,
    navigator: &dyn Navigator,
) -> AppResult<AuthorizationRequest> {
    let pair = pkce::generate_pkce_pair(verifier_length)?;
    let url = build_authorize_url(config, &pair.code_challenge, state.as_deref())?;

    store.set(KEY_VERIFIER, &pair.code_verifier)?;
    tracing::debug!(verifier_length, "stored pkce verifier");

    navigator.navigate(&url)?;
    Ok(AuthorizationRequest { url, state })
}

fn open_browser(url: &str) -> AppResult<()> {
    #[cfg(target_os = "windows")]
    {
        build_windows_open_browser_command(url)
            .spawn()
            .map_err(|e| format!("SYSTEM_ERROR: failed to open browser: {e}"))?;
        return Ok(());
    }

    #[cfg(target_os = "macos")]
    {
        Command::new("open")
            .arg(url)
            .spawn()
            .map_err(|e| format!("SYSTEM_ERROR: failed to open browser: {e}"))?;
        return Ok(());
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        Command::new("xdg-open")
            .arg(url)
            .spawn()
            .map_err(|e| format!("SYSTEM_ERROR: failed to open browser: {e}"))?;
        return Ok(());
    }

    #[allow(unreachable_code)]
    Err("SYSTEM_ERROR: browser open is unsupported on this platform"
        .to_string()
        .into())
}

#[cfg(target_os = "windows")]
fn build_windows_open_browser_command(url: &str) -> Command {
    let mut cmd = Command::new("rundll32.exe");
    // `explorer <url>` can open File Explorer for some URL shapes.
    cmd.arg("url.dll,FileProtocolHandler").arg(url);
    cmd
}
