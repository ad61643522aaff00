//! Usage: Sign-in, profile and token commands.

use super::CommandContext;
use crate::app::flow::{FlowConfig, FlowOutcome, ProfileFlow};
use crate::app::render::{render_profile, render_profile_json};
use crate::infra::settings::StorageKind;
use crate::infra::storage::{self, KeyValueStore};
use crate::oauth::authorize::{BrowserNavigator, Navigator, PrintNavigator};
use crate::oauth::http_client;
use crate::oauth::profile::UserProfile;
use crate::shared::error::AppResult;
use crate::shared::security::mask_token;

fn warn_if_session_storage(ctx: &CommandContext, command: &str) {
    if ctx.settings.storage == StorageKind::Session {
        tracing::warn!(
            command,
            "session storage does not outlive this process; use --storage local to finish sign-in in a later command"
        );
    }
}

fn print_profile(profile: &UserProfile, json: bool) {
    if json {
        println!("{}", render_profile_json(profile));
    } else {
        print!("{}", render_profile(Some(profile)));
    }
}

fn print_outcome(outcome: FlowOutcome, json: bool) {
    match outcome {
        FlowOutcome::Rendered(profile) => print_profile(&profile, json),
        FlowOutcome::Redirected { .. } => {
            eprintln!("No authorization code yet; finish sign-in in the browser, then run `spotify-profile callback <redirect-url>`.");
        }
    }
}

fn show_loading(json: bool) {
    if !json {
        eprintln!("{}", render_profile(None));
    }
}

struct FlowParts {
    config: FlowConfig,
    client: reqwest::Client,
    store: Box<dyn KeyValueStore>,
}

fn flow_parts(ctx: &CommandContext) -> AppResult<FlowParts> {
    Ok(FlowParts {
        config: FlowConfig::from_settings(&ctx.settings)?,
        client: http_client()?,
        store: ctx.open_store(),
    })
}

pub(super) async fn login(ctx: &CommandContext, no_browser: bool, json: bool) -> AppResult<()> {
    let navigator: &dyn Navigator = if no_browser {
        &PrintNavigator
    } else {
        &BrowserNavigator
    };
    let parts = flow_parts(ctx)?;
    let mut flow = ProfileFlow::new(parts.config, parts.client, parts.store.as_ref(), navigator);
    show_loading(json);
    let outcome = flow.login().await?;
    print_outcome(outcome, json);
    Ok(())
}

pub(super) async fn callback(ctx: &CommandContext, location: &str, json: bool) -> AppResult<()> {
    warn_if_session_storage(ctx, "callback");
    let parts = flow_parts(ctx)?;
    let mut flow = ProfileFlow::new(parts.config, parts.client, parts.store.as_ref(), &PrintNavigator);
    show_loading(json);
    let outcome = flow.resume(Some(location)).await?;
    print_outcome(outcome, json);
    Ok(())
}

pub(super) async fn authorize_url(ctx: &CommandContext) -> AppResult<()> {
    warn_if_session_storage(ctx, "authorize-url");
    let parts = flow_parts(ctx)?;
    let mut flow = ProfileFlow::new(parts.config, parts.client, parts.store.as_ref(), &PrintNavigator);
    flow.resume(None).await?;
    Ok(())
}

pub(super) async fn profile(ctx: &CommandContext, json: bool) -> AppResult<()> {
    let parts = flow_parts(ctx)?;
    let mut flow = ProfileFlow::new(parts.config, parts.client, parts.store.as_ref(), &PrintNavigator);
    show_loading(json);
    let profile = flow.current_profile().await?;
    print_profile(&profile, json);
    Ok(())
}

pub(super) async fn refresh(ctx: &CommandContext) -> AppResult<()> {
    let parts = flow_parts(ctx)?;
    let mut flow = ProfileFlow::new(parts.config, parts.client, parts.store.as_ref(), &PrintNavigator);
    let tokens = flow.refresh().await?;
    println!("Access token refreshed: {}", mask_token(&tokens.access_token));
    if let Some(expires_at) = tokens.expires_at {
        println!("Expires at (unix): {expires_at}");
    }
    Ok(())
}

pub(super) async fn logout(ctx: &CommandContext) -> AppResult<()> {
    let store = ctx.open_store();
    clear_tokens(store.as_ref())?;
    println!("Signed out; stored verifier and tokens removed.");
    Ok(())
}

fn clear_tokens(store: &dyn KeyValueStore) -> AppResult<()> {
    storage::clear_all(store)?;
    tracing::info!("cleared stored oauth state");
    Ok(())
}
