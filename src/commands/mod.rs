//! Usage: Command-line surface (clap) and dispatch to the sign-in flow.

mod auth;
mod settings;

use crate::infra::settings::{self as app_settings, AppSettings, StorageKind};
use crate::infra::{app_paths, storage};
use crate::shared::blocking;
use crate::shared::error::AppResult;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "spotify-profile",
    version,
    about = "Sign in to Spotify (Authorization Code + PKCE) and show your profile"
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,

    /// Spotify application client id (overrides settings.json and SPOTIFY_CLIENT_ID).
    #[arg(long, global = true)]
    pub(crate) client_id: Option<String>,

    /// Redirect URI registered for the client.
    #[arg(long, global = true)]
    pub(crate) redirect_uri: Option<String>,

    /// Where the verifier and tokens are kept.
    #[arg(long, global = true, value_enum)]
    pub(crate) storage: Option<StorageKind>,

    /// Fail on an expired access token instead of refreshing once.
    #[arg(long, global = true, default_value_t = false)]
    pub(crate) no_refresh: bool,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, global = true)]
    pub(crate) log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Open the authorize page, wait for the redirect and show the profile.
    Login {
        /// Print the authorize URL instead of opening a browser.
        #[arg(long, default_value_t = false)]
        no_browser: bool,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Finish sign-in from a pasted redirect URL or query string (`?code=...`).
    Callback {
        location: String,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Store a fresh verifier and print the authorize URL.
    AuthorizeUrl,
    /// Show the profile using stored tokens.
    Profile {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Exchange the stored refresh token for a new access token.
    Refresh,
    /// Remove the stored verifier and tokens.
    Logout,
    /// Settings file management.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub(crate) enum SettingsAction {
    /// Print the effective settings (file + environment + flags).
    Show,
    /// Print the settings file location.
    Path,
    /// Write the settings file, keeping flag/environment values such as the client id.
    Init,
}

/// Resolved per-invocation state shared by all commands.
pub(crate) struct CommandContext {
    pub(crate) app_dir: PathBuf,
    pub(crate) settings_path: PathBuf,
    pub(crate) settings: AppSettings,
}

impl CommandContext {
    pub(crate) fn open_store(&self) -> Box<dyn storage::KeyValueStore> {
        storage::open_store(self.settings.storage, &app_paths::storage_path(&self.app_dir))
    }
}

/// Loads settings.json and layers environment then command-line overrides on top.
pub(crate) async fn load_context(cli: &Cli) -> AppResult<CommandContext> {
    let app_dir = app_paths::app_home_dir()?;
    let settings_path = app_paths::settings_path(&app_dir);

    let read_path = settings_path.clone();
    let mut settings = blocking::run("settings_read", move || app_settings::read(&read_path)).await?;
    app_settings::apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    apply_cli_overrides(&mut settings, cli);

    Ok(CommandContext {
        app_dir,
        settings_path,
        settings,
    })
}

pub(crate) fn apply_cli_overrides(settings: &mut AppSettings, cli: &Cli) {
    if let Some(client_id) = cli.client_id.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        settings.client_id = client_id.to_string();
    }
    if let Some(redirect_uri) = cli.redirect_uri.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        settings.redirect_uri = redirect_uri.to_string();
    }
    if let Some(storage) = cli.storage {
        settings.storage = storage;
    }
    if cli.no_refresh {
        settings.refresh_on_expiry = false;
    }
    if let Some(level) = cli.log_level.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        settings.log_level = level.to_string();
    }
}

pub(crate) async fn dispatch(cli: &Cli, ctx: &CommandContext) -> AppResult<()> {
    match &cli.command {
        Command::Login { no_browser, json } => auth::login(ctx, *no_browser, *json).await,
        Command::Callback { location, json } => auth::callback(ctx, location, *json).await,
        Command::AuthorizeUrl => auth::authorize_url(ctx).await,
        Command::Profile { json } => auth::profile(ctx, *json).await,
        Command::Refresh => auth::refresh(ctx).await,
        Command::Logout => auth::logout(ctx).await,
        Command::Settings { action } => settings::handle(ctx, *action).await,
    }
}
