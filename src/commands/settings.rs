//! Usage: `settings show|path|init`.

use super::{CommandContext, SettingsAction};
use crate::infra::settings;
use crate::shared::blocking;
use crate::shared::error::AppResult;

pub(super) async fn handle(ctx: &CommandContext, action: SettingsAction) -> AppResult<()> {
    match action {
        SettingsAction::Show => {
            let json = serde_json::to_string_pretty(&ctx.settings)
                .map_err(|e| format!("SYSTEM_ERROR: failed to serialize settings: {e}"))?;
            println!("{json}");
        }
        SettingsAction::Path => {
            println!("{}", ctx.settings_path.display());
        }
        SettingsAction::Init => {
            let path = ctx.settings_path.clone();
            let effective = ctx.settings.clone();
            blocking::run("settings_write", move || settings::write(&path, &effective)).await?;
            tracing::info!(path = %ctx.settings_path.display(), "settings written");
            println!("Wrote {}", ctx.settings_path.display());
        }
    }
    Ok(())
}
