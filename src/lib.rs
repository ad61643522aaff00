mod app;
mod commands;
mod infra;
mod oauth;
mod shared;
pub mod test_support;

use clap::Parser;
use std::process::ExitCode;

pub fn run() -> ExitCode {
    let cli = commands::Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: SYSTEM_ERROR: failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(run_cli(cli))
}

async fn run_cli(cli: commands::Cli) -> ExitCode {
    let ctx = match commands::load_context(&cli).await {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let logs_dir = infra::app_paths::logs_dir(&ctx.app_dir);
    let _logging = app::logging::init(&ctx.settings.log_level, Some(&logs_dir));
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        storage = ctx.settings.storage.as_str(),
        refresh_on_expiry = ctx.settings.refresh_on_expiry,
        "spotify-profile starting"
    );

    match commands::dispatch(&cli, &ctx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
