mod app;
mod commands;
mod config;
mod render;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::App;
use crate::commands::Cli;
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sref=info,sref_store=info,sref_remote=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("SREF_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let cli = Cli::parse();

    // --- Configuration ---
    let config = AppConfig::from_env()?;
    tracing::debug!(?config.backend, mode = %config.mode, "Loaded configuration");

    // --- Store ---
    let app = App::start(&config, cli.command.signs_in_at_startup()).await?;

    commands::run(&app, cli.command).await
}
