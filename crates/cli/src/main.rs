use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use shelf_kernel::settings::Settings;

/// Book catalogue service
#[derive(Debug, Parser)]
#[command(name = "shelf", version, about)]
struct Cli {
    /// Environment overlay to load (local, staging, production); defaults to $SHELF_ENV
    #[arg(long, global = true)]
    env: Option<String>,

    /// Directory holding base.toml and the environment overlays
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        Settings::load_with(self.env.as_deref(), self.config_dir.as_deref())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = cli
        .settings()
        .with_context(|| "failed to load shelf settings")?;
    shelf_telemetry::init(&settings.telemetry)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => shelf_app::app::serve(&settings).await,
        Command::Migrate => {
            let applied = shelf_app::app::migrate(&settings).await?;
            tracing::info!(applied, db = %settings.database.url, "migrations complete");
            Ok(())
        }
    }
}
