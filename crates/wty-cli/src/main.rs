mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use wty_config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // The TUI owns the terminal, so only warnings get through by default.
    let default_filter = match cli.command {
        cli::Commands::Ui { .. } => "warn",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load()?;
    if let Some(url) = cli.backend {
        config.backend.base_url = url;
    }

    let outcome = match cli.command {
        cli::Commands::Scan { serial } => commands::visit::scan(&config, &serial).await,
        cli::Commands::Activate(args) => commands::visit::activate(&config, args).await,
        cli::Commands::Warranty { serial, json } => {
            commands::visit::warranty(&config, &serial, json).await
        }
        cli::Commands::Admin(cmd) => commands::admin::handle(cmd, &config).await,
        cli::Commands::Ui { demo, out } => commands::ui::handle(&config, demo, out).await,
        cli::Commands::Completions { shell } => commands::completions::handle(shell),
    };
    outcome.map_err(|e| commands::retry_hint(e, &config.backend.base_url))
}
