//! BlipChat CLI entry point

use clap::Parser;
use tracing::{error, info};

use blipchat_cli::{app::BlipApp, cli::Cli, commands::CommandDispatcher, config::AppConfig, error::Result};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `host` mode keeps stdout for JSON lines
    setup_logging(cli.verbose);

    let config = load_configuration(&cli)?;
    let app = BlipApp::new(config).await?;

    if let Err(e) = CommandDispatcher::execute(cli.command, app).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    info!("BlipChat CLI exited successfully");
    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Layered configuration with command line overrides applied last
fn load_configuration(cli: &Cli) -> Result<AppConfig> {
    match &cli.config {
        Some(path) => info!("Loading configuration from: {}", path),
        None => info!("Using default configuration layers"),
    }
    let config = AppConfig::load(cli.config.as_deref())?.with_overrides(
        cli.service_uuid.as_deref(),
        cli.characteristic_uuid.as_deref(),
        cli.command.device_name(),
    )?;
    Ok(config)
}
