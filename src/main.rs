//! tuncd - time-capsule timeline daemon
//!
//! Runs the capsule service: unlock scheduler plus notification dispatcher.
//! The REST router in front of the actors is an external collaborator and
//! talks to the registry this daemon owns.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing::info;
use tunc::config::TuncConfig;
use tunc::service::Service;

/// Tunc time-capsule timeline daemon
#[derive(Parser, Debug)]
#[command(name = "tuncd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/tunc/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the item database path
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Override the notification webhook URL
    #[arg(long, env = "TUNC_WEBHOOK_URL")]
    webhook_url: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    tunc::logging::init()?;
    let cli = Cli::parse();

    let mut config = TuncConfig::load_or_default(cli.config.as_deref())
        .context("loading configuration")?;
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }
    if let Some(webhook_url) = cli.webhook_url {
        config.webhook_url = Some(webhook_url);
    }
    config.validate()?;

    info!(
        db = %config.db_path.display(),
        webhook = config.webhook_url.is_some(),
        "starting tuncd"
    );
    let service = Service::start(&config).context("starting service")?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    service.shutdown().await;
    Ok(())
}
