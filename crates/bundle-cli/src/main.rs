//! Thin command-line front-end over `bundle-core`'s Trigger API.
//!
//! Stands in for the per-OS service wrapper and UI front-ends the core
//! treats as external collaborators: every subcommand here is a direct
//! call into `Updater`.

mod cmd;

use bundle_core::config::UpdaterConfigFile;
use bundle_core::{LoggingNotifier, Updater, UpdaterConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "bundle-cli", about = "Drive a bundle updater from the command line")]
struct Cli {
    /// Path to the updater's TOML configuration file.
    #[arg(long, global = true, default_value = "bundle-updater.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check for a newer index without downloading or applying it.
    Check,
    /// Apply an already-staged (or freshly fetched) candidate.
    Apply,
    /// Force a full update, ignoring version checks and policy flags.
    Force,
    /// Print the current index and corrupted-installation state.
    Status,
    /// Print one artifact's metadata and absolute path.
    GetFile {
        /// Logical filename as it appears in the index.
        name: String,
    },
    /// Force a full update, treating a single URL as the sole mirror.
    UpdateFromUrl {
        /// Index URL to fetch from, bypassing the configured mirror list.
        url: String,
    },
    /// Replace the auto-check policy and mirror list, rescheduling the
    /// periodic worker if it is already running.
    Configure {
        /// Whether the periodic worker should run after this call.
        #[arg(long)]
        auto_check: bool,
        /// Replacement mirror list, in priority order.
        #[arg(long = "index-url", required = true)]
        index_urls: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let updater = build_updater(&cli.config).await?;

    match cli.command {
        Command::Check => cmd::check::run(&updater).await,
        Command::Apply => cmd::apply::run(&updater).await,
        Command::Force => cmd::force::run(&updater).await,
        Command::Status => cmd::status::run(&updater),
        Command::GetFile { name } => cmd::get_file::run(&updater, &name),
        Command::UpdateFromUrl { url } => cmd::update_from_url::run(&updater, &url).await,
        Command::Configure { auto_check, index_urls } => cmd::configure::run(&updater, auto_check, index_urls),
    }
}

async fn build_updater(config_path: &std::path::Path) -> anyhow::Result<Arc<Updater>> {
    use anyhow::Context;

    let file = UpdaterConfigFile::load(config_path)
        .await
        .with_context(|| format!("loading updater config from {}", config_path.display()))?;
    let user_agent = format!("bundle-updater-cli/{}", env!("CARGO_PKG_VERSION"));
    let config: UpdaterConfig = file.into_config(None, user_agent);
    Ok(Updater::new(config, Arc::new(LoggingNotifier)))
}
