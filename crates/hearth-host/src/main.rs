//! Hearth host CLI.
//!
//! `hearth run` starts the host; `hearth worker --port --token` is the
//! entry point launched in the separately-privileged worker process by the
//! elevation bridge.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use hearth_elevate::OperationTable;
use hearth_elevate::worker::connect_and_serve;
use hearth_extensions::entry::ModuleTable;
use hearth_host::config::load_config;
use hearth_host::startup;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "hearth", about = "Extension host for the Hearth desktop tool")]
struct Cli {
    /// Explicit config file path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the host: discover, resolve, load, compose, run ready hooks.
    Run,
    /// Privileged worker entry point (launched by the elevation bridge).
    Worker {
        /// Loopback port of the host's listener.
        #[arg(long)]
        port: u16,
        /// Channel token handed over at launch.
        #[arg(long)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run => {
            let config =
                load_config(cli.config.as_deref()).context("failed to load configuration")?;
            // HEARTH_LOG wins over the configured filter.
            if std::env::var_os(hearth_core::logging::LOG_ENV).is_some() {
                hearth_core::logging::init_logging(None);
            } else {
                hearth_core::logging::init_logging(Some(&config.log_filter));
            }

            // Bundled extension modules are registered here by the
            // application build; the bare host starts with an empty table.
            let provider = Arc::new(ModuleTable::new());
            let host = startup::start(&config, provider)
                .await
                .context("host startup failed")?;

            info!(
                loaded = host.report.loaded.len(),
                problems = host.report.problems.len(),
                "host started"
            );
            for problem in &host.report.problems {
                warn!("{problem}");
            }
            Ok(())
        }
        Command::Worker { port, token } => {
            hearth_core::logging::init_logging(None);
            let table = OperationTable::builtin();
            connect_and_serve(port, &token, &table)
                .await
                .context("worker channel failed")?;
            Ok(())
        }
    }
}
