//! nbharness - tutorial notebook test harness
//!
//! Runs parameterized notebook tutorials against connected hardware units
//! and renders reports for the ones that pass.

use clap::Parser;
use commands::Commands;
use nbharness::common::config::Settings;
use nbharness::common::logging;
use nbharness::{cli, commands};

#[derive(Parser)]
#[command(name = "nbharness", about = "Tutorial notebook test harness")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    // Runs also log to harness.log next to the per-unit logs
    let guard = match &cli.command {
        Commands::Run { log_dir, .. } => {
            logging::init_with_file(log_dir.as_deref().unwrap_or(&settings.paths.log_dir))
        }
        _ => {
            logging::init_cli();
            None
        }
    };

    let result = cli::dispatch(cli.command, settings).await;
    if let Err(e) = result {
        tracing::debug!("exiting with error: {:?}", e);
        eprintln!("Error: {e}");
        // exit skips destructors; flush the file log first
        drop(guard);
        std::process::exit(1);
    }
}
