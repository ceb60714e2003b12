//! screencache binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use screencache_cli::{load_config, run_command, Cli, CliError};
use screencache_display::{init_tracing, DisplayPolicy, TelemetryConfig};
use screencache_storage::{open_shared_store, StalenessAwareSharedCache};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&TelemetryConfig::from_env()) {
        eprintln!("screencache: {e}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("screencache: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config.as_deref())?;
    let cache = Arc::new(StalenessAwareSharedCache::new(open_shared_store(&config)));
    let mut stdout = std::io::stdout().lock();
    run_command(cache, DisplayPolicy::from(&config), cli.command, &mut stdout).await
}
