mod bootstrap;
mod cli;
mod config;
mod error;
mod logging;
mod metrics;
mod model;
mod orchestrator;
mod presentation;
mod router;
#[cfg(test)]
mod test_server;
mod text_summary;
mod theme;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;
use logging::LogTarget;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = !args.is_interactive();

    let target = if is_non_tui {
        LogTarget::Stderr
    } else {
        LogTarget::File
    };
    logging::init(args.verbose, target)?;

    match cli::run(args).await {
        Ok(()) => {
            // Explicitly exit with code 0 on success, especially for non-TUI modes
            if is_non_tui {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "navctl failed");
            Err(e)
        }
    }
}
