//! `zone_tracker`: command-line driver for the `zone_vision` engine.
//!
//! ```bash
//! # Track through two zones in a directory of frames recorded at 30 fps
//! zone_tracker track frames/ --fps 30 --zone 0,0,320,480 --zone 320,0,320,480
//!
//! # Re-run the dwell analysis over earlier outputs
//! zone_tracker analyze output/*/*_positions.csv --subject-marker KM
//! ```

mod cli;
mod commands;
mod settings;
#[cfg(feature = "opencv")]
mod video;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Track(args) => {
            tokio::task::spawn_blocking(move || commands::track(args))
                .await
                .context("tracking task panicked")??;
        }
        Commands::Analyze(args) => {
            commands::analyze(args).await?;
        }
        Commands::Rotate(args) => {
            tokio::task::spawn_blocking(move || commands::rotate(args))
                .await
                .context("rotation task panicked")??;
        }
    }

    Ok(())
}
