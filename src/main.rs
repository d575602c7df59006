//! Vente CLI entry point.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vente::cli::{commands, Cli, Commands};
use vente::config::Settings;
use vente::places::PlaceSearchRequest;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // stdout carries tool output and, in MCP mode, the JSON-RPC stream
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("vente={}", log_level)),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config_path = cli.config.as_ref().map(PathBuf::from);
    let settings = Settings::load_from(config_path.as_ref())?;

    match &cli.command {
        Commands::Doctor => {
            commands::run_doctor(&settings)?;
        }

        Commands::Flights { action } => {
            commands::run_flights(action, settings).await?;
        }

        Commands::Places {
            query,
            max_results,
            max_reviews,
            photo_width,
        } => {
            let request = PlaceSearchRequest {
                query: query.clone(),
                max_results: *max_results,
                max_reviews_per_place: *max_reviews,
                max_photo_width: *photo_width,
            };
            commands::run_places(&request, settings).await?;
        }

        Commands::Video { action } => {
            commands::run_video(action, settings).await?;
        }

        Commands::Media { action } => {
            commands::run_media(action, settings).await?;
        }

        Commands::Mcp => {
            commands::run_mcp(settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, settings, config_path)?;
        }
    }

    Ok(())
}
