use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roomwatch::config::Config;
use roomwatch::context::AppContext;

mod commands;

#[derive(Parser)]
#[command(
    name = "roomwatch",
    version,
    about = "Tracks room reservations day by day and keeps a versioned history of every change",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./config.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured one
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the rolling window continuously until Ctrl-C
    Run,

    /// Scrape a closed past date range once
    Backfill {
        /// First date (YYYY-MM-DD); defaults to scraper.historical_start
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last date (YYYY-MM-DD); defaults to scraper.historical_end
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Scrape today through the rolling horizon once
    Refresh,

    /// Show scraper cursors and the number of tracked events
    Status,

    /// Show an event and its archived versions
    History {
        /// External event id
        event_id: i64,
    },

    /// Show recent constant-field violations
    Violations {
        /// Maximum number of rows
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .or_else(|| Some(PathBuf::from("config.toml")).filter(|p| p.exists()));
    let config = Config::load(config_path.as_deref())?;

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    tracing::info!("roomwatch starting");

    let ctx = AppContext::build(config)?;

    match cli.command {
        Commands::Run => {
            tracing::info!(
                horizon_months = ctx.config.scraper.horizon_months,
                "Starting run command"
            );
            commands::run(ctx).await?;
        }

        Commands::Backfill { from, to } => {
            tracing::info!(from = ?from, to = ?to, "Starting backfill command");
            commands::backfill(ctx, from, to).await?;
        }

        Commands::Refresh => {
            tracing::info!("Starting refresh command");
            commands::refresh(ctx).await?;
        }

        Commands::Status => commands::status(&ctx)?,

        Commands::History { event_id } => commands::history(&ctx, event_id)?,

        Commands::Violations { limit } => commands::violations(&ctx, limit)?,
    }

    tracing::info!("roomwatch completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("roomwatch=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new(format!("roomwatch={level},warn"))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
