//! Cofre CLI - Bank statement ingestion and classification
//!
//! Usage:
//!   cofre inspect --file extrato.csv      Sniff format, dialect and institution
//!   cofre import --file extrato.csv       Parse a statement into transactions
//!   cofre classify --file extrato.csv --categories categories.json
//!                                         Classify transactions (rules + AI)

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Inspect { file } => commands::cmd_inspect(&file),
        Commands::Import {
            file,
            institution,
            layout,
        } => commands::cmd_import(&file, institution.as_deref(), layout.as_deref()),
        Commands::Classify {
            file,
            categories,
            rules,
            model,
            monthly_cap,
            near_limit_fraction,
            allow_override,
            strategy,
            concurrency,
            cache_ttl_days,
            timeout_secs,
        } => {
            commands::cmd_classify(commands::ClassifyArgs {
                file,
                categories,
                rules,
                model,
                monthly_cap,
                near_limit_fraction,
                allow_override,
                strategy,
                concurrency,
                cache_ttl_days,
                timeout_secs,
            })
            .await
        }
    }
}
