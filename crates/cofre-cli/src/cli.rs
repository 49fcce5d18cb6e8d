//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI
//! arguments. The actual command implementations are in the `commands`
//! module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Cofre - Import and classify bank statement exports
#[derive(Parser)]
#[command(name = "cofre")]
#[command(about = "Bank statement ingestion and transaction classification", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sniff a statement file: format kind, dialect, encoding, institution
    Inspect {
        /// Statement file to inspect
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Parse a statement file into transactions
    Import {
        /// Statement file to import
        #[arg(short, long)]
        file: PathBuf,

        /// Institution (auto-detected if not specified):
        /// nubank, inter, bradesco, itau, santander, bb
        #[arg(short, long)]
        institution: Option<String>,

        /// JSON file with a custom field layout for unknown exports
        #[arg(short, long)]
        layout: Option<PathBuf>,
    },

    /// Classify a statement's transactions with rules and the AI fallback
    ///
    /// Requires AI_API_KEY (or AI_BACKEND=mock for a dry run).
    Classify {
        /// Statement file to classify
        #[arg(short, long)]
        file: PathBuf,

        /// JSON file with the category catalog: [{"id","name","type"}]
        #[arg(short, long)]
        categories: PathBuf,

        /// JSON file with classification rules
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// Model identifier
        #[arg(long, default_value = "gpt-4o-mini")]
        model: String,

        /// Monthly AI spend cap in USD
        #[arg(long, default_value_t = 10.0)]
        monthly_cap: f64,

        /// Fraction of the cap that triggers a near-limit warning
        #[arg(long, default_value_t = 0.8)]
        near_limit_fraction: f64,

        /// Proceed even when the monthly cap is exhausted
        #[arg(long)]
        allow_override: bool,

        /// Sampling strategy: aggressive, balanced, quality
        #[arg(long, default_value = "balanced")]
        strategy: String,

        /// Parallel classifications per batch
        #[arg(long, default_value_t = 5)]
        concurrency: usize,

        /// Classification cache TTL in days
        #[arg(long, default_value_t = 7)]
        cache_ttl_days: i64,

        /// Per-call model timeout in seconds
        #[arg(long, default_value_t = 20)]
        timeout_secs: u64,
    },
}
