//! Error types for Cofre

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("AI budget exceeded: spent {spent:.2} USD of {cap:.2} USD cap")]
    BudgetExceeded { spent: f64, cap: f64 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Rule error: {0}")]
    Rule(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
