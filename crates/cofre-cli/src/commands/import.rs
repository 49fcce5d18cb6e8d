//! Import command: parse a statement file into transactions

use std::path::Path;

use anyhow::Result;
use tracing::info;

use super::{load_layout, load_statement, parse_with_options};

pub fn cmd_import(file: &Path, institution: Option<&str>, layout: Option<&Path>) -> Result<()> {
    let (content, encoding) = load_statement(file)?;
    let layout = layout.map(load_layout).transpose()?;

    let outcome = parse_with_options(&content, institution, layout.as_ref())?;

    info!(
        format = %outcome.metadata.source_format,
        encoding = %encoding,
        "Parsed statement"
    );

    for tx in &outcome.transactions {
        println!(
            "{}  {:>12.2} {}  {:<6} {}",
            tx.date,
            tx.amount,
            tx.currency,
            tx.flow.to_string(),
            tx.description
        );
    }

    println!();
    println!(
        "{} transactions from {} rows ({} skipped)",
        outcome.transactions.len(),
        outcome.rows_total,
        outcome.errors.len()
    );

    if !outcome.errors.is_empty() {
        println!();
        println!("Skipped rows:");
        for err in &outcome.errors {
            match &err.field {
                Some(field) => println!("  row {} [{}]: {}", err.row, field, err.message),
                None => println!("  row {}: {}", err.row, err.message),
            }
        }
    }

    Ok(())
}
