//! Classify command: run the hybrid pipeline over a statement's transactions

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;

use cofre_core::{
    AIClient, BatchItem, CategoryRef, ClassificationCache, ClassificationRule, Classifier,
    ClassifyConfig, MemoryLedger, ParsedTransaction, RuleSet, Strategy, MAX_BATCH_SIZE,
};

use super::{load_statement, parse_with_options};

pub struct ClassifyArgs {
    pub file: PathBuf,
    pub categories: PathBuf,
    pub rules: Option<PathBuf>,
    pub model: String,
    pub monthly_cap: f64,
    pub near_limit_fraction: f64,
    pub allow_override: bool,
    pub strategy: String,
    pub concurrency: usize,
    pub cache_ttl_days: i64,
    pub timeout_secs: u64,
}

/// Turn parsed transactions into batch items keyed by their dedup hash
pub(crate) fn batch_items(transactions: &[ParsedTransaction]) -> Vec<BatchItem> {
    transactions
        .iter()
        .map(|tx| BatchItem {
            id: tx.dedup_hash.clone(),
            description: tx.description.clone(),
            amount: tx.amount,
            flow: tx.flow,
        })
        .collect()
}

pub async fn cmd_classify(args: ClassifyArgs) -> Result<()> {
    let (content, _) = load_statement(&args.file)?;
    let outcome = parse_with_options(&content, None, None)?;

    if outcome.transactions.is_empty() {
        bail!(
            "no transactions parsed from {} ({} rows skipped)",
            args.file.display(),
            outcome.errors.len()
        );
    }

    let categories_text = std::fs::read_to_string(&args.categories)
        .with_context(|| format!("failed to read {}", args.categories.display()))?;
    let categories: Vec<CategoryRef> = serde_json::from_str(&categories_text)
        .with_context(|| format!("invalid category catalog {}", args.categories.display()))?;

    let rules = match &args.rules {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let rules: Vec<ClassificationRule> = serde_json::from_str(&text)
                .with_context(|| format!("invalid rule file {}", path.display()))?;
            rules
        }
        None => Vec::new(),
    };

    let strategy: Strategy = args
        .strategy
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let client = AIClient::from_env()
        .context("no AI credential configured; set AI_API_KEY (or AI_BACKEND=mock)")?;

    let config = ClassifyConfig {
        model: args.model.clone(),
        monthly_cap_usd: args.monthly_cap,
        near_limit_fraction: args.near_limit_fraction,
        allow_override: args.allow_override,
        strategy,
        concurrency: args.concurrency,
        request_timeout: Duration::from_secs(args.timeout_secs),
    };

    let classifier = Classifier::new(
        RuleSet::compile(rules).map_err(|e| anyhow::anyhow!(e.to_string()))?,
        Arc::new(ClassificationCache::new(1000, args.cache_ttl_days)),
        Arc::new(MemoryLedger::new()),
        Some(client),
        config,
    );

    let items = batch_items(&outcome.transactions);
    info!(total = items.len(), "Classifying statement transactions");

    // The batch API caps at 100 items; larger statements run in chunks
    let mut totals = (0usize, 0usize, 0usize, 0usize); // successful, failed, cached, external
    for chunk in items.chunks(MAX_BATCH_SIZE) {
        let batch = classifier
            .classify_batch(chunk.to_vec(), &categories)
            .await?;

        for result in &batch.results {
            let tx = outcome
                .transactions
                .iter()
                .find(|t| t.dedup_hash == result.id);
            let description = tx.map(|t| t.description.as_str()).unwrap_or("?");

            match (&result.category_id, &result.error) {
                (Some(_), _) => println!(
                    "{:<40} -> {} ({:.2}, {}) {}",
                    truncate(description, 40),
                    result.category_name.as_deref().unwrap_or("?"),
                    result.confidence,
                    result
                        .source
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    result.reason
                ),
                (None, Some(err)) => println!(
                    "{:<40} -> FAILED: {}",
                    truncate(description, 40),
                    err
                ),
                (None, None) => println!(
                    "{:<40} -> unclassified ({:.2}) {}",
                    truncate(description, 40),
                    result.confidence,
                    result.reason
                ),
            }
        }

        totals.0 += batch.summary.successful;
        totals.1 += batch.summary.failed;
        totals.2 += batch.summary.cached;
        totals.3 += batch.summary.external_calls;
    }

    println!();
    println!(
        "{} classified, {} failed, {} from cache, {} model calls",
        totals.0, totals.1, totals.2, totals.3
    );

    let stats = classifier.cache().stats();
    info!(
        cache_size = stats.size,
        hit_rate = format!("{:.2}", stats.hit_rate),
        "Cache statistics"
    );

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
