//! AI spend tracking: usage ledger, pricing table and budget guard
//!
//! Every successful model call is logged to a `UsageLedger`; the budget
//! guard derives the billing-period spend from the ledger before a batch is
//! allowed to do any model work.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::Result;
use crate::models::UsageRecord;

/// Aggregated usage for a period
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct UsageSummary {
    pub total_requests: usize,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub average_confidence: f64,
}

/// Ledger of external-model usage.
///
/// The storage collaborator provides the durable implementation; the
/// in-memory one below backs tests and single-process deployments. Both
/// are append-only and must be safe under concurrent batch workers.
pub trait UsageLedger: Send + Sync {
    fn record(&self, record: UsageRecord) -> Result<()>;

    /// Total spend in USD since `since` (inclusive)
    fn spend_since(&self, since: DateTime<Utc>) -> Result<f64>;

    fn summary_since(&self, since: DateTime<Utc>) -> Result<UsageSummary>;
}

/// In-memory append-only usage ledger
#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<UsageRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsageLedger for MemoryLedger {
    fn record(&self, record: UsageRecord) -> Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }

    fn spend_since(&self, since: DateTime<Utc>) -> Result<f64> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| r.created_at >= since)
            .map(|r| r.cost_usd)
            .sum())
    }

    fn summary_since(&self, since: DateTime<Utc>) -> Result<UsageSummary> {
        let records = self.records.lock().unwrap();
        let in_period: Vec<&UsageRecord> =
            records.iter().filter(|r| r.created_at >= since).collect();

        let confidences: Vec<f64> = in_period.iter().filter_map(|r| r.confidence).collect();
        Ok(UsageSummary {
            total_requests: in_period.len(),
            total_tokens: in_period.iter().map(|r| r.total_tokens() as u64).sum(),
            total_cost_usd: in_period.iter().map(|r| r.cost_usd).sum(),
            average_confidence: if confidences.is_empty() {
                0.0
            } else {
                confidences.iter().sum::<f64>() / confidences.len() as f64
            },
        })
    }
}

/// USD per million tokens for one model
#[derive(Debug, Clone, Copy)]
pub struct ModelRate {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

/// Pluggable per-model pricing.
///
/// Unknown model ids fall back to a conservative default rate instead of
/// guessing from vendor-name substrings.
#[derive(Debug, Clone)]
pub struct PricingTable {
    rates: HashMap<String, ModelRate>,
    fallback: ModelRate,
}

impl Default for PricingTable {
    fn default() -> Self {
        let mut rates = HashMap::new();
        rates.insert(
            "gpt-4o-mini".to_string(),
            ModelRate {
                input_per_million: 0.150,
                output_per_million: 0.600,
            },
        );
        rates.insert(
            "gpt-4o".to_string(),
            ModelRate {
                input_per_million: 2.50,
                output_per_million: 10.00,
            },
        );
        rates.insert(
            "gpt-4-turbo".to_string(),
            ModelRate {
                input_per_million: 10.00,
                output_per_million: 30.00,
            },
        );
        Self {
            rates,
            fallback: ModelRate {
                input_per_million: 2.50,
                output_per_million: 10.00,
            },
        }
    }
}

impl PricingTable {
    pub fn with_rate(mut self, model: &str, rate: ModelRate) -> Self {
        self.rates.insert(model.to_string(), rate);
        self
    }

    /// Cost in USD for one call
    pub fn cost(&self, model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        let rate = self.rates.get(model).copied().unwrap_or_else(|| {
            warn!(model, "No pricing entry for model, using fallback rate");
            self.fallback
        });
        (prompt_tokens as f64 / 1_000_000.0) * rate.input_per_million
            + (completion_tokens as f64 / 1_000_000.0) * rate.output_per_million
    }
}

/// Budget position for the current billing period
#[derive(Debug, Clone, serde::Serialize)]
pub struct BudgetStatus {
    pub is_near_limit: bool,
    pub is_over_limit: bool,
    pub used_usd: f64,
    pub remaining_usd: f64,
    pub percentage_used: f64,
}

/// Derive the budget position from the ledger's period spend.
///
/// `is_over_limit` when spend has reached the cap; `is_near_limit` when
/// spend has reached `cap * near_limit_fraction`. Called once per batch,
/// before any model work begins.
pub fn check_budget(
    ledger: &dyn UsageLedger,
    period_start: DateTime<Utc>,
    cap_usd: f64,
    near_limit_fraction: f64,
) -> Result<BudgetStatus> {
    let used_usd = ledger.spend_since(period_start)?;

    Ok(BudgetStatus {
        is_near_limit: used_usd >= cap_usd * near_limit_fraction,
        is_over_limit: used_usd >= cap_usd,
        used_usd,
        remaining_usd: (cap_usd - used_usd).max(0.0),
        percentage_used: if cap_usd > 0.0 {
            (used_usd / cap_usd) * 100.0
        } else {
            100.0
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(cost_usd: f64, created_at: DateTime<Utc>) -> UsageRecord {
        UsageRecord {
            model: "gpt-4o-mini".to_string(),
            prompt: "prompt".to_string(),
            response: "response".to_string(),
            prompt_tokens: 100,
            completion_tokens: 50,
            category_id: Some("cat-1".to_string()),
            confidence: Some(0.9),
            cost_usd,
            created_at,
        }
    }

    #[test]
    fn test_near_limit_but_not_over() {
        let ledger = MemoryLedger::new();
        let period_start = Utc::now() - Duration::days(10);
        ledger.record(record(9.5, Utc::now())).unwrap();

        let status = check_budget(&ledger, period_start, 10.0, 0.8).unwrap();
        assert!(status.is_near_limit);
        assert!(!status.is_over_limit);
        assert_eq!(status.used_usd, 9.5);
        assert!((status.remaining_usd - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_over_limit() {
        let ledger = MemoryLedger::new();
        let period_start = Utc::now() - Duration::days(10);
        ledger.record(record(10.5, Utc::now())).unwrap();

        let status = check_budget(&ledger, period_start, 10.0, 0.8).unwrap();
        assert!(status.is_over_limit);
        assert!(status.is_near_limit);
        assert_eq!(status.remaining_usd, 0.0);
    }

    #[test]
    fn test_spend_outside_period_ignored() {
        let ledger = MemoryLedger::new();
        ledger
            .record(record(50.0, Utc::now() - Duration::days(60)))
            .unwrap();
        ledger.record(record(1.0, Utc::now())).unwrap();

        let period_start = Utc::now() - Duration::days(30);
        let status = check_budget(&ledger, period_start, 10.0, 0.8).unwrap();
        assert_eq!(status.used_usd, 1.0);
        assert!(!status.is_near_limit);
    }

    #[test]
    fn test_summary_aggregates() {
        let ledger = MemoryLedger::new();
        ledger.record(record(0.5, Utc::now())).unwrap();
        ledger.record(record(0.25, Utc::now())).unwrap();

        let summary = ledger
            .summary_since(Utc::now() - Duration::days(1))
            .unwrap();
        assert_eq!(summary.total_requests, 2);
        assert_eq!(summary.total_tokens, 300);
        assert!((summary.total_cost_usd - 0.75).abs() < 1e-9);
        assert!((summary.average_confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_pricing_known_model() {
        let pricing = PricingTable::default();
        // 1M input + 1M output at gpt-4o-mini rates
        let cost = pricing.cost("gpt-4o-mini", 1_000_000, 1_000_000);
        assert!((cost - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_pricing_unknown_model_uses_fallback() {
        let pricing = PricingTable::default();
        let cost = pricing.cost("some-new-model", 1_000_000, 0);
        assert!((cost - 2.50).abs() < 1e-9);
    }

    #[test]
    fn test_pricing_override() {
        let pricing = PricingTable::default().with_rate(
            "local-llama",
            ModelRate {
                input_per_million: 0.0,
                output_per_million: 0.0,
            },
        );
        assert_eq!(pricing.cost("local-llama", 500_000, 500_000), 0.0);
    }
}
