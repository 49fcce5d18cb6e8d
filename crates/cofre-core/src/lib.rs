//! Cofre Core Library
//!
//! Shared functionality for the Cofre statement ingestion and
//! classification pipeline:
//! - Format detection for uploaded statement files (delimited vs OFX)
//! - Statement adapters for Brazilian bank export formats
//! - Description normalization shared by matching, caching and dedup
//! - Deterministic rule engine with tie-break ordering
//! - Bounded TTL classification cache
//! - Usage ledger, pricing table and budget guard for AI spend
//! - Pluggable AI backends (OpenAI-compatible, mock)
//! - Concurrency-capped batch orchestrator

pub mod ai;
pub mod budget;
pub mod cache;
pub mod classify;
pub mod detect;
pub mod error;
pub mod import;
pub mod models;
pub mod normalize;
pub mod ofx;
pub mod rules;

/// Test utilities including a mock chat-completion server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    AIBackend, AIClient, Completion, CompletionParams, MockBackend, OpenAICompatibleBackend,
    Strategy,
};
pub use budget::{
    check_budget, BudgetStatus, MemoryLedger, ModelRate, PricingTable, UsageLedger, UsageSummary,
};
pub use cache::{CacheEntry, CacheStats, ClassificationCache, MIN_CACHE_CONFIDENCE};
pub use classify::{current_period_start, run_batch, Classifier, ClassifyConfig, MAX_BATCH_SIZE};
pub use detect::{decode_bytes, detect_format};
pub use error::{Error, Result};
pub use import::{
    dedup_hash, detect_bradesco_variant, detect_institution, parse_auto, parse_delimited,
    parse_statement, suggest_layout, BradescoVariant,
};
pub use models::{
    BatchItem, BatchOutcome, BatchSummary, CategoryKind, CategoryRef, ClassificationRule,
    ClassificationSource, ColumnMap, DetectedFormat, FieldLayout, Flow, FormatKind, Institution,
    ItemResult, MatchKind, ParseOutcome, ParseRowError, ParsedTransaction, StatementMetadata,
    TextEncoding, UsageRecord,
};
pub use normalize::{normalize, parse_date, parse_value};
pub use ofx::parse_ofx;
pub use rules::{CompiledRule, RuleMatch, RuleSet};
