//! Core data models for statement ingestion and classification

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Direction of money movement for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    /// Money in (income)
    Credit,
    /// Money out (expense)
    Debit,
}

impl Flow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }

    /// Infer flow from a signed amount (negative = debit)
    pub fn from_signed(amount: f64) -> Self {
        if amount < 0.0 {
            Self::Debit
        } else {
            Self::Credit
        }
    }
}

impl std::str::FromStr for Flow {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "credit" | "in" => Ok(Self::Credit),
            "debit" | "out" => Ok(Self::Debit),
            _ => Err(format!("Unknown flow: {}", s)),
        }
    }
}

impl std::fmt::Display for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of category in the user's catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Income,
    Expense,
    Transfer,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }

    /// Whether a category of this kind is offered for a given flow.
    /// Transfers can appear on either side.
    pub fn matches_flow(&self, flow: Flow) -> bool {
        match self {
            Self::Income => flow == Flow::Credit,
            Self::Expense => flow == Flow::Debit,
            Self::Transfer => true,
        }
    }
}

impl std::str::FromStr for CategoryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            _ => Err(format!("Unknown category kind: {}", s)),
        }
    }
}

impl std::fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A category from the user's catalog, validated at the pipeline boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CategoryKind,
}

/// Detected file kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    /// Separator-delimited text (CSV and friends)
    Delimited,
    /// SGML-like tagged export (OFX)
    Tagged,
}

impl FormatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delimited => "delimited",
            Self::Tagged => "tagged",
        }
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Character encoding guessed from file content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// UTF-8 with a leading byte-order mark
    Utf8Bom,
    /// Legacy 8-bit Latin encoding (ISO-8859-1), common in older bank exports
    Latin1,
}

impl TextEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Utf8Bom => "utf-8-bom",
            Self::Latin1 => "iso-8859-1",
        }
    }
}

impl std::fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Best-effort format guess for an uploaded statement file.
///
/// Produced by `detect::detect_format`, consumed by adapter selection.
/// Callers may threshold on `confidence`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFormat {
    pub kind: FormatKind,
    /// 0.0..=1.0, how sure the detector is about `kind`
    pub confidence: f64,
    pub separator: Option<char>,
    /// Header cells if the first row looks like a header
    pub header: Option<Vec<String>>,
    pub encoding: TextEncoding,
}

/// Column indices into a delimited statement row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnMap {
    pub date: usize,
    pub description: usize,
    pub amount: usize,
    /// Optional column carrying a credit/debit keyword
    #[serde(default)]
    pub flow: Option<usize>,
    #[serde(default)]
    pub document: Option<usize>,
    #[serde(default)]
    pub balance: Option<usize>,
}

/// Field layout for one institution's delimited export.
///
/// Statically defined per institution, read-only at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldLayout {
    pub separator: char,
    pub decimal_separator: char,
    /// Rows to skip before data starts (usually the header)
    pub rows_to_skip: usize,
    /// chrono format string tried before the generic date patterns
    #[serde(default)]
    pub date_format: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub columns: ColumnMap,
}

fn default_currency() -> String {
    "BRL".to_string()
}

/// Supported institutions with built-in layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Institution {
    Nubank,
    Inter,
    Bradesco,
    Itau,
    Santander,
    BancoDoBrasil,
}

impl Institution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nubank => "nubank",
            Self::Inter => "inter",
            Self::Bradesco => "bradesco",
            Self::Itau => "itau",
            Self::Santander => "santander",
            Self::BancoDoBrasil => "bb",
        }
    }
}

impl std::str::FromStr for Institution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nubank" => Ok(Self::Nubank),
            "inter" => Ok(Self::Inter),
            "bradesco" => Ok(Self::Bradesco),
            "itau" => Ok(Self::Itau),
            "santander" => Ok(Self::Santander),
            "bb" | "bancodobrasil" | "banco_do_brasil" => Ok(Self::BancoDoBrasil),
            _ => Err(format!("Unknown institution: {}", s)),
        }
    }
}

impl std::fmt::Display for Institution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One transaction parsed out of a statement file.
///
/// Amounts are stored as absolute values with a separate `flow` so that
/// downstream aggregation never has to guess sign conventions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTransaction {
    pub date: NaiveDate,
    pub description: String,
    /// Absolute magnitude, never negative
    pub amount: f64,
    pub flow: Flow,
    #[serde(default)]
    pub document_ref: Option<String>,
    #[serde(default)]
    pub running_balance: Option<f64>,
    pub currency: String,
    #[serde(default)]
    pub counterparty: Option<String>,
    /// SHA-256 over date, normalized description, amount and flow
    pub dedup_hash: String,
    /// 1-based row in the source file, for error reporting
    pub source_row: usize,
}

/// A row that could not be parsed into a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseRowError {
    pub row: usize,
    #[serde(default)]
    pub field: Option<String>,
    pub message: String,
}

/// Statement-level metadata extracted during parsing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatementMetadata {
    /// Adapter that produced the transactions (e.g. "bradesco_account")
    pub source_format: String,
    #[serde(default)]
    pub institution: Option<Institution>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub bank_id: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
}

/// Result of parsing one statement file.
///
/// Row failures are collected in `errors` and never abort the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOutcome {
    pub transactions: Vec<ParsedTransaction>,
    pub metadata: StatementMetadata,
    pub errors: Vec<ParseRowError>,
    /// Data rows examined (after skipping configured header rows)
    pub rows_total: usize,
}

/// Pattern matching kind for classification rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Regular expression, compiled case-insensitively
    Regex,
    /// Case- and accent-insensitive substring match
    Contains,
    StartsWith,
    EndsWith,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regex => "regex",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
        }
    }
}

impl std::str::FromStr for MatchKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "regex" => Ok(Self::Regex),
            "contains" => Ok(Self::Contains),
            "starts_with" | "startswith" | "prefix" => Ok(Self::StartsWith),
            "ends_with" | "endswith" | "suffix" => Ok(Self::EndsWith),
            _ => Err(format!("Unknown match kind: {}", s)),
        }
    }
}

/// A user-authored rule mapping a description shape to a category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRule {
    /// Lower order wins; ties broken by category id
    pub order: i32,
    pub pattern: String,
    pub match_kind: MatchKind,
    pub category_id: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Carried for rule-management collaborators; rule hits always
    /// classify at confidence 1.0
    #[serde(default)]
    pub min_confidence: Option<f64>,
}

/// How a classification was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    Rule,
    Cache,
    Ai,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Cache => "cache",
            Self::Ai => "ai",
        }
    }
}

impl std::fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One transaction to classify in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    /// Caller-supplied id used to correlate results (order is not preserved)
    pub id: String,
    pub description: String,
    pub amount: f64,
    pub flow: Flow,
}

/// Per-item classification result returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResult {
    pub id: String,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    /// Tags attached by the winning rule, if any
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    pub confidence: f64,
    pub reason: String,
    /// None for failed or unclassifiable items
    pub source: Option<ClassificationSource>,
    pub cached: bool,
    #[serde(default)]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ItemResult {
    /// Error-shaped result for an item that could not be classified.
    /// A single item's failure never aborts the batch.
    pub fn failed(id: &str, message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            category_id: None,
            category_name: None,
            tags: None,
            confidence: 0.0,
            reason: String::new(),
            source: None,
            cached: false,
            cost_usd: None,
            error: Some(message.into()),
        }
    }
}

/// Aggregate counters for a finished batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub cached: usize,
    pub external_calls: usize,
}

/// Results plus summary for one batch request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub results: Vec<ItemResult>,
    pub summary: BatchSummary,
}

/// A single usage-ledger entry for an external model call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub model: String,
    pub prompt: String,
    pub response: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub category_id: Option<String>,
    pub confidence: Option<f64>,
    pub cost_usd: f64,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}
