//! Hybrid classification pipeline and batch orchestrator
//!
//! Per item: rules first, then the classification cache, then the budgeted
//! AI fallback. Rule and cache hits resolve synchronously; only the model
//! call suspends. The orchestrator drains a single shared queue with a
//! fixed pool of workers, so result order is not meaningful; completeness
//! (one result per input item) is the only ordering guarantee.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::ai::{parsing, prompts, AIBackend, AIClient, Strategy, DEFAULT_REQUEST_TIMEOUT};
use crate::budget::{check_budget, PricingTable, UsageLedger};
use crate::cache::ClassificationCache;
use crate::error::{Error, Result};
use crate::models::{
    BatchItem, BatchOutcome, BatchSummary, CategoryRef, ClassificationSource, Flow, ItemResult,
    UsageRecord,
};
use crate::rules::RuleSet;

/// Hard ceiling on batch size, enforced before any worker is spawned
pub const MAX_BATCH_SIZE: usize = 100;

/// Per-batch configuration knobs, all with defaults
#[derive(Debug, Clone)]
pub struct ClassifyConfig {
    pub model: String,
    pub monthly_cap_usd: f64,
    pub near_limit_fraction: f64,
    pub allow_override: bool,
    pub strategy: Strategy,
    pub concurrency: usize,
    pub request_timeout: Duration,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            monthly_cap_usd: 10.0,
            near_limit_fraction: 0.8,
            allow_override: false,
            strategy: Strategy::Balanced,
            concurrency: 5,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// First instant of the current calendar month, the billing period start
pub fn current_period_start() -> DateTime<Utc> {
    let now = Utc::now();
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .expect("first of month is always valid")
}

/// The classification pipeline with its injected collaborators.
///
/// Cheap to clone: every collaborator sits behind an Arc so batch workers
/// can share it.
#[derive(Clone)]
pub struct Classifier {
    rules: Arc<RuleSet>,
    cache: Arc<ClassificationCache>,
    ledger: Arc<dyn UsageLedger>,
    pricing: Arc<PricingTable>,
    client: Option<AIClient>,
    config: ClassifyConfig,
}

impl Classifier {
    pub fn new(
        rules: RuleSet,
        cache: Arc<ClassificationCache>,
        ledger: Arc<dyn UsageLedger>,
        client: Option<AIClient>,
        config: ClassifyConfig,
    ) -> Self {
        let client = client.map(|c| c.with_model(&config.model));
        Self {
            rules: Arc::new(rules),
            cache,
            ledger,
            pricing: Arc::new(PricingTable::default()),
            client,
            config,
        }
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = Arc::new(pricing);
        self
    }

    pub fn cache(&self) -> &ClassificationCache {
        &self.cache
    }

    pub fn config(&self) -> &ClassifyConfig {
        &self.config
    }

    /// Classify a whole batch under the concurrency cap.
    ///
    /// Configuration and budget problems abort before any work starts;
    /// per-item failures are embedded in that item's result and the batch
    /// still succeeds.
    pub async fn classify_batch(
        &self,
        items: Vec<BatchItem>,
        categories: &[CategoryRef],
    ) -> Result<BatchOutcome> {
        if self.client.is_none() {
            return Err(Error::Config(
                "no AI credential configured (set AI_API_KEY or inject a client)".to_string(),
            ));
        }
        if items.is_empty() {
            return Err(Error::Validation("batch is empty".to_string()));
        }
        if items.len() > MAX_BATCH_SIZE {
            return Err(Error::Validation(format!(
                "batch size {} exceeds maximum ({})",
                items.len(),
                MAX_BATCH_SIZE
            )));
        }
        if categories.is_empty() {
            return Err(Error::Validation(
                "category catalog is empty".to_string(),
            ));
        }

        // One budget check per batch, never per item
        let status = check_budget(
            self.ledger.as_ref(),
            current_period_start(),
            self.config.monthly_cap_usd,
            self.config.near_limit_fraction,
        )?;
        if status.is_over_limit {
            if !self.config.allow_override {
                return Err(Error::BudgetExceeded {
                    spent: status.used_usd,
                    cap: self.config.monthly_cap_usd,
                });
            }
            warn!(
                used_usd = status.used_usd,
                cap_usd = self.config.monthly_cap_usd,
                "AI budget exceeded, proceeding under override"
            );
        } else if status.is_near_limit {
            warn!(
                used_usd = status.used_usd,
                cap_usd = self.config.monthly_cap_usd,
                "AI spend is near the monthly cap"
            );
        }

        // Partition the catalog by flow once, before workers spawn
        let mut catalogs: HashMap<Flow, Arc<Vec<CategoryRef>>> = HashMap::new();
        for flow in [Flow::Credit, Flow::Debit] {
            let cats: Vec<CategoryRef> = categories
                .iter()
                .filter(|c| c.kind.matches_flow(flow))
                .cloned()
                .collect();
            catalogs.insert(flow, Arc::new(cats));
        }
        let catalogs = Arc::new(catalogs);

        let total = items.len();
        let concurrency = self.config.concurrency.max(1);
        info!(total, concurrency, "Starting classification batch");

        let this = self.clone();
        let results = run_batch(items, concurrency, move |item: BatchItem| {
            let this = this.clone();
            let catalogs = catalogs.clone();
            async move {
                let cats = catalogs
                    .get(&item.flow)
                    .cloned()
                    .unwrap_or_else(|| Arc::new(Vec::new()));
                this.classify_one(&item, &cats).await
            }
        })
        .await;

        let summary = BatchSummary {
            total: results.len(),
            successful: results
                .iter()
                .filter(|r| r.error.is_none() && r.category_id.is_some())
                .count(),
            failed: results.iter().filter(|r| r.error.is_some()).count(),
            cached: results.iter().filter(|r| r.cached).count(),
            external_calls: results
                .iter()
                .filter(|r| r.source == Some(ClassificationSource::Ai))
                .count(),
        };

        info!(
            successful = summary.successful,
            failed = summary.failed,
            cached = summary.cached,
            external_calls = summary.external_calls,
            "Classification batch finished"
        );

        Ok(BatchOutcome { results, summary })
    }

    /// Classify one item: rules, then cache, then the model.
    ///
    /// Never returns an error: failures become error-shaped results.
    pub async fn classify_one(&self, item: &BatchItem, categories: &[CategoryRef]) -> ItemResult {
        if categories.is_empty() {
            return ItemResult::failed(
                &item.id,
                format!("no categories available for {} transactions", item.flow),
            );
        }

        // Fast path: a rule or cache hit never invokes the model
        if let Some(result) = self.classify_local(item, categories) {
            return result;
        }

        match self.classify_with_model(item, categories).await {
            Ok(result) => result,
            Err(e) => {
                warn!(item = %item.id, error = %e, "Item classification failed");
                ItemResult::failed(&item.id, e.to_string())
            }
        }
    }

    /// The synchronous part of the pipeline: rule engine, then cache.
    /// Usable on its own for previews when no model is configured.
    pub fn classify_local(
        &self,
        item: &BatchItem,
        categories: &[CategoryRef],
    ) -> Option<ItemResult> {
        if let Some(hit) = self.rules.apply(&item.description) {
            let category_name = categories
                .iter()
                .find(|c| c.id == hit.category_id)
                .map(|c| c.name.clone());
            debug!(item = %item.id, category = %hit.category_id, "Rule hit");
            return Some(ItemResult {
                id: item.id.clone(),
                category_id: Some(hit.category_id),
                category_name,
                tags: hit.tags,
                confidence: 1.0,
                reason: hit.reason,
                source: Some(ClassificationSource::Rule),
                cached: false,
                cost_usd: None,
                error: None,
            });
        }

        if let Some(entry) = self.cache.get(&item.description, item.flow) {
            debug!(item = %item.id, category = %entry.category_id, "Cache hit");
            return Some(ItemResult {
                id: item.id.clone(),
                category_id: Some(entry.category_id),
                category_name: Some(entry.category_name),
                tags: None,
                confidence: entry.confidence,
                reason: format!("{} (cache)", entry.reason),
                source: Some(ClassificationSource::Cache),
                cached: true,
                cost_usd: None,
                error: None,
            });
        }

        None
    }

    /// The model fallback: prompt, bounded call, strict parse, ledger write,
    /// cache write above the confidence floor.
    async fn classify_with_model(
        &self,
        item: &BatchItem,
        categories: &[CategoryRef],
    ) -> Result<ItemResult> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::Config("no AI client configured".to_string()))?;

        let prompt = prompts::classification_prompt(item, categories);
        let params = self.config.strategy.params(self.config.request_timeout);
        let completion = client.complete(&prompt, &params).await?;
        let parsed = parsing::parse_classification(&completion.text)?;

        // A category id outside the supplied catalog is nulled; confidence
        // and reasoning survive for observability
        let resolved = parsed
            .category_id
            .as_ref()
            .and_then(|id| categories.iter().find(|c| &c.id == id));
        if parsed.category_id.is_some() && resolved.is_none() {
            debug!(
                item = %item.id,
                returned = ?parsed.category_id,
                "Model returned a category id outside the catalog"
            );
        }

        let cost_usd = self.pricing.cost(
            client.model(),
            completion.prompt_tokens,
            completion.completion_tokens,
        );

        // Only AI-sourced successes update observable spend
        let record = UsageRecord {
            model: client.model().to_string(),
            prompt,
            response: completion.text.clone(),
            prompt_tokens: completion.prompt_tokens,
            completion_tokens: completion.completion_tokens,
            category_id: resolved.map(|c| c.id.clone()),
            confidence: Some(parsed.confidence),
            cost_usd,
            created_at: Utc::now(),
        };
        if let Err(e) = self.ledger.record(record) {
            warn!(error = %e, "Failed to record model usage");
        }

        if let Some(category) = resolved {
            // put() enforces the confidence floor
            self.cache.put(
                &item.description,
                item.flow,
                &category.id,
                &category.name,
                parsed.confidence,
                &parsed.reasoning,
            );
        }

        Ok(ItemResult {
            id: item.id.clone(),
            category_id: resolved.map(|c| c.id.clone()),
            category_name: resolved.map(|c| c.name.clone()),
            tags: None,
            confidence: parsed.confidence,
            reason: parsed.reasoning,
            source: Some(ClassificationSource::Ai),
            cached: false,
            cost_usd: Some(cost_usd),
            error: None,
        })
    }
}

/// Run a handler over every item with a fixed worker pool.
///
/// Spawns `min(concurrency, items.len())` workers that each loop: pop the
/// next item from the shared queue, await the handler, append the result.
/// All workers run to completion before the batch resolves; there is no
/// batch-level cancellation. Results are unordered.
pub async fn run_batch<T, R, F, Fut>(items: Vec<T>, concurrency: usize, handler: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = R> + Send,
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }

    let queue = Arc::new(Mutex::new(VecDeque::from(items)));
    let results = Arc::new(Mutex::new(Vec::with_capacity(total)));

    let workers = concurrency.clamp(1, total);
    let mut set = JoinSet::new();

    for _ in 0..workers {
        let queue = Arc::clone(&queue);
        let results = Arc::clone(&results);
        let handler = handler.clone();

        set.spawn(async move {
            loop {
                // Atomic pop: the lock is released before the handler runs
                let item = queue.lock().unwrap().pop_front();
                match item {
                    Some(item) => {
                        let result = handler(item).await;
                        results.lock().unwrap().push(result);
                    }
                    None => break,
                }
            }
        });
    }

    while set.join_next().await.is_some() {}

    Arc::try_unwrap(results)
        .map(|m| m.into_inner().unwrap())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use crate::budget::MemoryLedger;
    use crate::models::{CategoryKind, ClassificationRule, MatchKind};

    fn category(id: &str, name: &str, kind: CategoryKind) -> CategoryRef {
        CategoryRef {
            id: id.to_string(),
            name: name.to_string(),
            kind,
        }
    }

    fn item(id: &str, description: &str, flow: Flow) -> BatchItem {
        BatchItem {
            id: id.to_string(),
            description: description.to_string(),
            amount: 39.90,
            flow,
        }
    }

    fn classifier_with(client: AIClient, rules: Vec<ClassificationRule>) -> Classifier {
        Classifier::new(
            RuleSet::compile(rules).unwrap(),
            Arc::new(ClassificationCache::default()),
            Arc::new(MemoryLedger::new()),
            Some(client),
            ClassifyConfig {
                model: "mock".to_string(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_run_batch_completeness_across_concurrency() {
        for concurrency in 1..=8 {
            let items: Vec<u32> = (0..8).collect();
            let results = run_batch(items, concurrency, |n: u32| async move { n * 2 }).await;
            assert_eq!(results.len(), 8, "concurrency {}", concurrency);
            let mut sorted = results.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, vec![0, 2, 4, 6, 8, 10, 12, 14]);
        }
    }

    #[tokio::test]
    async fn test_run_batch_concurrency_larger_than_items() {
        let results = run_batch(vec![1, 2], 50, |n: i32| async move { n }).await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_run_batch_empty() {
        let results = run_batch(Vec::<i32>::new(), 4, |n: i32| async move { n }).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_rule_hit_never_calls_model() {
        // A failing model proves rule hits short-circuit before the AI stage
        let rules = vec![ClassificationRule {
            order: 1,
            pattern: "NETFLIX".to_string(),
            match_kind: MatchKind::Contains,
            category_id: "cat-streaming".to_string(),
            tags: None,
            min_confidence: None,
        }];
        let classifier = classifier_with(AIClient::Mock(MockBackend::failing()), rules);
        let cats = vec![category("cat-streaming", "Streaming", CategoryKind::Expense)];

        let result = classifier
            .classify_one(&item("tx-1", "NETFLIX.COM BR", Flow::Debit), &cats)
            .await;

        assert_eq!(result.source, Some(ClassificationSource::Rule));
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.category_id.as_deref(), Some("cat-streaming"));
        assert_eq!(result.category_name.as_deref(), Some("Streaming"));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_cache_hit_never_calls_model() {
        let classifier = classifier_with(AIClient::Mock(MockBackend::failing()), vec![]);
        classifier.cache().put(
            "SPOTIFY",
            Flow::Debit,
            "cat-streaming",
            "Streaming",
            0.9,
            "subscription keyword",
        );
        let cats = vec![category("cat-streaming", "Streaming", CategoryKind::Expense)];

        let result = classifier
            .classify_one(&item("tx-1", "spotify", Flow::Debit), &cats)
            .await;

        assert_eq!(result.source, Some(ClassificationSource::Cache));
        assert!(result.cached);
        assert!(result.reason.ends_with("(cache)"));
    }

    #[tokio::test]
    async fn test_empty_flow_catalog_fails_item_not_batch() {
        let classifier = classifier_with(AIClient::mock(), vec![]);

        let result = classifier
            .classify_one(&item("tx-1", "NETFLIX", Flow::Debit), &[])
            .await;

        assert!(result.error.is_some());
        assert_eq!(result.confidence, 0.0);
        assert!(result.category_id.is_none());
    }

    #[tokio::test]
    async fn test_model_failure_becomes_item_error() {
        let classifier = classifier_with(AIClient::Mock(MockBackend::failing()), vec![]);
        let cats = vec![category("cat-x", "X", CategoryKind::Expense)];

        let result = classifier
            .classify_one(&item("tx-1", "UNKNOWN MERCHANT", Flow::Debit), &cats)
            .await;

        assert!(result.error.is_some());
        assert_eq!(result.source, None);
    }

    #[test]
    fn test_current_period_start_is_first_of_month() {
        use chrono::Timelike;

        let start = current_period_start();
        assert_eq!(start.day(), 1);
        assert_eq!(start.hour(), 0);
        let now = Utc::now();
        assert_eq!(start.month(), now.month());
    }
}

#[cfg(test)]
mod http_tests {
    use super::*;
    use crate::budget::MemoryLedger;
    use crate::models::CategoryKind;
    use crate::rules::RuleSet;
    use crate::test_utils::MockChatServer;
    use crate::OpenAICompatibleBackend;

    #[tokio::test]
    async fn test_pipeline_over_http_backend() {
        let mut server = MockChatServer::start(
            r#"{"category_id": "cat-streaming", "confidence": 0.88, "reasoning": "streaming keyword"}"#,
        )
        .await;

        let backend = OpenAICompatibleBackend::new(&server.url(), "gpt-4o-mini", Some("key"));
        let ledger = Arc::new(MemoryLedger::new());
        let clf = Classifier::new(
            RuleSet::compile(vec![]).unwrap(),
            Arc::new(ClassificationCache::default()),
            ledger.clone(),
            Some(AIClient::OpenAICompatible(backend)),
            ClassifyConfig {
                model: "gpt-4o-mini".to_string(),
                ..Default::default()
            },
        );

        let items = vec![BatchItem {
            id: "tx-1".to_string(),
            description: "NETFLIX.COM".to_string(),
            amount: 39.90,
            flow: Flow::Debit,
        }];
        let cats = vec![CategoryRef {
            id: "cat-streaming".to_string(),
            name: "Streaming".to_string(),
            kind: CategoryKind::Expense,
        }];

        let outcome = clf.classify_batch(items, &cats).await.unwrap();
        let result = &outcome.results[0];
        assert_eq!(result.category_id.as_deref(), Some("cat-streaming"));
        assert_eq!(result.confidence, 0.88);
        assert_eq!(result.source, Some(ClassificationSource::Ai));

        // Token counts flowed through to the ledger with a real cost
        let summary = ledger.summary_since(current_period_start()).unwrap();
        assert_eq!(summary.total_requests, 1);
        assert!(summary.total_tokens > 0);
        assert!(summary.total_cost_usd > 0.0);

        server.stop();
    }

    #[tokio::test]
    async fn test_http_timeout_becomes_item_error_not_batch_failure() {
        let mut server = MockChatServer::start_slow(
            r#"{"category_id": "cat-streaming", "confidence": 0.9, "reasoning": "late"}"#,
            Duration::from_secs(5),
        )
        .await;

        let backend = OpenAICompatibleBackend::new(&server.url(), "gpt-4o-mini", None);
        let clf = Classifier::new(
            RuleSet::compile(vec![]).unwrap(),
            Arc::new(ClassificationCache::default()),
            Arc::new(MemoryLedger::new()),
            Some(AIClient::OpenAICompatible(backend)),
            ClassifyConfig {
                model: "gpt-4o-mini".to_string(),
                request_timeout: Duration::from_millis(250),
                ..Default::default()
            },
        );

        let items = vec![BatchItem {
            id: "tx-1".to_string(),
            description: "NETFLIX.COM".to_string(),
            amount: 39.90,
            flow: Flow::Debit,
        }];
        let cats = vec![CategoryRef {
            id: "cat-streaming".to_string(),
            name: "Streaming".to_string(),
            kind: CategoryKind::Expense,
        }];

        let outcome = clf.classify_batch(items, &cats).await.unwrap();
        assert_eq!(outcome.summary.failed, 1);
        assert!(outcome.results[0].error.is_some());

        server.stop();
    }
}
