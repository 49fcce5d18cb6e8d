//! End-to-end tests for the classification pipeline
//!
//! Drives the full batch path (rules -> cache -> budget -> model) with the
//! mock backend. HTTP-backend behavior (including timeouts) is covered by
//! the unit tests that run against the in-crate mock chat server.

use std::sync::Arc;

use chrono::Utc;

use cofre_core::{
    check_budget, current_period_start, AIClient, BatchItem, CategoryKind, CategoryRef,
    ClassificationCache, ClassificationRule, ClassificationSource, Classifier, ClassifyConfig,
    Error, Flow, MatchKind, MemoryLedger, MockBackend, RuleSet, UsageLedger, UsageRecord,
    MAX_BATCH_SIZE,
};

fn category(id: &str, name: &str, kind: CategoryKind) -> CategoryRef {
    CategoryRef {
        id: id.to_string(),
        name: name.to_string(),
        kind,
    }
}

fn catalog() -> Vec<CategoryRef> {
    vec![
        category("cat-streaming", "Streaming", CategoryKind::Expense),
        category("cat-groceries", "Groceries", CategoryKind::Expense),
        category("cat-salary", "Salary", CategoryKind::Income),
        category("cat-transfer", "Transfers", CategoryKind::Transfer),
    ]
}

fn item(id: &str, description: &str, flow: Flow) -> BatchItem {
    BatchItem {
        id: id.to_string(),
        description: description.to_string(),
        amount: 39.90,
        flow,
    }
}

fn rule(order: i32, pattern: &str, category: &str) -> ClassificationRule {
    ClassificationRule {
        order,
        pattern: pattern.to_string(),
        match_kind: MatchKind::Contains,
        category_id: category.to_string(),
        tags: None,
        min_confidence: None,
    }
}

fn classifier(client: AIClient, rules: Vec<ClassificationRule>) -> Classifier {
    classifier_with_ledger(client, rules, Arc::new(MemoryLedger::new()))
}

fn classifier_with_ledger(
    client: AIClient,
    rules: Vec<ClassificationRule>,
    ledger: Arc<MemoryLedger>,
) -> Classifier {
    Classifier::new(
        RuleSet::compile(rules).unwrap(),
        Arc::new(ClassificationCache::default()),
        ledger,
        Some(client),
        ClassifyConfig {
            model: "mock".to_string(),
            ..Default::default()
        },
    )
}

fn spent(ledger: &MemoryLedger) -> f64 {
    ledger.spend_since(current_period_start()).unwrap()
}

/// Seed the ledger with prior spend inside the current billing period
fn seed_spend(ledger: &MemoryLedger, cost_usd: f64) {
    ledger
        .record(UsageRecord {
            model: "gpt-4o-mini".to_string(),
            prompt: "earlier".to_string(),
            response: "earlier".to_string(),
            prompt_tokens: 10,
            completion_tokens: 10,
            category_id: None,
            confidence: None,
            cost_usd,
            created_at: Utc::now(),
        })
        .unwrap();
}

#[tokio::test]
async fn batch_mixes_rule_cache_and_model_sources() {
    let ledger = Arc::new(MemoryLedger::new());
    let clf = classifier_with_ledger(
        AIClient::mock(),
        vec![rule(1, "NETFLIX", "cat-streaming")],
        ledger.clone(),
    );

    // Pre-seed the cache for one description
    clf.cache().put(
        "PADARIA DO ZE",
        Flow::Debit,
        "cat-groceries",
        "Groceries",
        0.85,
        "bakery keyword",
    );

    let items = vec![
        item("tx-rule", "NETFLIX.COM BR", Flow::Debit),
        item("tx-cache", "Padaria do Zé", Flow::Debit),
        item("tx-ai", "MERCADO NOVO", Flow::Debit),
    ];

    let outcome = clf.classify_batch(items, &catalog()).await.unwrap();

    assert_eq!(outcome.summary.total, 3);
    assert_eq!(outcome.summary.failed, 0);
    assert_eq!(outcome.summary.cached, 1);
    assert_eq!(outcome.summary.external_calls, 1);
    assert_eq!(outcome.summary.successful, 3);

    let by_id = |id: &str| {
        outcome
            .results
            .iter()
            .find(|r| r.id == id)
            .unwrap()
            .clone()
    };

    let rule_hit = by_id("tx-rule");
    assert_eq!(rule_hit.source, Some(ClassificationSource::Rule));
    assert_eq!(rule_hit.confidence, 1.0);

    let cache_hit = by_id("tx-cache");
    assert_eq!(cache_hit.source, Some(ClassificationSource::Cache));
    assert!(cache_hit.cached);
    assert_eq!(cache_hit.category_id.as_deref(), Some("cat-groceries"));

    let ai_hit = by_id("tx-ai");
    assert_eq!(ai_hit.source, Some(ClassificationSource::Ai));
    assert!(ai_hit.cost_usd.is_some());

    // Only the AI call reached the ledger
    let summary = ledger.summary_since(current_period_start()).unwrap();
    assert_eq!(summary.total_requests, 1);
}

#[tokio::test]
async fn ai_success_writes_cache_for_next_batch() {
    let clf = classifier(AIClient::mock(), vec![]);
    let items = vec![item("tx-1", "MERCADO NOVO", Flow::Debit)];

    let first = clf.classify_batch(items.clone(), &catalog()).await.unwrap();
    assert_eq!(first.summary.external_calls, 1);
    assert_eq!(first.summary.cached, 0);

    // Same description again: served from cache, no model call
    let second = clf.classify_batch(items, &catalog()).await.unwrap();
    assert_eq!(second.summary.external_calls, 0);
    assert_eq!(second.summary.cached, 1);
}

#[tokio::test]
async fn low_confidence_answers_are_never_cached() {
    let low = MockBackend::with_response(
        r#"{"category_id": "cat-streaming", "confidence": 0.65, "reasoning": "maybe"}"#,
    );
    let clf = classifier(AIClient::Mock(low), vec![]);
    let items = vec![item("tx-1", "VAGUE MERCHANT", Flow::Debit)];

    let first = clf.classify_batch(items.clone(), &catalog()).await.unwrap();
    assert_eq!(first.summary.external_calls, 1);

    let second = clf.classify_batch(items, &catalog()).await.unwrap();
    // Still a model call: 0.65 sits below the cache floor
    assert_eq!(second.summary.external_calls, 1);
    assert_eq!(second.summary.cached, 0);
}

#[tokio::test]
async fn unknown_category_id_is_nulled_but_observable() {
    let offbase = MockBackend::with_response(
        r#"{"category_id": "cat-does-not-exist", "confidence": 0.9, "reasoning": "hallucinated"}"#,
    );
    let clf = classifier(AIClient::Mock(offbase), vec![]);

    let outcome = clf
        .classify_batch(vec![item("tx-1", "SOMETHING", Flow::Debit)], &catalog())
        .await
        .unwrap();

    let result = &outcome.results[0];
    assert_eq!(result.category_id, None);
    assert_eq!(result.confidence, 0.9);
    assert_eq!(result.reason, "hallucinated");
    assert!(result.error.is_none());
    // Not successful (no category), but not failed either
    assert_eq!(outcome.summary.successful, 0);
    assert_eq!(outcome.summary.failed, 0);
}

#[tokio::test]
async fn missing_credential_rejects_whole_batch() {
    let clf = Classifier::new(
        RuleSet::compile(vec![]).unwrap(),
        Arc::new(ClassificationCache::default()),
        Arc::new(MemoryLedger::new()),
        None,
        ClassifyConfig::default(),
    );

    let result = clf
        .classify_batch(vec![item("tx-1", "NETFLIX", Flow::Debit)], &catalog())
        .await;
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn budget_exceeded_rejects_batch_unless_overridden() {
    let ledger = Arc::new(MemoryLedger::new());
    seed_spend(&ledger, 10.5); // over the 10.0 default cap

    let clf = classifier_with_ledger(AIClient::mock(), vec![], ledger.clone());
    let result = clf
        .classify_batch(vec![item("tx-1", "NETFLIX", Flow::Debit)], &catalog())
        .await;
    assert!(matches!(result, Err(Error::BudgetExceeded { .. })));
    // Rejected before any work: the ledger saw nothing new
    assert_eq!(spent(&ledger), 10.5);

    // Same spend with the override flag: the batch runs
    let clf = Classifier::new(
        RuleSet::compile(vec![]).unwrap(),
        Arc::new(ClassificationCache::default()),
        ledger.clone(),
        Some(AIClient::mock()),
        ClassifyConfig {
            model: "mock".to_string(),
            allow_override: true,
            ..Default::default()
        },
    );
    let outcome = clf
        .classify_batch(vec![item("tx-1", "NETFLIX", Flow::Debit)], &catalog())
        .await
        .unwrap();
    assert_eq!(outcome.summary.total, 1);
}

#[tokio::test]
async fn near_limit_spend_does_not_reject() {
    let ledger = Arc::new(MemoryLedger::new());
    seed_spend(&ledger, 9.5);

    let status = check_budget(ledger.as_ref(), current_period_start(), 10.0, 0.8).unwrap();
    assert!(status.is_near_limit);
    assert!(!status.is_over_limit);

    let clf = classifier_with_ledger(AIClient::mock(), vec![], ledger);
    let outcome = clf
        .classify_batch(vec![item("tx-1", "NETFLIX", Flow::Debit)], &catalog())
        .await
        .unwrap();
    assert_eq!(outcome.summary.total, 1);
}

#[tokio::test]
async fn oversized_batch_rejected_before_processing() {
    let ledger = Arc::new(MemoryLedger::new());
    let clf = classifier_with_ledger(AIClient::mock(), vec![], ledger.clone());

    let items: Vec<BatchItem> = (0..MAX_BATCH_SIZE + 1)
        .map(|i| item(&format!("tx-{}", i), "NETFLIX", Flow::Debit))
        .collect();
    let result = clf.classify_batch(items, &catalog()).await;
    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(spent(&ledger), 0.0);
}

#[tokio::test]
async fn batch_of_exactly_one_hundred_is_accepted() {
    let clf = classifier(AIClient::mock(), vec![rule(1, "NETFLIX", "cat-streaming")]);

    let items: Vec<BatchItem> = (0..MAX_BATCH_SIZE)
        .map(|i| item(&format!("tx-{}", i), "NETFLIX", Flow::Debit))
        .collect();
    let outcome = clf.classify_batch(items, &catalog()).await.unwrap();
    assert_eq!(outcome.summary.total, MAX_BATCH_SIZE);
    assert_eq!(outcome.summary.successful, MAX_BATCH_SIZE);
}

#[tokio::test]
async fn empty_batch_is_rejected() {
    let clf = classifier(AIClient::mock(), vec![]);
    let result = clf.classify_batch(vec![], &catalog()).await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[tokio::test]
async fn empty_catalog_is_rejected() {
    let clf = classifier(AIClient::mock(), vec![]);
    let result = clf
        .classify_batch(vec![item("tx-1", "NETFLIX", Flow::Debit)], &[])
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[tokio::test]
async fn item_failures_never_abort_the_batch() {
    let clf = classifier(
        AIClient::Mock(MockBackend::failing()),
        vec![rule(1, "NETFLIX", "cat-streaming")],
    );

    let items = vec![
        item("tx-ok", "NETFLIX.COM", Flow::Debit), // rule hit survives
        item("tx-fail-1", "UNKNOWN A", Flow::Debit),
        item("tx-fail-2", "UNKNOWN B", Flow::Debit),
    ];
    let outcome = clf.classify_batch(items, &catalog()).await.unwrap();

    assert_eq!(outcome.summary.total, 3);
    assert_eq!(outcome.summary.successful, 1);
    assert_eq!(outcome.summary.failed, 2);
    assert!(outcome
        .results
        .iter()
        .filter(|r| r.error.is_some())
        .all(|r| r.category_id.is_none() && r.confidence == 0.0));
}

#[tokio::test]
async fn completeness_holds_for_every_concurrency() {
    for concurrency in [1usize, 2, 5, 50] {
        let clf = Classifier::new(
            RuleSet::compile(vec![rule(1, "NETFLIX", "cat-streaming")]).unwrap(),
            Arc::new(ClassificationCache::default()),
            Arc::new(MemoryLedger::new()),
            Some(AIClient::mock()),
            ClassifyConfig {
                model: "mock".to_string(),
                concurrency,
                ..Default::default()
            },
        );

        let items: Vec<BatchItem> = (0..20)
            .map(|i| item(&format!("tx-{}", i), "NETFLIX", Flow::Debit))
            .collect();
        let outcome = clf.classify_batch(items, &catalog()).await.unwrap();

        assert_eq!(outcome.summary.total, 20, "concurrency {}", concurrency);
        // Exactly one result per input id
        let mut ids: Vec<&str> = outcome.results.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 20, "concurrency {}", concurrency);
    }
}

#[tokio::test]
async fn credit_items_use_income_side_of_catalog() {
    // The only income category is cat-salary; the mock answers with the
    // first id in the prompt, which must come from the credit partition.
    let clf = classifier(AIClient::mock(), vec![]);
    let outcome = clf
        .classify_batch(
            vec![item("tx-1", "DEPOSITO EMPRESA", Flow::Credit)],
            &catalog(),
        )
        .await
        .unwrap();

    let result = &outcome.results[0];
    assert_eq!(result.category_id.as_deref(), Some("cat-salary"));
}

#[tokio::test]
async fn cache_is_isolated_per_instance() {
    // Two classifiers with separate caches do not share hits
    let clf_a = classifier(AIClient::mock(), vec![]);
    let clf_b = classifier(AIClient::mock(), vec![]);

    let items = vec![item("tx-1", "MERCADO NOVO", Flow::Debit)];
    clf_a
        .classify_batch(items.clone(), &catalog())
        .await
        .unwrap();
    assert_eq!(clf_a.cache().stats().size, 1);
    assert_eq!(clf_b.cache().stats().size, 0);

    let outcome = clf_b.classify_batch(items, &catalog()).await.unwrap();
    assert_eq!(outcome.summary.external_calls, 1);
}
