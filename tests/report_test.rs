use chrono::{TimeZone, Utc};
use llm_telemetry::models::{CostFilters, TelemetryRecord, TokenUsage};
use llm_telemetry::pricing::PriceResolver;
use llm_telemetry::report::build_cost_report;
use llm_telemetry::storage::{LocalStorage, StorageBackend};
use serde_json::{json, Map};
use std::collections::HashMap;
use tempfile::tempdir;

/// A fixed per-call price table, so no report test touches the network.
struct StubPricing {
    per_call: HashMap<String, f64>,
}

impl StubPricing {
    fn new(prices: &[(&str, f64)]) -> Self {
        Self {
            per_call: prices
                .iter()
                .map(|(model, price)| (model.to_string(), *price))
                .collect(),
        }
    }

    fn empty() -> Self {
        Self::new(&[])
    }
}

impl PriceResolver for StubPricing {
    fn estimate_cost(&self, model: &str, _input: u64, _output: u64) -> Option<f64> {
        self.per_call.get(model).copied()
    }
}

fn record(agent: &str, model: &str, cost_usd: f64, success: bool) -> TelemetryRecord {
    let mut metadata = Map::new();
    metadata.insert("project".to_string(), json!("billing"));

    TelemetryRecord {
        timestamp: Utc.with_ymd_and_hms(2026, 8, 15, 12, 0, 0).unwrap(),
        agent_name: agent.to_string(),
        operation: "chat".to_string(),
        model: model.to_string(),
        session_id: "session-1".to_string(),
        user_id: "user-1".to_string(),
        duration_ms: 800,
        tokens: TokenUsage::new(200, 100, 300),
        cost_usd,
        success,
        prompt_hash: None,
        response_hash: None,
        metadata,
        prompt_text: None,
        response_text: None,
    }
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 16, 0, 0, 0).unwrap()
}

#[test]
fn zero_stored_cost_falls_back_to_resolver() {
    let dir = tempdir().unwrap();
    let storage = LocalStorage::at(dir.path(), false, false).unwrap();
    storage.record(&record("assistant", "haiku", 0.0, true)).unwrap();

    let pricing = StubPricing::new(&[("haiku", 0.123)]);
    let report = build_cost_report(dir.path(), 7, &pricing, &CostFilters::default(), Some(now()));

    assert_eq!(report.total_calls, 1);
    assert!((report.total_cost - 0.123).abs() < 1e-9);
    let bucket = report.by_model.get("haiku").unwrap();
    assert_eq!(bucket.calls, 1);
    assert!((bucket.cost_usd - 0.123).abs() < 1e-9);
    assert_eq!(bucket.tokens.input, 200);
}

#[test]
fn stored_cost_is_taken_verbatim_over_estimates() {
    let dir = tempdir().unwrap();
    let storage = LocalStorage::at(dir.path(), false, false).unwrap();
    storage.record(&record("assistant", "haiku", 0.5, true)).unwrap();

    // The resolver disagrees, but the stored non-zero cost wins.
    let pricing = StubPricing::new(&[("haiku", 0.123)]);
    let report = build_cost_report(dir.path(), 7, &pricing, &CostFilters::default(), Some(now()));

    assert!((report.total_cost - 0.5).abs() < 1e-9);
}

#[test]
fn unpriced_records_count_as_zero_cost() {
    let dir = tempdir().unwrap();
    let storage = LocalStorage::at(dir.path(), false, false).unwrap();
    storage.record(&record("assistant", "mystery-model", 0.0, true)).unwrap();

    let report = build_cost_report(
        dir.path(),
        7,
        &StubPricing::empty(),
        &CostFilters::default(),
        Some(now()),
    );

    assert_eq!(report.total_calls, 1);
    assert_eq!(report.total_cost, 0.0);
    assert!(report.by_model.contains_key("mystery-model"));
}

#[test]
fn status_filter_keeps_only_matching_records() {
    let dir = tempdir().unwrap();
    let storage = LocalStorage::at(dir.path(), false, false).unwrap();
    storage.record(&record("alpha", "haiku", 0.1, true)).unwrap();
    storage.record(&record("beta", "haiku", 0.2, false)).unwrap();

    let filters = CostFilters {
        status: Some("failure".to_string()),
        ..CostFilters::default()
    };
    let report = build_cost_report(dir.path(), 7, &StubPricing::empty(), &filters, Some(now()));

    assert_eq!(report.total_calls, 1);
    assert!((report.total_cost - 0.2).abs() < 1e-9);
    assert!(report.by_agent.contains_key("beta"));
    assert!(!report.by_agent.contains_key("alpha"));
}

#[test]
fn agent_filter_is_case_insensitive() {
    let dir = tempdir().unwrap();
    let storage = LocalStorage::at(dir.path(), false, false).unwrap();
    storage.record(&record("Alpha", "haiku", 0.1, true)).unwrap();

    let filters = CostFilters {
        agent: Some("ALPHA".to_string()),
        ..CostFilters::default()
    };
    let report = build_cost_report(dir.path(), 7, &StubPricing::empty(), &filters, Some(now()));

    assert_eq!(report.total_calls, 1);
}

#[test]
fn sections_order_by_descending_cost() {
    let dir = tempdir().unwrap();
    let storage = LocalStorage::at(dir.path(), false, false).unwrap();
    storage.record(&record("alpha", "cheap-model", 0.01, true)).unwrap();
    storage.record(&record("beta", "pricey-model", 0.90, true)).unwrap();
    storage.record(&record("alpha", "cheap-model", 0.02, true)).unwrap();

    let report = build_cost_report(
        dir.path(),
        7,
        &StubPricing::empty(),
        &CostFilters::default(),
        Some(now()),
    );

    let models: Vec<&str> = report.by_model.iter().map(|(name, _)| name).collect();
    assert_eq!(models, vec!["pricey-model", "cheap-model"]);
    assert_eq!(report.by_model.get("cheap-model").unwrap().calls, 2);
    assert_eq!(report.total_calls, 3);
}

#[test]
fn empty_directory_yields_an_empty_report() {
    let dir = tempdir().unwrap();
    let report = build_cost_report(
        dir.path(),
        30,
        &StubPricing::empty(),
        &CostFilters::default(),
        Some(now()),
    );

    assert_eq!(report.total_calls, 0);
    assert_eq!(report.total_cost, 0.0);
    assert!(report.by_model.is_empty());
    assert_eq!(report.window.days, 30);
}
