//! Core data models
//!
//! The data pipeline runs through three shapes:
//!
//! 1. [`TelemetryRecord`] - one observation of a single LLM call, built by the
//!    caller (normally a [`crate::tracker::CallTracker`]) after the call
//!    completes; immutable once constructed.
//! 2. [`TelemetryEntry`] - the persisted JSONL line. Every field is
//!    serde-defaulted so a partial or foreign line still reads back instead of
//!    aborting a scan.
//! 3. [`Summary`] / [`CostReport`] - aggregated views. The summary is an
//!    incremental accumulator maintained on every write; the report is
//!    computed per query from the raw lines.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One observation of a single LLM call, ready for persistence.
///
/// `prompt_text` / `response_text` never land in `telemetry.jsonl`; the
/// storage backend routes them to side files when the config toggles allow.
#[derive(Debug, Clone)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub agent_name: String,
    pub operation: String,
    pub model: String,
    pub session_id: String,
    pub user_id: String,
    pub duration_ms: u64,
    pub tokens: TokenUsage,
    /// Zero means "unknown, estimate from pricing at report time".
    pub cost_usd: f64,
    pub success: bool,
    pub prompt_hash: Option<String>,
    pub response_hash: Option<String>,
    pub metadata: Map<String, Value>,
    pub prompt_text: Option<String>,
    pub response_text: Option<String>,
}

impl TelemetryRecord {
    /// Build the JSONL payload for this record.
    pub fn to_entry(&self) -> TelemetryEntry {
        TelemetryEntry {
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, false),
            agent_name: self.agent_name.clone(),
            operation: self.operation.clone(),
            model: self.model.clone(),
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            duration_ms: self.duration_ms,
            tokens: self.tokens.clone(),
            cost_usd: Some(self.cost_usd),
            success: self.success,
            prompt_hash: self.prompt_hash.clone(),
            response_hash: self.response_hash.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Token counts for one call. `total` is whatever the API reported; it need
/// not equal `input + output`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64, total: u64) -> Self {
        Self {
            input,
            output,
            total: Some(total),
        }
    }

    /// Reported total when present, otherwise `input + output`.
    pub fn effective_total(&self) -> u64 {
        self.total.unwrap_or(self.input + self.output)
    }
}

fn default_true() -> bool {
    true
}

/// A persisted telemetry line.
///
/// Deserialization is deliberately tolerant: missing fields default rather
/// than fail, and `success` defaults to true, so a report never aborts on a
/// line written by an older or foreign producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEntry {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub tokens: TokenUsage,
    #[serde(default)]
    pub cost_usd: Option<f64>,
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub prompt_hash: Option<String>,
    #[serde(default)]
    pub response_hash: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Round at `digits` decimal places, matching the rounding applied to
/// persisted cost totals.
pub(crate) fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

pub(crate) fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenTotals {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryBucket {
    #[serde(default)]
    pub calls: u64,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub tokens: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    #[serde(default)]
    pub success: u64,
    #[serde(default)]
    pub failure: u64,
}

/// Running totals for one telemetry root, stored as `summary.json`.
///
/// Invariant: at any point the summary equals the fold of every entry
/// appended to this root so far. It is never recomputed, only incremented
/// (under the summary file lock).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub total_calls: u64,
    #[serde(default)]
    pub total_tokens: TokenTotals,
    #[serde(default)]
    pub by_model: BTreeMap<String, SummaryBucket>,
    #[serde(default)]
    pub by_agent: BTreeMap<String, SummaryBucket>,
    #[serde(default)]
    pub by_status: StatusCounts,
}

impl Summary {
    /// Fold one entry into the running totals.
    pub fn apply(&mut self, entry: &TelemetryEntry) {
        let cost = entry.cost_usd.unwrap_or(0.0);
        let input = entry.tokens.input;
        let output = entry.tokens.output;
        let total = entry.tokens.effective_total();

        let agent = non_empty_or(&entry.agent_name, "unknown");
        let model = non_empty_or(&entry.model, "unknown");

        self.total_calls += 1;
        self.total_cost = round_to(self.total_cost + cost, 10);
        self.total_tokens.input += input;
        self.total_tokens.output += output;
        self.total_tokens.total += total;

        let model_bucket = self.by_model.entry(model.to_string()).or_default();
        model_bucket.calls += 1;
        model_bucket.cost_usd = round_to(model_bucket.cost_usd + cost, 10);
        model_bucket.tokens += total;

        let agent_bucket = self.by_agent.entry(agent.to_string()).or_default();
        agent_bucket.calls += 1;
        agent_bucket.cost_usd = round_to(agent_bucket.cost_usd + cost, 10);
        agent_bucket.tokens += total;

        if entry.success {
            self.by_status.success += 1;
        } else {
            self.by_status.failure += 1;
        }
    }
}

/// Filters applied by the cost report; all active filters are ANDed and
/// matched case-insensitively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportBucket {
    pub cost_usd: f64,
    pub calls: u64,
    pub tokens: TokenTotals,
}

/// A per-model or per-agent breakdown, kept in descending-cost order and
/// serialized as a JSON object in that order. Ties keep first-seen order.
#[derive(Debug, Clone, Default)]
pub struct ReportSection {
    entries: Vec<(String, ReportBucket)>,
}

impl ReportSection {
    pub fn accumulate(&mut self, key: &str, cost: f64, tokens: &TokenUsage) {
        let index = match self.entries.iter().position(|(name, _)| name == key) {
            Some(index) => index,
            None => {
                self.entries.push((key.to_string(), ReportBucket::default()));
                self.entries.len() - 1
            }
        };
        let bucket = &mut self.entries[index].1;
        bucket.cost_usd = round_to(bucket.cost_usd + cost, 6);
        bucket.calls += 1;
        bucket.tokens.total += tokens.effective_total();
        bucket.tokens.input += tokens.input;
        bucket.tokens.output += tokens.output;
    }

    /// Stable sort, so equal costs keep accumulation order.
    pub fn sort_by_cost(&mut self) {
        self.entries
            .sort_by(|a, b| b.1.cost_usd.total_cmp(&a.1.cost_usd));
    }

    pub fn get(&self, key: &str) -> Option<&ReportBucket> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, bucket)| bucket)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ReportBucket)> {
        self.entries
            .iter()
            .map(|(name, bucket)| (name.as_str(), bucket))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ReportSection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, bucket) in &self.entries {
            map.serialize_entry(name, bucket)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportWindow {
    pub start: String,
    pub end: String,
    pub days: i64,
}

/// The shape consumed by any rendering layer; field names and the
/// descending-cost section order are part of the contract.
#[derive(Debug, Clone, Serialize)]
pub struct CostReport {
    pub total_cost: f64,
    pub total_calls: u64,
    pub total_tokens: TokenTotals,
    pub currency: String,
    pub by_model: ReportSection,
    pub by_agent: ReportSection,
    pub filters: CostFilters,
    pub window: ReportWindow,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(agent: &str, model: &str, cost: f64, success: bool) -> TelemetryEntry {
        TelemetryEntry {
            timestamp: "2026-08-01T00:00:00+00:00".to_string(),
            agent_name: agent.to_string(),
            operation: "search".to_string(),
            model: model.to_string(),
            session_id: "session".to_string(),
            user_id: "user".to_string(),
            duration_ms: 900,
            tokens: TokenUsage::new(90, 60, 150),
            cost_usd: Some(cost),
            success,
            prompt_hash: None,
            response_hash: None,
            metadata: Map::new(),
        }
    }

    #[test]
    fn summary_folds_sequential_entries() {
        let mut summary = Summary::default();
        summary.apply(&entry("doc-finder", "claude-3-5-haiku", 0.1, true));
        summary.apply(&entry("doc-finder", "claude-3-5-haiku", 0.2, true));
        summary.apply(&entry("git-info", "gpt-4o", 0.05, false));

        assert_eq!(summary.total_calls, 3);
        assert!((summary.total_cost - 0.35).abs() < 1e-10);
        assert_eq!(summary.total_tokens.input, 270);
        assert_eq!(summary.total_tokens.total, 450);
        assert_eq!(summary.by_model["claude-3-5-haiku"].calls, 2);
        assert_eq!(summary.by_agent["git-info"].tokens, 150);
        assert_eq!(summary.by_status.success, 2);
        assert_eq!(summary.by_status.failure, 1);
    }

    #[test]
    fn entry_deserializes_with_missing_fields() {
        let entry: TelemetryEntry =
            serde_json::from_str(r#"{"timestamp": "2026-08-01T00:00:00Z"}"#).unwrap();
        assert!(entry.success);
        assert_eq!(entry.tokens.effective_total(), 0);
        assert_eq!(entry.cost_usd, None);
        assert!(entry.metadata.is_empty());
    }

    #[test]
    fn effective_total_prefers_reported_value() {
        let reported = TokenUsage::new(10, 20, 100);
        assert_eq!(reported.effective_total(), 100);

        let derived = TokenUsage {
            input: 10,
            output: 20,
            total: None,
        };
        assert_eq!(derived.effective_total(), 30);
    }

    #[test]
    fn section_sorts_descending_and_keeps_tie_order() {
        let mut section = ReportSection::default();
        let tokens = TokenUsage::new(1, 1, 2);
        section.accumulate("first", 0.1, &tokens);
        section.accumulate("second", 0.1, &tokens);
        section.accumulate("expensive", 0.9, &tokens);
        section.sort_by_cost();

        let order: Vec<&str> = section.iter().map(|(name, _)| name).collect();
        assert_eq!(order, vec!["expensive", "first", "second"]);
    }

    #[test]
    fn section_serializes_as_ordered_object() {
        let mut section = ReportSection::default();
        section.accumulate("cheap", 0.1, &TokenUsage::new(1, 1, 2));
        section.accumulate("pricey", 0.5, &TokenUsage::new(1, 1, 2));
        section.sort_by_cost();

        let json = serde_json::to_string(&section).unwrap();
        let pricey = json.find("pricey").unwrap();
        let cheap = json.find("cheap").unwrap();
        assert!(pricey < cheap);
    }

    #[test]
    fn record_payload_round_trips() {
        let record = TelemetryRecord {
            timestamp: Utc::now(),
            agent_name: "tester".to_string(),
            operation: "verify".to_string(),
            model: "claude-3-5-haiku".to_string(),
            session_id: "s".to_string(),
            user_id: "u".to_string(),
            duration_ms: 12,
            tokens: TokenUsage::new(5, 7, 12),
            cost_usd: 0.0025,
            success: true,
            prompt_hash: Some("sha256:abc".to_string()),
            response_hash: None,
            metadata: Map::new(),
            prompt_text: None,
            response_text: None,
        };

        let line = serde_json::to_string(&record.to_entry()).unwrap();
        let back: TelemetryEntry = serde_json::from_str(&line).unwrap();
        assert_eq!(back.agent_name, "tester");
        assert_eq!(back.tokens.total, Some(12));
        assert_eq!(back.cost_usd, Some(0.0025));
        assert_eq!(back.prompt_hash.as_deref(), Some("sha256:abc"));
    }
}
