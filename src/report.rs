//! Cost report aggregation
//!
//! Drives the record reader over a trailing window, applies filters, prices
//! unpriced records through a [`PriceResolver`], and groups totals by model
//! and by agent. A record with a stored non-zero cost keeps it verbatim; one
//! without gets a pricing estimate, or zero when no pricing is known - a
//! single unpriced record never fails the whole report.

use crate::models::{
    non_empty_or, round_to, CostFilters, CostReport, ReportSection, ReportWindow, TelemetryEntry,
    TokenTotals,
};
use crate::pricing::PriceResolver;
use crate::reader::iter_telemetry_records;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::path::Path;

/// Aggregate cost metrics for telemetry records in `[now - days, now]`.
pub fn build_cost_report(
    base_dir: &Path,
    days: i64,
    pricing: &dyn PriceResolver,
    filters: &CostFilters,
    now: Option<DateTime<Utc>>,
) -> CostReport {
    let now = now.unwrap_or_else(Utc::now);
    let start = now - Duration::days(days);

    let mut total_cost = 0.0;
    let mut total_calls = 0u64;
    let mut total_input_tokens = 0u64;
    let mut total_output_tokens = 0u64;

    let mut by_model = ReportSection::default();
    let mut by_agent = ReportSection::default();

    for entry in iter_telemetry_records(base_dir, start, now, None) {
        if !matches_filters(&entry, filters) {
            continue;
        }

        let cost = match entry.cost_usd {
            Some(cost) if cost != 0.0 => cost,
            _ => pricing
                .estimate_cost(entry.model.trim(), entry.tokens.input, entry.tokens.output)
                .unwrap_or(0.0),
        };

        total_calls += 1;
        total_cost += cost;
        total_input_tokens += entry.tokens.input;
        total_output_tokens += entry.tokens.output;

        by_model.accumulate(non_empty_or(&entry.model, "unknown"), cost, &entry.tokens);
        by_agent.accumulate(
            non_empty_or(&entry.agent_name, "unknown"),
            cost,
            &entry.tokens,
        );
    }

    by_model.sort_by_cost();
    by_agent.sort_by_cost();

    CostReport {
        total_cost: round_to(total_cost, 6),
        total_calls,
        total_tokens: TokenTotals {
            input: total_input_tokens,
            output: total_output_tokens,
            total: total_input_tokens + total_output_tokens,
        },
        currency: "USD".to_string(),
        by_model,
        by_agent,
        filters: filters.clone(),
        window: ReportWindow {
            start: start.to_rfc3339(),
            end: now.to_rfc3339(),
            days,
        },
    }
}

/// All active filters must match; matching ignores case.
fn matches_filters(entry: &TelemetryEntry, filters: &CostFilters) -> bool {
    if let Some(project) = &filters.project {
        let matched = entry
            .metadata
            .get("project")
            .and_then(Value::as_str)
            .map(|value| value.to_lowercase() == project.to_lowercase())
            .unwrap_or(false);
        if !matched {
            return false;
        }
    }

    if let Some(agent) = &filters.agent {
        if entry.agent_name.is_empty() || entry.agent_name.to_lowercase() != agent.to_lowercase() {
            return false;
        }
    }

    if let Some(model) = &filters.model {
        if entry.model.is_empty() || entry.model.to_lowercase() != model.to_lowercase() {
            return false;
        }
    }

    if let Some(status) = &filters.status {
        match status.to_lowercase().as_str() {
            "success" if !entry.success => return false,
            "failure" if entry.success => return false,
            _ => {}
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenUsage;
    use serde_json::{json, Map};

    fn entry(agent: &str, model: &str, project: Option<&str>, success: bool) -> TelemetryEntry {
        let mut metadata = Map::new();
        if let Some(project) = project {
            metadata.insert("project".to_string(), json!(project));
        }
        TelemetryEntry {
            timestamp: "2026-08-01T00:00:00+00:00".to_string(),
            agent_name: agent.to_string(),
            operation: "search".to_string(),
            model: model.to_string(),
            session_id: "session".to_string(),
            user_id: "user".to_string(),
            duration_ms: 100,
            tokens: TokenUsage::new(10, 5, 15),
            cost_usd: Some(0.1),
            success,
            prompt_hash: None,
            response_hash: None,
            metadata,
        }
    }

    #[test]
    fn filters_are_case_insensitive_and_anded() {
        let record = entry("Doc-Finder", "Claude-3-5-Haiku", Some("MyProject"), true);

        let matching = CostFilters {
            project: Some("myproject".to_string()),
            agent: Some("doc-finder".to_string()),
            model: Some("claude-3-5-haiku".to_string()),
            status: Some("success".to_string()),
        };
        assert!(matches_filters(&record, &matching));

        let one_wrong = CostFilters {
            agent: Some("other-agent".to_string()),
            ..matching
        };
        assert!(!matches_filters(&record, &one_wrong));
    }

    #[test]
    fn project_filter_fails_when_metadata_absent() {
        let record = entry("doc-finder", "claude-3-5-haiku", None, true);
        let filters = CostFilters {
            project: Some("anything".to_string()),
            ..CostFilters::default()
        };
        assert!(!matches_filters(&record, &filters));
    }

    #[test]
    fn status_filter_selects_by_success_flag() {
        let failed = entry("a", "m", None, false);
        let failure_filter = CostFilters {
            status: Some("failure".to_string()),
            ..CostFilters::default()
        };
        let success_filter = CostFilters {
            status: Some("success".to_string()),
            ..CostFilters::default()
        };
        assert!(matches_filters(&failed, &failure_filter));
        assert!(!matches_filters(&failed, &success_filter));
    }

    #[test]
    fn no_filters_match_everything() {
        let record = entry("a", "m", None, false);
        assert!(matches_filters(&record, &CostFilters::default()));
    }
}
