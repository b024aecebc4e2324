//! Model pricing cache and cost estimation
//!
//! Resolves a per-token price for a model name out of a locally cached map
//! refreshed from two remote sources: the LiteLLM price table and the
//! OpenRouter model list. Each source is fetched independently; a source
//! that fails or times out contributes nothing and is logged as a warning,
//! never raised. With no usable price the answer is `None` ("unknown"), and
//! the aggregator treats that as a zero cost contribution.
//!
//! Lookup is fuzzy: a query and every cached key expand into normalized
//! candidate tokens (separator splits, separator substitutions, cumulative
//! `-` prefixes), matched exact-first and then by candidate overlap.

use crate::config::Config;
use crate::timestamp::TimestampParser;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub const LITELLM_PRICING_URL: &str =
    "https://raw.githubusercontent.com/BerriAI/litellm/main/model_prices_and_context_window.json";
pub const OPENROUTER_PRICING_URL: &str = "https://openrouter.ai/api/v1/models";

const CACHE_FILENAME: &str = "pricing.json";
const REFRESH_INTERVAL_DAYS: i64 = 7;
const FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// The seam the cost aggregator consumes: a price estimate for a model and
/// token counts, or `None` when no pricing is known.
pub trait PriceResolver {
    fn estimate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> Option<f64>;
}

/// Per-token prices for one model key. Absent components are simply not
/// charged; a pricing with no component at all estimates to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub prompt: Option<f64>,
    pub completion: Option<f64>,
    #[serde(default)]
    pub request: Option<f64>,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "litellm".to_string()
}

impl ModelPricing {
    pub fn estimate(&self, input_tokens: u64, output_tokens: u64) -> Option<f64> {
        let mut total = 0.0;
        let mut have_cost = false;
        if let Some(prompt) = self.prompt {
            total += prompt * input_tokens as f64;
            have_cost = true;
        }
        if let Some(completion) = self.completion {
            total += completion * output_tokens as f64;
            have_cost = true;
        }
        if let Some(request) = self.request {
            total += request;
            have_cost = true;
        }
        have_cost.then_some(total)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CachePayload {
    fetched_at: String,
    models: BTreeMap<String, ModelPricing>,
}

/// Locally cached pricing metadata.
///
/// Explicitly constructed and passed by reference; callers wanting
/// process-wide reuse hold the instance themselves. The on-disk cache file
/// carries no lock: concurrent refreshes race benignly, last writer wins.
pub struct PricingCache {
    cache_path: PathBuf,
    models: BTreeMap<String, ModelPricing>,
    fetched_at: Option<DateTime<Utc>>,
}

impl PricingCache {
    pub fn new(config: &Config) -> Self {
        Self::with_cache_path(config.resolve_cache_dir().join(CACHE_FILENAME))
    }

    pub fn with_cache_path(cache_path: PathBuf) -> Self {
        Self {
            cache_path,
            models: BTreeMap::new(),
            fetched_at: None,
        }
    }

    pub fn models(&self) -> &BTreeMap<String, ModelPricing> {
        &self.models
    }

    /// Populate the model map: reuse fresh in-memory data, else adopt a
    /// fresh persisted cache, else fetch remote and persist. `force` skips
    /// straight to the remote fetch.
    pub async fn load(&mut self, force: bool) -> &BTreeMap<String, ModelPricing> {
        if !force && !self.models.is_empty() && !is_stale(self.fetched_at) {
            return &self.models;
        }

        if !force {
            if let Some((models, fetched_at)) = self.read_cache_file() {
                if !is_stale(Some(fetched_at)) {
                    debug!(models = models.len(), "adopted persisted pricing cache");
                    self.models = models;
                    self.fetched_at = Some(fetched_at);
                    return &self.models;
                }
            }
        }

        let (models, fetched_at) = self.fetch_remote().await;
        self.models = models;
        self.fetched_at = Some(fetched_at);
        self.persist();
        &self.models
    }

    fn read_cache_file(&self) -> Option<(BTreeMap<String, ModelPricing>, DateTime<Utc>)> {
        let text = fs::read_to_string(&self.cache_path).ok()?;
        match serde_json::from_str::<CachePayload>(&text) {
            Ok(payload) => {
                let fetched_at = TimestampParser::parse(&payload.fetched_at).ok()?;
                Some((payload.models, fetched_at))
            }
            Err(err) => {
                debug!(error = %err, "failed to load pricing cache");
                None
            }
        }
    }

    fn persist(&self) {
        let Some(fetched_at) = self.fetched_at else {
            return;
        };
        if self.models.is_empty() {
            return;
        }
        if let Err(err) = self.write_cache_file(fetched_at) {
            debug!(error = %err, "failed to persist pricing cache");
        }
    }

    fn write_cache_file(&self, fetched_at: DateTime<Utc>) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent).context("Failed to create pricing cache directory")?;
        }
        let payload = CachePayload {
            fetched_at: fetched_at.to_rfc3339(),
            models: self.models.clone(),
        };
        let rendered = serde_json::to_string_pretty(&payload)?;
        fs::write(&self.cache_path, rendered).with_context(|| {
            format!("Failed to write pricing cache: {}", self.cache_path.display())
        })?;
        Ok(())
    }

    async fn fetch_remote(&self) -> (BTreeMap<String, ModelPricing>, DateTime<Utc>) {
        let mut models = BTreeMap::new();
        let fetched_at = Utc::now();

        let client = match reqwest::Client::builder().timeout(FETCH_TIMEOUT).build() {
            Ok(client) => client,
            Err(err) => {
                warn!(error = %err, "failed to build pricing HTTP client");
                return (models, fetched_at);
            }
        };

        match fetch_json(&client, LITELLM_PRICING_URL).await {
            Ok(payload) => {
                let added = apply_litellm_payload(&mut models, &payload);
                info!(models = added, "fetched litellm pricing");
            }
            Err(err) => warn!(error = %err, "failed to refresh litellm pricing map"),
        }

        match fetch_json(&client, OPENROUTER_PRICING_URL).await {
            Ok(payload) => {
                let added = apply_openrouter_payload(&mut models, &payload);
                info!(models = added, "fetched OpenRouter pricing");
            }
            Err(err) => warn!(error = %err, "failed to refresh OpenRouter pricing data"),
        }

        (models, fetched_at)
    }

    fn lookup(&self, model: &str) -> Option<&ModelPricing> {
        let query = candidate_keys(model);

        // Exact match first, most specific candidate first
        for token in &query {
            if let Some(pricing) = self.models.get(token) {
                return Some(pricing);
            }
        }

        // Loose match: any cached key whose candidate set overlaps ours.
        // BTreeMap iteration makes the tie-break the lexicographically
        // smallest cached key.
        let query_set: HashSet<&String> = query.iter().collect();
        for (key, pricing) in &self.models {
            if candidate_keys(key)
                .iter()
                .any(|candidate| query_set.contains(candidate))
            {
                return Some(pricing);
            }
        }

        None
    }
}

impl PriceResolver for PricingCache {
    fn estimate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> Option<f64> {
        let model = model.trim().to_lowercase();
        if model.is_empty() {
            return None;
        }
        self.lookup(&model)?.estimate(input_tokens, output_tokens)
    }
}

async fn fetch_json(client: &reqwest::Client, url: &str) -> Result<Value> {
    client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request failed: {url}"))?
        .error_for_status()
        .with_context(|| format!("bad status: {url}"))?
        .json()
        .await
        .with_context(|| format!("invalid JSON payload: {url}"))
}

/// Fold the LiteLLM price table into `models`. Entries with no price
/// component are discarded; keys are stored lowercased.
pub(crate) fn apply_litellm_payload(
    models: &mut BTreeMap<String, ModelPricing>,
    payload: &Value,
) -> usize {
    let Some(object) = payload.as_object() else {
        return 0;
    };
    let mut added = 0;
    for (key, info) in object {
        let prompt = info.get("input_cost_per_token").and_then(Value::as_f64);
        let completion = info.get("output_cost_per_token").and_then(Value::as_f64);
        let request = info.get("request_cost").and_then(Value::as_f64);
        if prompt.is_none() && completion.is_none() && request.is_none() {
            continue;
        }
        models.insert(
            key.to_lowercase(),
            ModelPricing {
                prompt,
                completion,
                request,
                source: "litellm".to_string(),
            },
        );
        added += 1;
    }
    added
}

/// Fold the OpenRouter model list into `models`, overwriting colliding keys
/// (the second source fetched wins ties).
pub(crate) fn apply_openrouter_payload(
    models: &mut BTreeMap<String, ModelPricing>,
    payload: &Value,
) -> usize {
    let Some(items) = payload.get("data").and_then(Value::as_array) else {
        return 0;
    };
    let mut added = 0;
    for item in items {
        let Some(id) = item.get("id").and_then(Value::as_str) else {
            continue;
        };
        let pricing = item.get("pricing");
        let prompt = price_component(pricing.and_then(|p| p.get("prompt")));
        let completion = price_component(pricing.and_then(|p| p.get("completion")));
        let request = price_component(pricing.and_then(|p| p.get("request")));
        if prompt.is_none() && completion.is_none() && request.is_none() {
            continue;
        }
        models.insert(
            id.to_lowercase(),
            ModelPricing {
                prompt,
                completion,
                request,
                source: "openrouter".to_string(),
            },
        );
        added += 1;
    }
    added
}

/// OpenRouter publishes prices as strings; empty and `"0"` mean "not
/// charged".
fn price_component(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::String(text) if !text.is_empty() && text != "0" => text.parse().ok(),
        Value::Number(number) => number.as_f64(),
        _ => None,
    }
}

fn is_stale(fetched_at: Option<DateTime<Utc>>) -> bool {
    match fetched_at {
        None => true,
        Some(fetched_at) => Utc::now() - fetched_at > Duration::days(REFRESH_INTERVAL_DAYS),
    }
}

/// Expand a model key into its normalized candidate tokens, most specific
/// first: the key itself, per-separator tail segments and rejoined forms,
/// separator substitutions, then cumulative `-` prefixes longest first.
pub(crate) fn candidate_keys(value: &str) -> Vec<String> {
    fn push(keys: &mut Vec<String>, candidate: String) {
        if !candidate.is_empty() && !keys.contains(&candidate) {
            keys.push(candidate);
        }
    }

    let value = value.trim().to_lowercase();
    if value.is_empty() {
        return Vec::new();
    }

    let mut keys = Vec::new();
    push(&mut keys, value.clone());

    for sep in [':', '/', '.'] {
        if value.contains(sep) {
            let parts: Vec<&str> = value.split(sep).collect();
            if let Some(last) = parts.last() {
                push(&mut keys, last.to_string());
            }
            push(&mut keys, parts.join("."));
        }
    }

    push(&mut keys, value.replace(':', "."));
    push(&mut keys, value.replace('/', "."));
    push(&mut keys, value.replace(':', "/"));

    if value.contains('-') {
        let segments: Vec<&str> = value.split('-').collect();
        for i in (1..=segments.len()).rev() {
            push(&mut keys, segments[..i].join("-"));
        }
    }

    keys
}
