//! Call tracking
//!
//! The standard producer of telemetry records. A [`CallTracker`] times one
//! LLM operation, collects tokens/cost/model as the caller reports them, and
//! builds an immutable [`TelemetryRecord`] when the operation finishes. It
//! can also push best-effort counters to a Prometheus pushgateway; push
//! failures are logged and swallowed, never surfaced to the caller's
//! workflow.

use crate::config::Config;
use crate::models::{TelemetryRecord, TokenUsage};
use chrono::{DateTime, Utc};
use serde_json::{json, Map};
use sha2::{Digest, Sha256};
use std::env;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, warn};

const PUSH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Hash content for storage alongside (or instead of) the raw text.
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("sha256:{digest:x}")
}

/// Session identity detected from the environment.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub user_id: String,
    pub working_directory: PathBuf,
    pub start_time: DateTime<Utc>,
}

impl SessionInfo {
    /// Read session identity from the environment, falling back to an
    /// hour-scoped pseudo-session id derived from user and directory so
    /// calls made within the same hour correlate.
    pub fn detect() -> Self {
        let user_id = env::var("LLM_USER_ID")
            .or_else(|_| env::var("USER"))
            .unwrap_or_else(|_| "unknown".to_string());
        let working_directory = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let session_id = env::var("LLM_SESSION_ID")
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| {
                let hour = Utc::now().timestamp() / 3600;
                let seed = format!("{user_id}-{}-{hour}", working_directory.display());
                let digest = Sha256::digest(seed.as_bytes());
                let short: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
                format!("env-{short}")
            });

        Self {
            session_id,
            user_id,
            working_directory,
            start_time: Utc::now(),
        }
    }
}

/// Tracks one LLM operation from start to record.
pub struct CallTracker {
    agent_name: String,
    operation: String,
    started: Option<Instant>,
    tokens: TokenUsage,
    cost_usd: f64,
    model: String,
    success: bool,
    session: SessionInfo,
    prompt_text: Option<String>,
    response_text: Option<String>,
}

impl CallTracker {
    pub fn new(agent_name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            operation: operation.into(),
            started: None,
            tokens: TokenUsage::default(),
            cost_usd: 0.0,
            model: "unknown".to_string(),
            success: true,
            session: SessionInfo::detect(),
            prompt_text: None,
            response_text: None,
        }
    }

    /// Start timing the operation.
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn record_tokens(&mut self, input: u64, output: u64, total: Option<u64>) {
        self.tokens = TokenUsage {
            input,
            output,
            total: Some(total.unwrap_or(input + output)),
        };
    }

    pub fn record_cost(&mut self, cost_usd: f64) {
        self.cost_usd = cost_usd;
    }

    pub fn record_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn record_success(&mut self, success: bool) {
        self.success = success;
    }

    pub fn record_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt_text = Some(prompt.into());
    }

    pub fn record_response_text(&mut self, response: impl Into<String>) {
        self.response_text = Some(response.into());
    }

    /// Record complete response data in one call.
    pub fn record_response(
        &mut self,
        input: u64,
        output: u64,
        cost_usd: f64,
        model: impl Into<String>,
        success: bool,
    ) {
        self.record_tokens(input, output, None);
        self.record_cost(cost_usd);
        self.record_model(model);
        self.record_success(success);
    }

    pub fn duration_ms(&self) -> u64 {
        self.started
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    /// Build the immutable record for this operation. Content hashes are
    /// present only when the corresponding text was supplied; metadata
    /// always carries the configured project name.
    pub fn finish(&self, config: &Config) -> TelemetryRecord {
        let mut metadata = Map::new();
        metadata.insert(
            "project".to_string(),
            json!(config.telemetry.project_name),
        );
        metadata.insert(
            "working_directory".to_string(),
            json!(self.session.working_directory.display().to_string()),
        );

        TelemetryRecord {
            timestamp: Utc::now(),
            agent_name: self.agent_name.clone(),
            operation: self.operation.clone(),
            model: self.model.clone(),
            session_id: self.session.session_id.clone(),
            user_id: self.session.user_id.clone(),
            duration_ms: self.duration_ms(),
            tokens: self.tokens.clone(),
            cost_usd: self.cost_usd,
            success: self.success,
            prompt_hash: self.prompt_text.as_deref().map(content_hash),
            response_hash: self.response_text.as_deref().map(content_hash),
            metadata,
            prompt_text: self.prompt_text.clone(),
            response_text: self.response_text.clone(),
        }
    }

    /// Push counters for this operation to a Prometheus pushgateway in text
    /// exposition format. Best effort: returns whether the push succeeded.
    pub async fn push_metrics(&self, pushgateway_url: &str) -> bool {
        if self.started.is_none() {
            warn!("tracker was never started, cannot report a duration");
            return false;
        }

        let duration_ms = self.duration_ms();
        let session_id = &self.session.session_id;
        let user_id = &self.session.user_id;
        let agent = &self.agent_name;
        let model = &self.model;
        let total_tokens = self.tokens.effective_total();

        let url = format!(
            "{pushgateway_url}/metrics/job/llm_agents/agent/{agent}/session_id/{session_id}/user_id/{user_id}/timestamp/{}",
            Utc::now().timestamp_millis()
        );

        let body = format!(
            concat!(
                "llm_agent_usage_total{{agent_name=\"{agent}\",operation=\"{operation}\",model=\"{model}\",success=\"{success}\",user=\"{user}\"}} 1\n",
                "llm_agent_duration_ms_total{{agent_name=\"{agent}\",session_id=\"{session}\",user=\"{user}\"}} {duration}\n",
                "llm_agent_tokens_total{{agent_name=\"{agent}\",model=\"{model}\",user=\"{user}\"}} {total}\n",
                "llm_agent_input_tokens_total{{agent_name=\"{agent}\",model=\"{model}\",user=\"{user}\"}} {input}\n",
                "llm_agent_output_tokens_total{{agent_name=\"{agent}\",model=\"{model}\",user=\"{user}\"}} {output}\n",
                "llm_agent_cost_usd_total{{agent_name=\"{agent}\",model=\"{model}\",user=\"{user}\"}} {cost}\n",
            ),
            agent = agent,
            operation = self.operation,
            model = model,
            success = self.success,
            user = user_id,
            session = session_id,
            duration = duration_ms,
            total = total_tokens,
            input = self.tokens.input,
            output = self.tokens.output,
            cost = self.cost_usd,
        );

        let client = match reqwest::Client::builder().timeout(PUSH_TIMEOUT).build() {
            Ok(client) => client,
            Err(err) => {
                warn!(error = %err, "failed to build pushgateway client");
                return false;
            }
        };

        match client
            .post(&url)
            .header("Content-Type", "text/plain")
            .body(body)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!(
                    agent = %agent,
                    operation = %self.operation,
                    duration_ms,
                    total_tokens,
                    "telemetry metrics pushed"
                );
                true
            }
            Ok(response) => {
                warn!(status = %response.status(), "pushgateway rejected metrics");
                false
            }
            Err(err) => {
                warn!(error = %err, "pushgateway push failed");
                false
            }
        }
    }
}
