//! LLM Telemetry Library
//!
//! Telemetry persistence and cost reporting for LLM CLI tools. Each LLM API
//! call becomes one [`TelemetryRecord`] appended to date-partitioned JSONL
//! files under a telemetry root, alongside an incrementally maintained
//! summary; later queries scan the window they need and aggregate costs,
//! estimating prices for records that carry none.
//!
//! ## Architecture Overview
//!
//! - [`models`] - record, summary, and report data structures
//! - [`storage`] - the [`storage::StorageBackend`] capability and the local
//!   JSONL backend with per-file advisory locking
//! - [`reader`] - lazy, restartable iteration over a time window
//! - [`report`] - filtered cost aggregation grouped by model and agent
//! - [`pricing`] - remote-refreshed pricing cache with fuzzy model matching
//! - [`tracker`] - call tracking, record construction, pushgateway export
//! - [`config`] - configuration with env overrides
//! - [`logging`] - structured logging setup
//! - [`display`] - terminal and JSON report rendering
//!
//! ## Example
//!
//! ```no_run
//! use llm_telemetry::config::Config;
//! use llm_telemetry::storage::{LocalStorage, StorageBackend};
//! use llm_telemetry::tracker::CallTracker;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let storage = LocalStorage::new(&config)?;
//!
//! let mut tracker = CallTracker::new("doc-finder", "search");
//! tracker.start();
//! // ... make the LLM call ...
//! tracker.record_response(90, 60, 0.0, "claude-3-5-haiku", true);
//! storage.record(&tracker.finish(&config))?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod display;
pub mod logging;
pub mod models;
pub mod pricing;
pub mod reader;
pub mod report;
pub mod storage;
pub mod timestamp;
pub mod tracker;

pub use models::{CostFilters, CostReport, Summary, TelemetryEntry, TelemetryRecord, TokenUsage};
pub use pricing::{PriceResolver, PricingCache};
pub use reader::{iter_last_n_days, iter_telemetry_records};
pub use report::build_cost_report;
pub use storage::{LocalStorage, StorageBackend};
pub use tracker::CallTracker;
