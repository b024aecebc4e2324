//! Telemetry storage backends
//!
//! One concrete backend exists: [`LocalStorage`], which appends records to
//! date-partitioned JSONL files and keeps a running `summary.json` per root.
//! The [`StorageBackend`] trait is the seam for alternate sinks (database,
//! remote) without touching the reader or the aggregator.
//!
//! Concurrency discipline: every file mutation takes an exclusive advisory
//! lock on a `<path>.lock` sidecar before touching the file, so independent
//! processes writing the same day's file or the same summary serialize.
//! Different files never contend. The summary update is a whole-document
//! read-modify-write under its lock; a crash between read and write can lose
//! that one increment but never corrupts the file.

use crate::config::Config;
use crate::models::{Summary, TelemetryEntry, TelemetryRecord};
use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use serde::Serialize;
use serde_json::json;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const TELEMETRY_FILENAME: &str = "telemetry.jsonl";
pub const PROMPTS_FILENAME: &str = "prompts.jsonl";
pub const RESPONSES_FILENAME: &str = "responses.jsonl";
pub const SUMMARY_FILENAME: &str = "summary.json";

/// Capability to persist one telemetry record.
pub trait StorageBackend {
    /// Persist a record. Errors are fatal for this call only; callers are
    /// expected to log and continue rather than crash the host workflow.
    fn record(&self, record: &TelemetryRecord) -> Result<()>;
}

/// JSONL storage under a telemetry root:
///
/// ```text
/// <root>/<YYYY-MM-DD>/telemetry.jsonl
/// <root>/<YYYY-MM-DD>/prompts.jsonl      (toggle + prompt present)
/// <root>/<YYYY-MM-DD>/responses.jsonl    (toggle + response present)
/// <root>/summary.json
/// ```
pub struct LocalStorage {
    base_dir: PathBuf,
    store_prompts: bool,
    store_responses: bool,
}

impl LocalStorage {
    pub fn new(config: &Config) -> Result<Self> {
        Self::at(
            config.resolve_telemetry_dir(),
            config.telemetry.store_prompts,
            config.telemetry.store_responses,
        )
    }

    /// Open a backend over an explicit root, creating it if needed.
    pub fn at(
        base_dir: impl Into<PathBuf>,
        store_prompts: bool,
        store_responses: bool,
    ) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).with_context(|| {
            format!("Failed to create telemetry root: {}", base_dir.display())
        })?;
        Ok(Self {
            base_dir,
            store_prompts,
            store_responses,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn lock_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Take the advisory lock guarding `path`. Released when the returned
    /// handle drops.
    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = Self::lock_path(path);
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;
        FileExt::lock_exclusive(&lock_file)
            .with_context(|| format!("Failed to lock: {}", lock_path.display()))?;
        Ok(lock_file)
    }

    fn append_jsonl<T: Serialize>(path: &Path, payload: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create day directory: {}", parent.display()))?;
        }

        let line = serde_json::to_string(payload).context("Failed to serialize payload")?;

        let _lock = Self::acquire_lock(path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open for append: {}", path.display()))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .with_context(|| format!("Failed to append to: {}", path.display()))?;
        Ok(())
    }

    fn update_summary(path: &Path, entry: &TelemetryEntry) -> Result<()> {
        let _lock = Self::acquire_lock(path)?;

        // Only a missing file starts a fresh summary; an unreadable one must
        // not be silently reinitialized, or the accumulated totals are lost.
        let mut summary = match fs::read_to_string(path) {
            Ok(text) => serde_json::from_str::<Summary>(&text)
                .with_context(|| format!("Corrupt summary file: {}", path.display()))?,
            Err(err) if err.kind() == ErrorKind::NotFound => Summary::default(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read summary: {}", path.display()))
            }
        };

        summary.apply(entry);

        let rendered =
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?;
        fs::write(path, rendered)
            .with_context(|| format!("Failed to write summary: {}", path.display()))?;
        Ok(())
    }
}

impl StorageBackend for LocalStorage {
    fn record(&self, record: &TelemetryRecord) -> Result<()> {
        let date_dir = self
            .base_dir
            .join(record.timestamp.format("%Y-%m-%d").to_string());
        let entry = record.to_entry();

        Self::append_jsonl(&date_dir.join(TELEMETRY_FILENAME), &entry)?;
        Self::update_summary(&self.base_dir.join(SUMMARY_FILENAME), &entry)?;

        if self.store_prompts {
            if let Some(prompt) = &record.prompt_text {
                Self::append_jsonl(
                    &date_dir.join(PROMPTS_FILENAME),
                    &json!({
                        "timestamp": entry.timestamp,
                        "agent_name": record.agent_name,
                        "operation": record.operation,
                        "prompt_hash": record.prompt_hash,
                        "prompt": prompt,
                    }),
                )?;
            }
        }

        if self.store_responses {
            if let Some(response) = &record.response_text {
                Self::append_jsonl(
                    &date_dir.join(RESPONSES_FILENAME),
                    &json!({
                        "timestamp": entry.timestamp,
                        "agent_name": record.agent_name,
                        "operation": record.operation,
                        "response_hash": record.response_hash,
                        "response": response,
                    }),
                )?;
            }
        }

        debug!(
            agent = %record.agent_name,
            operation = %record.operation,
            "telemetry record persisted"
        );
        Ok(())
    }
}
