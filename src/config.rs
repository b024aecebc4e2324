//! Runtime configuration
//!
//! Centralized configuration with runtime defaults, optional TOML file
//! loading, and environment variable overrides. The telemetry root and the
//! prompt/response storage toggles consumed by the storage backend live here,
//! as do the pricing cache directory and the pushgateway endpoint.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Telemetry capture and storage configuration
    pub telemetry: TelemetryConfig,

    /// Outbound metrics configuration
    pub metrics: MetricsConfig,

    /// Paths configuration
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub storage_enabled: bool,
    /// Telemetry root; relative paths resolve against the working directory.
    pub directory: PathBuf,
    pub store_prompts: bool,
    pub store_responses: bool,
    pub project_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub pushgateway_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub cache_dir: PathBuf,
    pub log_directory: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "ERROR".to_string(),
                format: "pretty".to_string(),
                output: "console".to_string(),
            },
            telemetry: TelemetryConfig {
                enabled: true,
                storage_enabled: true,
                directory: PathBuf::from(".llm-telemetry"),
                store_prompts: false,
                store_responses: false,
                project_name: default_project_name(),
            },
            metrics: MetricsConfig {
                pushgateway_url: "http://localhost:7101".to_string(),
            },
            paths: PathsConfig {
                cache_dir: dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".cache")
                    .join("llm-telemetry"),
                log_directory: PathBuf::from("logs"),
            },
        }
    }
}

fn default_project_name() -> String {
    env::current_dir()
        .ok()
        .and_then(|cwd| cwd.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Permissive boolean parsing for environment toggles.
fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => true,
        "0" | "false" | "no" | "n" | "off" => false,
        _ => default,
    }
}

impl Config {
    /// Load configuration from file, environment, and defaults.
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        let config_paths = [
            PathBuf::from("llm-telemetry.toml"),
            PathBuf::from(".llm-telemetry.toml"),
            dirs::config_dir()
                .map(|d| d.join("llm-telemetry").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.exists() {
                info!(config_file = %path.display(), "Loading configuration from file");
                config = Self::load_from_file(path)?;
                break;
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        if let Ok(val) = env::var("LLM_TELEMETRY_ENABLED") {
            self.telemetry.enabled = parse_bool(&val, self.telemetry.enabled);
        }
        if let Ok(val) = env::var("LLM_TELEMETRY_STORAGE_ENABLED") {
            self.telemetry.storage_enabled = parse_bool(&val, self.telemetry.storage_enabled);
        }
        if let Ok(val) = env::var("LLM_TELEMETRY_DIR") {
            self.telemetry.directory = PathBuf::from(val);
        }
        if let Ok(val) = env::var("LLM_STORE_PROMPTS") {
            self.telemetry.store_prompts = parse_bool(&val, self.telemetry.store_prompts);
        }
        if let Ok(val) = env::var("LLM_STORE_RESPONSES") {
            self.telemetry.store_responses = parse_bool(&val, self.telemetry.store_responses);
        }
        if let Ok(val) = env::var("LLM_PROJECT_NAME") {
            self.telemetry.project_name = val;
        }

        if let Ok(val) = env::var("LLM_PUSHGATEWAY_URL") {
            self.metrics.pushgateway_url = val;
        }
        if let Ok(val) = env::var("LLM_CACHE_DIR") {
            self.paths.cache_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("LLM_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.telemetry.project_name.is_empty() {
            anyhow::bail!("Project name must not be empty");
        }

        // The log directory only matters when file output is requested
        if self.logging.output != "console" && !self.paths.log_directory.exists() {
            fs::create_dir_all(&self.paths.log_directory)
                .context("Failed to create log directory")?;
        }

        Ok(())
    }

    /// Absolute telemetry root for the current working directory.
    pub fn resolve_telemetry_dir(&self) -> PathBuf {
        if self.telemetry.directory.is_absolute() {
            self.telemetry.directory.clone()
        } else {
            env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(&self.telemetry.directory)
        }
    }

    pub fn resolve_cache_dir(&self) -> PathBuf {
        self.paths.cache_dir.clone()
    }
}

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration instance.
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(|| Config::load().unwrap_or_default())
}
