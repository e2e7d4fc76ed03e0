use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::lang;
use crate::roles::{GlossaryEntry, RoleRegistry};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Tasks to run, one book each
    #[serde(default)]
    pub tasks: Vec<Task>,

    /// Shared HTTP client settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Book store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Per-role backend settings, keyed by role name
    #[serde(default)]
    pub backends: HashMap<String, BackendSettings>,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// One book bound to one source URL with its processing chain
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Task {
    /// Source URL, the identity of the book
    pub url: String,

    /// Human-readable label used in logs and reports
    #[serde(default)]
    pub friendly_name: String,

    /// Source language tag (ISO 639-1 or 639-2)
    #[serde(default = "default_source_lang")]
    pub source_lang: String,

    /// Target language tag
    #[serde(default = "default_target_lang")]
    pub target_lang: String,

    /// Explicit fetcher role name; when absent, registered fetchers are
    /// probed in order with `can_handle`
    #[serde(default)]
    pub fetcher: Option<String>,

    /// Translator role names applied in sequence: lines a translator leaves
    /// untranslated fall through to the next one
    #[serde(default)]
    pub translators: Vec<String>,

    /// Exporter role names, all run independently over the finalized tree
    #[serde(default)]
    pub exporters: Vec<String>,

    /// Glossary guidance pairs for this task
    #[serde(default)]
    pub glossary: Vec<GlossaryEntry>,
}

impl Default for Task {
    fn default() -> Self {
        Self {
            url: String::new(),
            friendly_name: String::new(),
            source_lang: default_source_lang(),
            target_lang: default_target_lang(),
            fetcher: None,
            translators: Vec::new(),
            exporters: Vec::new(),
            glossary: Vec::new(),
        }
    }
}

impl Task {
    /// Label for logs: the friendly name when set, the URL otherwise
    pub fn label(&self) -> &str {
        if self.friendly_name.is_empty() {
            &self.url
        } else {
            &self.friendly_name
        }
    }
}

/// Shared HTTP client settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientConfig {
    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Connection/read timeout in seconds
    #[serde(default = "default_client_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_client_timeout_secs(),
        }
    }
}

impl ClientConfig {
    /// Build the process-scoped HTTP client from these settings
    pub fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .context("Failed to build HTTP client")
    }
}

/// Book store settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// Store directory; defaults to the platform data directory
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Upserts buffered before an automatic flush; 0 flushes immediately
    #[serde(default = "default_write_buffer_size")]
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            write_buffer_size: default_write_buffer_size(),
        }
    }
}

/// Per-role backend settings consumed by the scheduler and orchestrator
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackendSettings {
    /// Retries per batch before bisection kicks in
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff between retries, doubled per attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Per-call timeout; a timed-out call counts as one retry attempt
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Every Nth batch re-includes the full glossary in the request context
    #[serde(default = "default_remind_interval")]
    pub remind_interval: u32,

    /// Override the backend's own skip-translated behavior; unset keeps the
    /// backend's declared default
    #[serde(default)]
    pub skip_translated: Option<bool>,

    /// Cap on source characters per batch; the effective budget is the
    /// smaller of this and the backend's declared limit
    #[serde(default)]
    pub max_batch_chars: Option<usize>,

    /// Cap on in-flight batches; the effective concurrency is the smaller of
    /// this and the backend's declared limit
    #[serde(default)]
    pub max_concurrency: Option<usize>,

    /// Requests per minute; unset falls back to the backend's declared rate
    /// limit, if any
    #[serde(default)]
    pub rate_limit: Option<u32>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            remind_interval: default_remind_interval(),
            skip_translated: None,
            max_batch_chars: None,
            max_concurrency: None,
            rate_limit: None,
        }
    }
}

/// Log level for the application
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_source_lang() -> String {
    "ja".to_string()
}

fn default_target_lang() -> String {
    "en".to_string()
}

fn default_user_agent() -> String {
    format!("bookforge/{}", env!("CARGO_PKG_VERSION"))
}

fn default_client_timeout_secs() -> u64 {
    30
}

fn default_write_buffer_size() -> usize {
    0
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_remind_interval() -> u32 {
    3
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Write this configuration to a JSON file
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Backend settings for a role name, falling back to defaults
    pub fn backend(&self, role_name: &str) -> BackendSettings {
        self.backends.get(role_name).cloned().unwrap_or_default()
    }

    /// Validate structural settings: URLs and language tags
    pub fn validate(&self) -> Result<()> {
        for task in &self.tasks {
            url::Url::parse(&task.url)
                .map_err(|e| anyhow!("Task '{}' has an invalid URL: {}", task.label(), e))?;
            lang::validate_language_tag(&task.source_lang)
                .with_context(|| format!("Task '{}' source language", task.label()))?;
            lang::validate_language_tag(&task.target_lang)
                .with_context(|| format!("Task '{}' target language", task.label()))?;
        }
        Ok(())
    }

    /// Validate every role name in every task against the static set of
    /// registered roles. Fails fast on an unknown name or a name that belongs
    /// to the wrong capability family, rather than deferring to first use.
    pub fn validate_roles(&self, registry: &RoleRegistry) -> Result<()> {
        for task in &self.tasks {
            if let Some(name) = &task.fetcher {
                registry
                    .fetcher(name)
                    .with_context(|| format!("Task '{}' fetcher", task.label()))?;
            }
            for name in &task.translators {
                registry
                    .translator(name)
                    .with_context(|| format!("Task '{}' translator", task.label()))?;
            }
            for name in &task.exporters {
                registry
                    .exporter(name)
                    .with_context(|| format!("Task '{}' exporter", task.label()))?;
            }
        }
        Ok(())
    }
}
