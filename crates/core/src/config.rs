//! Pipeline configuration.
//!
//! Connection details live with the crates that own the connections. This
//! module holds the settings of the three pipeline components. Intervals and
//! prefixes are deployment-specific and must be supplied; only tuning knobs
//! carry defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationErrors};

use crate::error::{Error, Result};
use crate::signal::Signal;
use crate::watermark::{RetryPolicy, DEFAULT_CURSOR_KEY};

/// Long-running loop a process can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    LoaderTraces,
    LoaderLogs,
    LoaderMetrics,
    Enricher,
    Backup,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::LoaderTraces,
        Role::LoaderLogs,
        Role::LoaderMetrics,
        Role::Enricher,
        Role::Backup,
    ];

    /// Signal handled by a loader role.
    pub fn loader_signal(&self) -> Option<Signal> {
        match self {
            Self::LoaderTraces => Some(Signal::Traces),
            Self::LoaderLogs => Some(Signal::Logs),
            Self::LoaderMetrics => Some(Signal::Metrics),
            Self::Enricher | Self::Backup => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LoaderTraces => "loader-traces",
            Self::LoaderLogs => "loader-logs",
            Self::LoaderMetrics => "loader-metrics",
            Self::Enricher => "enricher",
            Self::Backup => "backup",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| Error::config(format!("unknown role: {}", s)))
    }
}

/// Sleep durations between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// After a cycle that did work.
    pub busy: Duration,
    /// After a cycle that found nothing to do, or failed.
    pub idle: Duration,
}

impl Schedule {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            busy: interval,
            idle: interval,
        }
    }
}

fn required<T: Copy>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| Error::config(format!("{} is required", field)))
}

/// File loader settings for one signal.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoaderConfig {
    /// Object-storage prefix the signal's files land under.
    #[validate(required, length(min = 1))]
    pub prefix: Option<String>,
    #[validate(required)]
    pub busy_interval_secs: Option<u64>,
    #[validate(required, range(min = 1))]
    pub idle_interval_secs: Option<u64>,
    /// Rows per INSERT statement.
    #[serde(default = "default_insert_batch_size")]
    #[validate(range(min = 1, max = 1_000_000))]
    pub insert_batch_size: usize,
    /// Concurrent downloads per cycle.
    #[serde(default = "default_max_file_workers")]
    #[validate(range(min = 1, max = 64))]
    pub max_file_workers: usize,
    /// Stop retrying a failed file after this many attempts. Unset retries forever.
    #[serde(default)]
    #[validate(range(min = 1))]
    pub max_attempts: Option<u32>,
}

fn default_insert_batch_size() -> usize {
    5000
}

fn default_max_file_workers() -> usize {
    4
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            busy_interval_secs: None,
            idle_interval_secs: None,
            insert_batch_size: default_insert_batch_size(),
            max_file_workers: default_max_file_workers(),
            max_attempts: None,
        }
    }
}

impl LoaderConfig {
    pub fn prefix(&self) -> Result<&str> {
        self.prefix
            .as_deref()
            .ok_or_else(|| Error::config("loader prefix is required"))
    }

    pub fn schedule(&self) -> Result<Schedule> {
        Ok(Schedule {
            busy: Duration::from_secs(required(self.busy_interval_secs, "busy_interval_secs")?),
            idle: Duration::from_secs(required(self.idle_interval_secs, "idle_interval_secs")?),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
        }
    }
}

/// Loader settings for all three signals.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct LoadersConfig {
    #[serde(default)]
    #[validate(nested)]
    pub traces: LoaderConfig,
    #[serde(default)]
    #[validate(nested)]
    pub logs: LoaderConfig,
    #[serde(default)]
    #[validate(nested)]
    pub metrics: LoaderConfig,
}

impl LoadersConfig {
    pub fn for_signal(&self, signal: Signal) -> &LoaderConfig {
        match signal {
            Signal::Traces => &self.traces,
            Signal::Logs => &self.logs,
            Signal::Metrics => &self.metrics,
        }
    }
}

/// Enrichment tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EnricherConfig {
    /// Rows fetched and embedded per batch.
    #[serde(default = "default_enrich_batch_size")]
    #[validate(range(min = 1, max = 10_000))]
    pub batch_size: usize,
    #[serde(default = "default_cursor_key")]
    #[validate(length(min = 1, max = 128))]
    pub cursor_key: String,
    #[validate(required)]
    pub busy_interval_secs: Option<u64>,
    #[validate(required, range(min = 1))]
    pub idle_interval_secs: Option<u64>,
}

fn default_enrich_batch_size() -> usize {
    256
}

fn default_cursor_key() -> String {
    DEFAULT_CURSOR_KEY.to_string()
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            batch_size: default_enrich_batch_size(),
            cursor_key: default_cursor_key(),
            busy_interval_secs: None,
            idle_interval_secs: None,
        }
    }
}

impl EnricherConfig {
    pub fn schedule(&self) -> Result<Schedule> {
        Ok(Schedule {
            busy: Duration::from_secs(required(self.busy_interval_secs, "busy_interval_secs")?),
            idle: Duration::from_secs(required(self.idle_interval_secs, "idle_interval_secs")?),
        })
    }
}

/// Backup coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BackupConfig {
    /// Raw tables whose partitions are backed up.
    #[serde(default = "default_backup_tables")]
    #[validate(length(min = 1))]
    pub tables: Vec<String>,
    #[validate(required, range(min = 1))]
    pub interval_secs: Option<u64>,
    /// Backup bucket URL as reachable from the ClickHouse server, e.g.
    /// `http://minio:9000/otel-backups`. Exports land under
    /// `<export_url>/<table>/<partition>/`.
    #[validate(required, url)]
    pub export_url: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub max_attempts: Option<u32>,
    /// Days after its date before a daily partition counts as closed and is
    /// exported. `1` exports yesterday's partition from midnight UTC on;
    /// larger values leave room for late files.
    #[serde(default = "default_settle_days")]
    #[validate(range(min = 1, max = 365))]
    pub settle_days: u32,
}

fn default_settle_days() -> u32 {
    1
}

fn default_backup_tables() -> Vec<String> {
    Signal::ALL.iter().map(|s| s.raw_table().to_string()).collect()
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            tables: default_backup_tables(),
            interval_secs: None,
            export_url: None,
            max_attempts: None,
            settle_days: default_settle_days(),
        }
    }
}

impl BackupConfig {
    pub fn schedule(&self) -> Result<Schedule> {
        let secs = required(self.interval_secs, "interval_secs")?;
        Ok(Schedule::fixed(Duration::from_secs(secs)))
    }

    pub fn export_url(&self) -> Result<&str> {
        self.export_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .ok_or_else(|| Error::config("backup.export_url is required"))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
        }
    }
}

/// Embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible API; `/embeddings` is appended.
    #[validate(required, url)]
    pub url: Option<String>,
    #[validate(required, length(min = 1))]
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// Expected vector length; responses of another length are rejected.
    #[validate(range(min = 1))]
    pub dimensions: Option<usize>,
    #[serde(default = "default_embedding_timeout_secs")]
    #[validate(range(min = 1, max = 600))]
    pub timeout_secs: u64,
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: None,
            model: None,
            api_key: None,
            dimensions: None,
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

/// Validate a configuration section, flattening field errors into one message.
pub fn validate_section<T: Validate>(section: &str, value: &T) -> Result<()> {
    value
        .validate()
        .map_err(|e| Error::config(format!("{}: {}", section, describe(&e))))
}

fn describe(errors: &ValidationErrors) -> String {
    let mut fields: Vec<String> = errors
        .errors()
        .keys()
        .map(|field| field.to_string())
        .collect();
    fields.sort();
    format!("invalid or missing fields [{}]", fields.join(", "))
}
