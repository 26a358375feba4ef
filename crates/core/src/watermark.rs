//! Watermark ledger: durable progress records for files, partitions and cursors.
//!
//! The ledger is append-only. Every attempt writes a new record; readers
//! resolve each key to its most recent record and never rely on the key being
//! physically unique in storage.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};
use crate::signal::Signal;

/// Key of the single enrichment cursor.
pub const DEFAULT_CURSOR_KEY: &str = "global";

/// Terminal outcome of one processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    Done,
    Failed,
}

impl WorkStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for WorkStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(Error::internal(format!("unknown ledger status: {}", other))),
        }
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved state of a ledger key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerState {
    Unseen,
    Done,
    Failed,
}

impl LedgerState {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl From<Option<WorkStatus>> for LedgerState {
    fn from(status: Option<WorkStatus>) -> Self {
        match status {
            None => Self::Unseen,
            Some(WorkStatus::Done) => Self::Done,
            Some(WorkStatus::Failed) => Self::Failed,
        }
    }
}

/// Common view over file and partition records, used by [`RetryPolicy`].
pub trait LedgerRecord {
    fn status(&self) -> WorkStatus;
    fn attempts(&self) -> u32;
}

/// Processing outcome of one object-storage file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    pub status: WorkStatus,
    pub processed_at: DateTime<Utc>,
    pub row_count: u64,
    pub error_message: String,
    /// Number of attempts made so far, this one included.
    pub attempts: u32,
}

impl FileRecord {
    pub fn done(filename: impl Into<String>, row_count: u64, attempts: u32) -> Self {
        Self {
            filename: filename.into(),
            status: WorkStatus::Done,
            processed_at: Utc::now(),
            row_count,
            error_message: String::new(),
            attempts,
        }
    }

    pub fn failed(filename: impl Into<String>, error: impl Into<String>, attempts: u32) -> Self {
        Self {
            filename: filename.into(),
            status: WorkStatus::Failed,
            processed_at: Utc::now(),
            row_count: 0,
            error_message: error.into(),
            attempts,
        }
    }
}

impl LedgerRecord for FileRecord {
    fn status(&self) -> WorkStatus {
        self.status
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Backup outcome of one table partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionRecord {
    pub table_name: String,
    pub partition_id: String,
    pub status: WorkStatus,
    pub processed_at: DateTime<Utc>,
    pub attempts: u32,
}

impl PartitionRecord {
    pub fn new(
        table_name: impl Into<String>,
        partition_id: impl Into<String>,
        status: WorkStatus,
        attempts: u32,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            partition_id: partition_id.into(),
            status,
            processed_at: Utc::now(),
            attempts,
        }
    }
}

impl LedgerRecord for PartitionRecord {
    fn status(&self) -> WorkStatus {
        self.status
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Position in the `(Timestamp, SpanId)` order of the raw trace table.
///
/// Field order matters: the derived `Ord` compares the timestamp first and
/// the span id second, matching tuple comparison in the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CursorPosition {
    /// Nanoseconds since the Unix epoch.
    pub timestamp_ns: i64,
    pub span_id: String,
}

impl CursorPosition {
    pub fn new(timestamp_ns: i64, span_id: impl Into<String>) -> Self {
        Self {
            timestamp_ns,
            span_id: span_id.into(),
        }
    }

    /// The epoch with an empty span id; every real row sorts after it.
    pub fn origin() -> Self {
        Self::new(0, "")
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.timestamp_ns)
    }
}

impl std::fmt::Display for CursorPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short = self.span_id.get(..8).unwrap_or(&self.span_id);
        write!(f, "{}/{}", self.timestamp().to_rfc3339(), short)
    }
}

/// Enrichment progress pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub key: String,
    pub position: CursorPosition,
    pub updated_at: DateTime<Utc>,
}

impl Cursor {
    /// A cursor that has not processed anything yet.
    pub fn origin(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            position: CursorPosition::origin(),
            updated_at: Utc::now(),
        }
    }

    /// Returns the cursor moved to `to`.
    ///
    /// Fails with [`Error::CursorRegression`] if `to` sorts before the
    /// current position.
    pub fn advance(&self, to: CursorPosition) -> Result<Cursor> {
        if to < self.position {
            return Err(Error::CursorRegression {
                from: self.position.to_string(),
                to: to.to_string(),
            });
        }
        Ok(Cursor {
            key: self.key.clone(),
            position: to,
            updated_at: Utc::now(),
        })
    }
}

/// What to do with a key given its latest ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Process the key; `attempt` is the 1-based attempt number.
    Process { attempt: u32 },
    SkipDone,
    /// Failed too many times; left alone until an operator intervenes.
    SkipExhausted { attempts: u32 },
}

/// Retry cap for `failed` keys. `None` retries forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    pub fn capped(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
        }
    }

    pub fn decide<R: LedgerRecord>(&self, latest: Option<&R>) -> Decision {
        match latest {
            None => Decision::Process { attempt: 1 },
            Some(r) if r.status() == WorkStatus::Done => Decision::SkipDone,
            Some(r) => match self.max_attempts {
                Some(max) if r.attempts() >= max => Decision::SkipExhausted {
                    attempts: r.attempts(),
                },
                _ => Decision::Process {
                    attempt: r.attempts().saturating_add(1),
                },
            },
        }
    }
}

/// Per-signal file ledger.
#[async_trait]
pub trait FileLedger: Send + Sync {
    /// Latest record for one file, if any.
    async fn latest_file(&self, signal: Signal, filename: &str) -> Result<Option<FileRecord>>;

    /// Latest record for every file of a signal, in one read.
    async fn latest_files(&self, signal: Signal) -> Result<HashMap<String, FileRecord>>;

    /// Append a record; visible to subsequent reads immediately.
    async fn record_file(&self, signal: Signal, record: &FileRecord) -> Result<()>;

    async fn file_state(&self, signal: Signal, filename: &str) -> Result<LedgerState> {
        let latest = self.latest_file(signal, filename).await?;
        Ok(LedgerState::from(latest.map(|r| r.status)))
    }
}

/// Partition backup ledger.
#[async_trait]
pub trait PartitionLedger: Send + Sync {
    /// Latest record for every partition of a table.
    async fn latest_partitions(&self, table: &str) -> Result<HashMap<String, PartitionRecord>>;

    async fn record_partition(&self, record: &PartitionRecord) -> Result<()>;

    async fn partition_state(&self, table: &str, partition_id: &str) -> Result<LedgerState> {
        let latest = self.latest_partitions(table).await?;
        Ok(LedgerState::from(latest.get(partition_id).map(|r| r.status)))
    }

    /// Partitions whose latest record is `done`, in order.
    async fn done_partitions(&self, table: &str) -> Result<BTreeSet<String>> {
        let latest = self.latest_partitions(table).await?;
        Ok(latest
            .into_values()
            .filter(|r| r.status == WorkStatus::Done)
            .map(|r| r.partition_id)
            .collect())
    }
}

/// Persistence for enrichment cursors.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load_cursor(&self, key: &str) -> Result<Option<Cursor>>;

    async fn store_cursor(&self, cursor: &Cursor) -> Result<()>;
}
