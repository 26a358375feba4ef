//! Application state shared across handlers.

use async_trait::async_trait;
use clickhouse_client::{
    file_ledger_summary, partition_ledger_summary, ClickHouseClient, ClickHouseLedger,
    FileLedgerSummary, PartitionLedgerSummary,
};
use ingest_core::{Cursor, CursorStore, Result, Signal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Latest-state aggregates over every ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerStatus {
    /// File ledger summary per signal name.
    pub files: BTreeMap<String, FileLedgerSummary>,
    pub partitions: Vec<PartitionLedgerSummary>,
    /// `None` until the enricher has committed a batch.
    pub cursor: Option<Cursor>,
}

/// Where `/status` reads ledger aggregates from.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn ledger_status(&self) -> Result<LedgerStatus>;
}

/// Aggregates read straight from the ClickHouse ledger tables.
pub struct ClickHouseStatus {
    client: ClickHouseClient,
    ledger: ClickHouseLedger,
    cursor_key: String,
}

impl ClickHouseStatus {
    pub fn new(client: ClickHouseClient, cursor_key: impl Into<String>) -> Self {
        Self {
            ledger: ClickHouseLedger::new(client.clone()),
            client,
            cursor_key: cursor_key.into(),
        }
    }
}

#[async_trait]
impl StatusSource for ClickHouseStatus {
    async fn ledger_status(&self) -> Result<LedgerStatus> {
        let mut files = BTreeMap::new();
        for signal in Signal::ALL {
            let summary = file_ledger_summary(&self.client, signal).await?;
            files.insert(signal.as_str().to_string(), summary);
        }

        Ok(LedgerStatus {
            files,
            partitions: partition_ledger_summary(&self.client).await?,
            cursor: self.ledger.load_cursor(&self.cursor_key).await?,
        })
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Ledger aggregates (ClickHouse in production, fixed values in tests)
    pub status: Arc<dyn StatusSource>,
}

impl AppState {
    pub fn new(status: Arc<dyn StatusSource>) -> Self {
        Self { status }
    }
}
