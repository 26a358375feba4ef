//! ClickHouse-backed watermark ledger.
//!
//! Writes are plain INSERTs. Reads resolve every key to its newest record with
//! `argMax(.., ProcessedAt)`, so results are correct whether or not the
//! ReplacingMergeTree has merged duplicates yet.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use clickhouse::Row;
use ingest_core::{
    Cursor, CursorPosition, CursorStore, Error, FileLedger, FileRecord, PartitionLedger,
    PartitionRecord, Result, Signal, WorkStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::client::{insert_error, query_error, ClickHouseClient};

const PARTITION_LEDGER_TABLE: &str = "backup_partition_watermark";
const CURSOR_TABLE: &str = "enricher_watermark";

fn to_nanos(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

fn from_nanos(ns: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(ns)
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
struct FileLedgerRow {
    #[serde(rename = "Filename")]
    filename: String,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "ProcessedAt")]
    processed_at: i64,
    #[serde(rename = "RowCount")]
    row_count: u64,
    #[serde(rename = "ErrorMessage")]
    error_message: String,
    #[serde(rename = "Attempts")]
    attempts: u32,
}

impl From<&FileRecord> for FileLedgerRow {
    fn from(record: &FileRecord) -> Self {
        Self {
            filename: record.filename.clone(),
            status: record.status.as_str().to_string(),
            processed_at: to_nanos(record.processed_at),
            row_count: record.row_count,
            error_message: record.error_message.clone(),
            attempts: record.attempts,
        }
    }
}

impl TryFrom<FileLedgerRow> for FileRecord {
    type Error = Error;

    fn try_from(row: FileLedgerRow) -> Result<Self> {
        Ok(Self {
            filename: row.filename,
            status: WorkStatus::from_str(&row.status)?,
            processed_at: from_nanos(row.processed_at),
            row_count: row.row_count,
            error_message: row.error_message,
            attempts: row.attempts,
        })
    }
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
struct PartitionLedgerRow {
    #[serde(rename = "TableName")]
    table_name: String,
    #[serde(rename = "PartitionId")]
    partition_id: String,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "ProcessedAt")]
    processed_at: i64,
    #[serde(rename = "Attempts")]
    attempts: u32,
}

impl TryFrom<PartitionLedgerRow> for PartitionRecord {
    type Error = Error;

    fn try_from(row: PartitionLedgerRow) -> Result<Self> {
        Ok(Self {
            table_name: row.table_name,
            partition_id: row.partition_id,
            status: WorkStatus::from_str(&row.status)?,
            processed_at: from_nanos(row.processed_at),
            attempts: row.attempts,
        })
    }
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
struct CursorRow {
    #[serde(rename = "WatermarkKey")]
    key: String,
    #[serde(rename = "LastTimestamp")]
    last_timestamp: i64,
    #[serde(rename = "LastSpanId")]
    last_span_id: String,
    #[serde(rename = "UpdatedAt")]
    updated_at: i64,
}

/// Watermark ledger stored in ClickHouse tables.
#[derive(Clone)]
pub struct ClickHouseLedger {
    client: ClickHouseClient,
}

impl ClickHouseLedger {
    pub fn new(client: ClickHouseClient) -> Self {
        Self { client }
    }

    async fn insert_one<T: Row + Serialize>(&self, table: &str, row: &T) -> Result<()> {
        let mut insert = self
            .client
            .inner()
            .insert::<T>(table)
            .map_err(insert_error)?;
        insert.write(row).await.map_err(insert_error)?;
        insert.end().await.map_err(insert_error)
    }
}

fn latest_files_sql(signal: Signal, single: bool) -> String {
    format!(
        r#"
        SELECT
            Filename,
            argMax(Status, ProcessedAt),
            max(ProcessedAt),
            argMax(RowCount, ProcessedAt),
            argMax(ErrorMessage, ProcessedAt),
            argMax(Attempts, ProcessedAt)
        FROM {}
        {}
        GROUP BY Filename
        "#,
        signal.ledger_table(),
        if single { "WHERE Filename = ?" } else { "" }
    )
}

#[async_trait]
impl FileLedger for ClickHouseLedger {
    async fn latest_file(&self, signal: Signal, filename: &str) -> Result<Option<FileRecord>> {
        let rows = self
            .client
            .inner()
            .query(&latest_files_sql(signal, true))
            .bind(filename)
            .fetch_all::<FileLedgerRow>()
            .await
            .map_err(query_error)?;

        rows.into_iter().next().map(FileRecord::try_from).transpose()
    }

    async fn latest_files(&self, signal: Signal) -> Result<HashMap<String, FileRecord>> {
        let rows = self
            .client
            .inner()
            .query(&latest_files_sql(signal, false))
            .fetch_all::<FileLedgerRow>()
            .await
            .map_err(query_error)?;

        rows.into_iter()
            .map(|row| FileRecord::try_from(row).map(|r| (r.filename.clone(), r)))
            .collect()
    }

    async fn record_file(&self, signal: Signal, record: &FileRecord) -> Result<()> {
        self.insert_one(signal.ledger_table(), &FileLedgerRow::from(record))
            .await
    }
}

const LATEST_PARTITIONS_SQL: &str = r#"
    SELECT
        TableName,
        PartitionId,
        argMax(Status, ProcessedAt),
        max(ProcessedAt),
        argMax(Attempts, ProcessedAt)
    FROM backup_partition_watermark
    WHERE TableName = ?
    GROUP BY TableName, PartitionId
"#;

#[async_trait]
impl PartitionLedger for ClickHouseLedger {
    async fn latest_partitions(&self, table: &str) -> Result<HashMap<String, PartitionRecord>> {
        let rows = self
            .client
            .inner()
            .query(LATEST_PARTITIONS_SQL)
            .bind(table)
            .fetch_all::<PartitionLedgerRow>()
            .await
            .map_err(query_error)?;

        rows.into_iter()
            .map(|row| PartitionRecord::try_from(row).map(|r| (r.partition_id.clone(), r)))
            .collect()
    }

    async fn record_partition(&self, record: &PartitionRecord) -> Result<()> {
        let row = PartitionLedgerRow {
            table_name: record.table_name.clone(),
            partition_id: record.partition_id.clone(),
            status: record.status.as_str().to_string(),
            processed_at: to_nanos(record.processed_at),
            attempts: record.attempts,
        };
        self.insert_one(PARTITION_LEDGER_TABLE, &row).await
    }
}

const LOAD_CURSOR_SQL: &str = r#"
    SELECT
        WatermarkKey,
        argMax(LastTimestamp, UpdatedAt),
        argMax(LastSpanId, UpdatedAt),
        max(UpdatedAt)
    FROM enricher_watermark
    WHERE WatermarkKey = ?
    GROUP BY WatermarkKey
"#;

#[async_trait]
impl CursorStore for ClickHouseLedger {
    async fn load_cursor(&self, key: &str) -> Result<Option<Cursor>> {
        let rows = self
            .client
            .inner()
            .query(LOAD_CURSOR_SQL)
            .bind(key)
            .fetch_all::<CursorRow>()
            .await
            .map_err(query_error)?;

        Ok(rows.into_iter().next().map(|row| Cursor {
            key: row.key,
            position: CursorPosition::new(row.last_timestamp, row.last_span_id),
            updated_at: from_nanos(row.updated_at),
        }))
    }

    async fn store_cursor(&self, cursor: &Cursor) -> Result<()> {
        let row = CursorRow {
            key: cursor.key.clone(),
            last_timestamp: cursor.position.timestamp_ns,
            last_span_id: cursor.position.span_id.clone(),
            updated_at: to_nanos(cursor.updated_at),
        };
        self.insert_one(CURSOR_TABLE, &row).await
    }
}
