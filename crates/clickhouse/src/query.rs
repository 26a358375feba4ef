//! Read queries: enrichment candidates and status aggregates.

use crate::client::{query_error, ClickHouseClient};
use crate::insert::MapColumn;
use clickhouse::Row;
use ingest_core::{ident, CursorPosition, Result, Signal};
use serde::{Deserialize, Serialize};

/// Raw span columns the enrichment tracker reads.
#[derive(Debug, Clone, PartialEq, Row, Serialize, Deserialize)]
pub struct StoredSpan {
    pub timestamp: i64,
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: String,
    pub span_name: String,
    pub span_kind: String,
    pub service_name: String,
    pub duration: u64,
    pub status_code: String,
    pub status_message: String,
    pub resource_attributes: MapColumn,
    pub span_attributes: MapColumn,
}

impl StoredSpan {
    /// Position of this row in `(Timestamp, SpanId)` order.
    pub fn position(&self) -> CursorPosition {
        CursorPosition::new(self.timestamp, self.span_id.clone())
    }
}

const FETCH_AFTER_SQL: &str = r#"
    SELECT
        Timestamp, TraceId, SpanId, ParentSpanId,
        SpanName, SpanKind, ServiceName,
        Duration, StatusCode, StatusMessage,
        ResourceAttributes, SpanAttributes
    FROM otel_traces
    WHERE (Timestamp, SpanId) > (fromUnixTimestamp64Nano(toInt64(?)), ?)
    ORDER BY Timestamp, SpanId
    LIMIT ?
"#;

/// Spans strictly after `after` in `(Timestamp, SpanId)` order, ascending.
pub async fn fetch_spans_after(
    client: &ClickHouseClient,
    after: &CursorPosition,
    limit: usize,
) -> Result<Vec<StoredSpan>> {
    client
        .inner()
        .query(FETCH_AFTER_SQL)
        .bind(after.timestamp_ns)
        .bind(after.span_id.as_str())
        .bind(limit as u64)
        .fetch_all::<StoredSpan>()
        .await
        .map_err(query_error)
}

/// Count rows in a table.
pub async fn count_rows(client: &ClickHouseClient, table: &str) -> Result<u64> {
    let table = ident::sql_identifier(table)?;
    client
        .inner()
        .query(&format!("SELECT count() FROM {}", table))
        .fetch_one::<u64>()
        .await
        .map_err(query_error)
}

/// Latest-state counts of one file ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct FileLedgerSummary {
    pub done: u64,
    pub failed: u64,
    /// Rows loaded by files currently marked done.
    pub rows_loaded: u64,
}

/// Summarize a signal's file ledger, counting each file once by its latest record.
pub async fn file_ledger_summary(
    client: &ClickHouseClient,
    signal: Signal,
) -> Result<FileLedgerSummary> {
    let sql = format!(
        r#"
        SELECT
            countIf(status = 'done'),
            countIf(status = 'failed'),
            sumIf(row_count, status = 'done')
        FROM (
            SELECT
                Filename,
                argMax(Status, ProcessedAt) AS status,
                argMax(RowCount, ProcessedAt) AS row_count
            FROM {}
            GROUP BY Filename
        )
        "#,
        signal.ledger_table()
    );

    client
        .inner()
        .query(&sql)
        .fetch_one::<FileLedgerSummary>()
        .await
        .map_err(query_error)
}

/// Latest-state counts of the partition ledger for one table.
#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct PartitionLedgerSummary {
    pub table_name: String,
    pub done: u64,
    pub failed: u64,
}

const PARTITION_SUMMARY_SQL: &str = r#"
    SELECT
        TableName,
        countIf(status = 'done'),
        countIf(status = 'failed')
    FROM (
        SELECT
            TableName,
            PartitionId,
            argMax(Status, ProcessedAt) AS status
        FROM backup_partition_watermark
        GROUP BY TableName, PartitionId
    )
    GROUP BY TableName
    ORDER BY TableName
"#;

pub async fn partition_ledger_summary(
    client: &ClickHouseClient,
) -> Result<Vec<PartitionLedgerSummary>> {
    client
        .inner()
        .query(PARTITION_SUMMARY_SQL)
        .fetch_all::<PartitionLedgerSummary>()
        .await
        .map_err(query_error)
}
