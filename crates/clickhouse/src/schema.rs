//! ClickHouse table schemas.
//!
//! Table names are unqualified and resolve to the client's database.
//!
//! Raw tables follow the OpenTelemetry ClickHouse exporter layout:
//! - PARTITION BY toDate(Timestamp), one partition per day
//! - ORDER BY service, name, time
//! - DateTime64(9) timestamps, Map(LowCardinality(String), String) attributes
//!
//! Ledger tables are ReplacingMergeTree so background merges collapse old
//! records, but readers never depend on that: every read picks the newest
//! record per key with `argMax`.

use ingest_core::{ident, Result};

/// SQL for creating the database.
pub fn create_database(database: &str) -> Result<String> {
    let database = ident::sql_identifier(database)?;
    Ok(format!("CREATE DATABASE IF NOT EXISTS {}", database))
}

/// Raw spans.
pub const CREATE_TRACES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS otel_traces (
    Timestamp DateTime64(9),
    TraceId String,
    SpanId String,
    ParentSpanId String,
    TraceState String,
    SpanName LowCardinality(String),
    SpanKind LowCardinality(String),
    ServiceName LowCardinality(String),
    ResourceAttributes Map(LowCardinality(String), String),
    ScopeName String,
    ScopeVersion String,
    SpanAttributes Map(LowCardinality(String), String),
    Duration UInt64,
    StatusCode LowCardinality(String),
    StatusMessage String,
    Events Nested (
        Timestamp DateTime64(9),
        Name LowCardinality(String),
        Attributes Map(LowCardinality(String), String)
    ),
    Links Nested (
        TraceId String,
        SpanId String,
        TraceState String,
        Attributes Map(LowCardinality(String), String)
    )
)
ENGINE = MergeTree()
PARTITION BY toDate(Timestamp)
ORDER BY (ServiceName, SpanName, toDateTime(Timestamp))
SETTINGS index_granularity = 8192
"#;

/// Raw log records.
pub const CREATE_LOGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS otel_logs (
    Timestamp DateTime64(9),
    TraceId String,
    SpanId String,
    SeverityNumber UInt8,
    SeverityText LowCardinality(String),
    Body String,
    ServiceName LowCardinality(String),
    ResourceAttributes Map(LowCardinality(String), String),
    LogAttributes Map(LowCardinality(String), String)
)
ENGINE = MergeTree()
PARTITION BY toDate(Timestamp)
ORDER BY (ServiceName, SeverityText, toDateTime(Timestamp))
SETTINGS index_granularity = 8192
"#;

/// Raw metric data points, one row per point.
pub const CREATE_METRICS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS otel_metrics (
    Timestamp DateTime64(9),
    MetricName LowCardinality(String),
    MetricDescription String,
    MetricUnit LowCardinality(String),
    MetricType LowCardinality(String),
    Value Float64,
    ServiceName LowCardinality(String),
    ResourceAttributes Map(LowCardinality(String), String),
    MetricAttributes Map(LowCardinality(String), String)
)
ENGINE = MergeTree()
PARTITION BY toDate(Timestamp)
ORDER BY (ServiceName, MetricName, toDateTime(Timestamp))
SETTINGS index_granularity = 8192
"#;

/// Spans with embeddings. Re-enriching a span replaces its row on merge.
pub const CREATE_ENRICHED_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS otel_traces_enriched (
    Timestamp DateTime64(9),
    TraceId String,
    SpanId String,
    ParentSpanId String,
    SpanName LowCardinality(String),
    SpanKind LowCardinality(String),
    ServiceName LowCardinality(String),
    Duration UInt64,
    StatusCode LowCardinality(String),
    StatusMessage String,
    ResourceAttributesFlat Map(LowCardinality(String), String),
    SpanAttributesFlat Map(LowCardinality(String), String),
    EmbeddingText String,
    Embedding Array(Float32),
    EnrichedAt DateTime64(9)
)
ENGINE = ReplacingMergeTree(EnrichedAt)
PARTITION BY toDate(Timestamp)
ORDER BY (TraceId, SpanId)
"#;

/// File ledger DDL; the three signals use identical layouts.
fn create_file_ledger(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {} (
    Filename String,
    Status LowCardinality(String),
    ProcessedAt DateTime64(9),
    RowCount UInt64,
    ErrorMessage String,
    Attempts UInt32
)
ENGINE = ReplacingMergeTree(ProcessedAt)
ORDER BY Filename
"#,
        table
    )
}

/// Partition backup ledger.
pub const CREATE_PARTITION_LEDGER: &str = r#"
CREATE TABLE IF NOT EXISTS backup_partition_watermark (
    TableName LowCardinality(String),
    PartitionId String,
    Status LowCardinality(String),
    ProcessedAt DateTime64(9),
    Attempts UInt32
)
ENGINE = ReplacingMergeTree(ProcessedAt)
ORDER BY (TableName, PartitionId)
"#;

/// Enrichment cursor.
pub const CREATE_CURSOR_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS enricher_watermark (
    WatermarkKey String,
    LastTimestamp DateTime64(9),
    LastSpanId String,
    UpdatedAt DateTime64(9)
)
ENGINE = ReplacingMergeTree(UpdatedAt)
ORDER BY WatermarkKey
"#;

/// Every table DDL, in creation order.
pub fn all_tables() -> Vec<String> {
    let mut ddl = vec![
        CREATE_TRACES_TABLE.to_string(),
        CREATE_LOGS_TABLE.to_string(),
        CREATE_METRICS_TABLE.to_string(),
        CREATE_ENRICHED_TABLE.to_string(),
    ];
    ddl.extend(
        ingest_core::Signal::ALL
            .iter()
            .map(|s| create_file_ledger(s.ledger_table())),
    );
    ddl.push(CREATE_PARTITION_LEDGER.to_string());
    ddl.push(CREATE_CURSOR_TABLE.to_string());
    ddl
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_tables_cover_ledgers() {
        let ddl = all_tables().join("\n");
        for table in [
            "otel_traces ",
            "otel_logs ",
            "otel_metrics ",
            "otel_traces_enriched ",
            "loader_file_watermark ",
            "log_loader_file_watermark ",
            "metric_loader_file_watermark ",
            "backup_partition_watermark ",
            "enricher_watermark ",
        ] {
            assert!(ddl.contains(&format!("IF NOT EXISTS {}", table)), "{}", table);
        }
    }

    #[test]
    fn test_create_database_validates_name() {
        assert_eq!(
            create_database("otel").unwrap(),
            "CREATE DATABASE IF NOT EXISTS otel"
        );
        assert!(create_database("otel`").is_err());
    }
}
