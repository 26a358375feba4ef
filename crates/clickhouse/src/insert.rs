//! Batch insert helpers for ClickHouse.

use crate::client::{insert_error, ClickHouseClient};
use crate::query::StoredSpan;
use clickhouse::Row;
use ingest_core::otlp::Attributes;
use ingest_core::{LogRecord, MetricPoint, Result, SignalBatch, Span};
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tracing::debug;

/// Attribute maps travel as key/value pairs in RowBinary.
pub type MapColumn = Vec<(String, String)>;

fn map_column(attrs: Attributes) -> MapColumn {
    attrs.into_iter().collect()
}

/// Row for `otel_traces`.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct SpanRow {
    #[serde(rename = "Timestamp")]
    pub timestamp: i64, // DateTime64(9) as nanoseconds
    #[serde(rename = "TraceId")]
    pub trace_id: String,
    #[serde(rename = "SpanId")]
    pub span_id: String,
    #[serde(rename = "ParentSpanId")]
    pub parent_span_id: String,
    #[serde(rename = "TraceState")]
    pub trace_state: String,
    #[serde(rename = "SpanName")]
    pub span_name: String,
    #[serde(rename = "SpanKind")]
    pub span_kind: String,
    #[serde(rename = "ServiceName")]
    pub service_name: String,
    #[serde(rename = "ResourceAttributes")]
    pub resource_attributes: MapColumn,
    #[serde(rename = "ScopeName")]
    pub scope_name: String,
    #[serde(rename = "ScopeVersion")]
    pub scope_version: String,
    #[serde(rename = "SpanAttributes")]
    pub span_attributes: MapColumn,
    #[serde(rename = "Duration")]
    pub duration: u64,
    #[serde(rename = "StatusCode")]
    pub status_code: String,
    #[serde(rename = "StatusMessage")]
    pub status_message: String,
    #[serde(rename = "Events.Timestamp")]
    pub events_timestamp: Vec<i64>,
    #[serde(rename = "Events.Name")]
    pub events_name: Vec<String>,
    #[serde(rename = "Events.Attributes")]
    pub events_attributes: Vec<MapColumn>,
    #[serde(rename = "Links.TraceId")]
    pub links_trace_id: Vec<String>,
    #[serde(rename = "Links.SpanId")]
    pub links_span_id: Vec<String>,
    #[serde(rename = "Links.TraceState")]
    pub links_trace_state: Vec<String>,
    #[serde(rename = "Links.Attributes")]
    pub links_attributes: Vec<MapColumn>,
}

impl From<Span> for SpanRow {
    fn from(span: Span) -> Self {
        let mut row = SpanRow {
            timestamp: span.timestamp_ns,
            trace_id: span.trace_id,
            span_id: span.span_id,
            parent_span_id: span.parent_span_id,
            trace_state: span.trace_state,
            span_name: span.span_name,
            span_kind: span.span_kind,
            service_name: span.service_name,
            resource_attributes: map_column(span.resource_attributes),
            scope_name: span.scope_name,
            scope_version: span.scope_version,
            span_attributes: map_column(span.span_attributes),
            duration: span.duration_ns,
            status_code: span.status_code,
            status_message: span.status_message,
            events_timestamp: Vec::with_capacity(span.events.len()),
            events_name: Vec::with_capacity(span.events.len()),
            events_attributes: Vec::with_capacity(span.events.len()),
            links_trace_id: Vec::with_capacity(span.links.len()),
            links_span_id: Vec::with_capacity(span.links.len()),
            links_trace_state: Vec::with_capacity(span.links.len()),
            links_attributes: Vec::with_capacity(span.links.len()),
        };

        // Nested columns are parallel arrays
        for event in span.events {
            row.events_timestamp.push(event.timestamp_ns);
            row.events_name.push(event.name);
            row.events_attributes.push(map_column(event.attributes));
        }
        for link in span.links {
            row.links_trace_id.push(link.trace_id);
            row.links_span_id.push(link.span_id);
            row.links_trace_state.push(link.trace_state);
            row.links_attributes.push(map_column(link.attributes));
        }

        row
    }
}

/// Row for `otel_logs`.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct LogRow {
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
    #[serde(rename = "TraceId")]
    pub trace_id: String,
    #[serde(rename = "SpanId")]
    pub span_id: String,
    #[serde(rename = "SeverityNumber")]
    pub severity_number: u8,
    #[serde(rename = "SeverityText")]
    pub severity_text: String,
    #[serde(rename = "Body")]
    pub body: String,
    #[serde(rename = "ServiceName")]
    pub service_name: String,
    #[serde(rename = "ResourceAttributes")]
    pub resource_attributes: MapColumn,
    #[serde(rename = "LogAttributes")]
    pub log_attributes: MapColumn,
}

impl From<LogRecord> for LogRow {
    fn from(record: LogRecord) -> Self {
        Self {
            timestamp: record.timestamp_ns,
            trace_id: record.trace_id,
            span_id: record.span_id,
            severity_number: record.severity_number,
            severity_text: record.severity_text,
            body: record.body,
            service_name: record.service_name,
            resource_attributes: map_column(record.resource_attributes),
            log_attributes: map_column(record.log_attributes),
        }
    }
}

/// Row for `otel_metrics`.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct MetricRow {
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
    #[serde(rename = "MetricName")]
    pub metric_name: String,
    #[serde(rename = "MetricDescription")]
    pub metric_description: String,
    #[serde(rename = "MetricUnit")]
    pub metric_unit: String,
    #[serde(rename = "MetricType")]
    pub metric_type: String,
    #[serde(rename = "Value")]
    pub value: f64,
    #[serde(rename = "ServiceName")]
    pub service_name: String,
    #[serde(rename = "ResourceAttributes")]
    pub resource_attributes: MapColumn,
    #[serde(rename = "MetricAttributes")]
    pub metric_attributes: MapColumn,
}

impl From<MetricPoint> for MetricRow {
    fn from(point: MetricPoint) -> Self {
        Self {
            timestamp: point.timestamp_ns,
            metric_name: point.metric_name,
            metric_description: point.metric_description,
            metric_unit: point.metric_unit,
            metric_type: point.metric_type,
            value: point.value,
            service_name: point.service_name,
            resource_attributes: map_column(point.resource_attributes),
            metric_attributes: map_column(point.metric_attributes),
        }
    }
}

/// Row for `otel_traces_enriched`.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct EnrichedSpanRow {
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
    #[serde(rename = "TraceId")]
    pub trace_id: String,
    #[serde(rename = "SpanId")]
    pub span_id: String,
    #[serde(rename = "ParentSpanId")]
    pub parent_span_id: String,
    #[serde(rename = "SpanName")]
    pub span_name: String,
    #[serde(rename = "SpanKind")]
    pub span_kind: String,
    #[serde(rename = "ServiceName")]
    pub service_name: String,
    #[serde(rename = "Duration")]
    pub duration: u64,
    #[serde(rename = "StatusCode")]
    pub status_code: String,
    #[serde(rename = "StatusMessage")]
    pub status_message: String,
    #[serde(rename = "ResourceAttributesFlat")]
    pub resource_attributes: MapColumn,
    #[serde(rename = "SpanAttributesFlat")]
    pub span_attributes: MapColumn,
    #[serde(rename = "EmbeddingText")]
    pub embedding_text: String,
    #[serde(rename = "Embedding")]
    pub embedding: Vec<f32>,
    #[serde(rename = "EnrichedAt")]
    pub enriched_at: i64,
}

impl EnrichedSpanRow {
    pub fn new(span: StoredSpan, embedding_text: String, embedding: Vec<f32>) -> Self {
        Self {
            timestamp: span.timestamp,
            trace_id: span.trace_id,
            span_id: span.span_id,
            parent_span_id: span.parent_span_id,
            span_name: span.span_name,
            span_kind: span.span_kind,
            service_name: span.service_name,
            duration: span.duration,
            status_code: span.status_code,
            status_message: span.status_message,
            resource_attributes: span.resource_attributes,
            span_attributes: span.span_attributes,
            embedding_text,
            embedding,
            enriched_at: chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX),
        }
    }
}

/// Insert rows into `table` in chunks of at most `chunk_size` rows.
///
/// Each chunk is its own INSERT; a failure leaves earlier chunks committed.
pub async fn insert_rows<T>(
    client: &ClickHouseClient,
    table: &str,
    rows: &[T],
    chunk_size: usize,
) -> Result<usize>
where
    T: Row + Serialize,
{
    if rows.is_empty() {
        return Ok(0);
    }

    let start = std::time::Instant::now();

    for chunk in rows.chunks(chunk_size.max(1)) {
        let mut insert = client.inner().insert::<T>(table).map_err(|e| {
            metrics().clickhouse_insert_errors.inc();
            insert_error(e)
        })?;

        for row in chunk {
            insert.write(row).await.map_err(|e| {
                metrics().clickhouse_insert_errors.inc();
                insert_error(e)
            })?;
        }

        insert.end().await.map_err(|e| {
            metrics().clickhouse_insert_errors.inc();
            insert_error(e)
        })?;
        metrics().clickhouse_inserts.inc();
    }

    let elapsed = start.elapsed();
    metrics()
        .clickhouse_latency_ms
        .observe(elapsed.as_millis() as u64);

    debug!(
        table = table,
        count = rows.len(),
        latency_ms = %elapsed.as_millis(),
        "Inserted rows to ClickHouse"
    );

    Ok(rows.len())
}

/// Insert an unpacked file into its signal's raw table.
pub async fn insert_batch(
    client: &ClickHouseClient,
    batch: SignalBatch,
    chunk_size: usize,
) -> Result<usize> {
    let table = batch.signal().raw_table();
    match batch {
        SignalBatch::Traces(spans) => {
            let rows: Vec<SpanRow> = spans.into_iter().map(SpanRow::from).collect();
            insert_rows(client, table, &rows, chunk_size).await
        }
        SignalBatch::Logs(records) => {
            let rows: Vec<LogRow> = records.into_iter().map(LogRow::from).collect();
            insert_rows(client, table, &rows, chunk_size).await
        }
        SignalBatch::Metrics(points) => {
            let rows: Vec<MetricRow> = points.into_iter().map(MetricRow::from).collect();
            insert_rows(client, table, &rows, chunk_size).await
        }
    }
}

/// Write enriched spans.
pub async fn insert_enriched(client: &ClickHouseClient, rows: &[EnrichedSpanRow]) -> Result<usize> {
    insert_rows(client, "otel_traces_enriched", rows, rows.len()).await
}
