//! Narrow interfaces the workers drive, with their ClickHouse implementations.
//!
//! Workers only see these traits, so cycles can be exercised against
//! in-memory fakes.

use async_trait::async_trait;
use clickhouse_client::insert::{insert_batch, insert_enriched, EnrichedSpanRow};
use clickhouse_client::partitions::{active_partitions, export_partition, service_names};
use clickhouse_client::{
    fetch_spans_after, ActivePartition, ClickHouseClient, ExportTarget, StoredSpan,
};
use ingest_core::{CursorPosition, Error, Result, SignalBatch};

/// Destination for unpacked raw telemetry.
#[async_trait]
pub trait RawSink: Send + Sync {
    /// Insert a batch into its signal's raw table; returns rows written.
    async fn insert_batch(&self, batch: SignalBatch, chunk_size: usize) -> Result<usize>;
}

/// Raw spans in `(Timestamp, SpanId)` order.
#[async_trait]
pub trait SpanSource: Send + Sync {
    /// Up to `limit` spans strictly after `after`, ascending.
    async fn spans_after(&self, after: &CursorPosition, limit: usize) -> Result<Vec<StoredSpan>>;
}

/// Upsert-style writer for enriched spans.
#[async_trait]
pub trait EnrichedSink: Send + Sync {
    async fn write_enriched(&self, rows: &[EnrichedSpanRow]) -> Result<usize>;
}

/// Partition metadata and export.
#[async_trait]
pub trait PartitionExporter: Send + Sync {
    async fn active_partitions(&self, table: &str) -> Result<Vec<ActivePartition>>;

    /// Copy one partition to the backup location, replacing earlier copies.
    async fn export(&self, table: &str, partition: &ActivePartition) -> Result<()>;

    /// Distinct service names known to the trace table.
    async fn service_names(&self) -> Result<Vec<String>>;
}

/// ClickHouse behind every worker interface.
#[derive(Clone)]
pub struct ClickHouseStore {
    client: ClickHouseClient,
    export: Option<ExportTarget>,
}

impl ClickHouseStore {
    pub fn new(client: ClickHouseClient) -> Self {
        Self {
            client,
            export: None,
        }
    }

    pub fn with_export_target(mut self, target: ExportTarget) -> Self {
        self.export = Some(target);
        self
    }
}

#[async_trait]
impl RawSink for ClickHouseStore {
    async fn insert_batch(&self, batch: SignalBatch, chunk_size: usize) -> Result<usize> {
        insert_batch(&self.client, batch, chunk_size).await
    }
}

#[async_trait]
impl SpanSource for ClickHouseStore {
    async fn spans_after(&self, after: &CursorPosition, limit: usize) -> Result<Vec<StoredSpan>> {
        fetch_spans_after(&self.client, after, limit).await
    }
}

#[async_trait]
impl EnrichedSink for ClickHouseStore {
    async fn write_enriched(&self, rows: &[EnrichedSpanRow]) -> Result<usize> {
        insert_enriched(&self.client, rows).await
    }
}

#[async_trait]
impl PartitionExporter for ClickHouseStore {
    async fn active_partitions(&self, table: &str) -> Result<Vec<ActivePartition>> {
        active_partitions(&self.client, table).await
    }

    async fn export(&self, table: &str, partition: &ActivePartition) -> Result<()> {
        let target = self
            .export
            .as_ref()
            .ok_or_else(|| Error::config("no backup export target configured"))?;
        export_partition(&self.client, table, partition, target).await
    }

    async fn service_names(&self) -> Result<Vec<String>> {
        service_names(&self.client).await
    }
}
