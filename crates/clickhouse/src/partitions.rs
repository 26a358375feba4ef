//! Partition discovery and export for backups.

use crate::client::{query_error, ClickHouseClient};
use clickhouse::Row;
use ingest_core::{ident, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Active partition of a MergeTree table, from `system.parts`.
#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct ActivePartition {
    /// Partition value, e.g. `2024-01-01`. Used as the ledger key.
    pub partition: String,
    /// Internal id, e.g. `20240101`. Matches the `_partition_id` virtual column.
    pub partition_id: String,
}

const ACTIVE_PARTITIONS_SQL: &str = r#"
    SELECT partition, partition_id
    FROM system.parts
    WHERE database = ? AND table = ? AND active = 1
    GROUP BY partition, partition_id
    ORDER BY partition
"#;

/// List active partitions of `table` in the client's database.
pub async fn active_partitions(
    client: &ClickHouseClient,
    table: &str,
) -> Result<Vec<ActivePartition>> {
    client
        .inner()
        .query(ACTIVE_PARTITIONS_SQL)
        .bind(client.database())
        .bind(table)
        .fetch_all::<ActivePartition>()
        .await
        .map_err(query_error)
}

/// S3 location ClickHouse writes exports to.
#[derive(Debug, Clone)]
pub struct ExportTarget {
    /// Bucket URL as reachable from the ClickHouse server.
    pub url: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl ExportTarget {
    /// Object URL of one exported partition.
    pub fn partition_url(&self, table: &str, partition: &str) -> String {
        format!(
            "{}/{}/{}/data.native",
            self.url.trim_end_matches('/'),
            table,
            partition
        )
    }
}

/// Export one partition to the backup location in Native format,
/// replacing any earlier export of the same partition.
pub async fn export_partition(
    client: &ClickHouseClient,
    table: &str,
    partition: &ActivePartition,
    target: &ExportTarget,
) -> Result<()> {
    let table = ident::sql_identifier(table)?;
    let value = ident::partition_id(&partition.partition)?;
    let id = ident::partition_id(&partition.partition_id)?;
    let url = target.partition_url(table, value);

    let query = match (&target.access_key_id, &target.secret_access_key) {
        (Some(key), Some(secret)) => client
            .inner()
            .query(&format!(
                "INSERT INTO FUNCTION s3(?, ?, ?, 'Native') \
                 SELECT * FROM {} WHERE _partition_id = ? \
                 SETTINGS s3_truncate_on_insert = 1",
                table
            ))
            .bind(url.as_str())
            .bind(key.as_str())
            .bind(secret.as_str())
            .bind(id),
        _ => client
            .inner()
            .query(&format!(
                "INSERT INTO FUNCTION s3(?, 'Native') \
                 SELECT * FROM {} WHERE _partition_id = ? \
                 SETTINGS s3_truncate_on_insert = 1",
                table
            ))
            .bind(url.as_str())
            .bind(id),
    };

    query.execute().await.map_err(query_error)?;
    debug!(table = table, partition = value, url = %url, "Exported partition");
    Ok(())
}

/// Distinct service names seen in the raw trace table.
pub async fn service_names(client: &ClickHouseClient) -> Result<Vec<String>> {
    client
        .inner()
        .query("SELECT DISTINCT ServiceName FROM otel_traces ORDER BY ServiceName")
        .fetch_all::<String>()
        .await
        .map_err(query_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_url() {
        let target = ExportTarget {
            url: "http://minio:9000/otel-backups/".to_string(),
            access_key_id: None,
            secret_access_key: None,
        };
        assert_eq!(
            target.partition_url("otel_traces", "2024-01-01"),
            "http://minio:9000/otel-backups/otel_traces/2024-01-01/data.native"
        );
    }
}
