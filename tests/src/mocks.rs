//! Mock implementations for testing.

use async_trait::async_trait;
use clickhouse_client::ActivePartition;
use ingest_core::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use worker::{ClickHouseStore, Embedder, PartitionExporter};

/// Embedder returning deterministic vectors without any network.
///
/// Implements the same `Embedder` trait as `HttpEmbedder`, so the tracker
/// runs its real code path against a live ClickHouse.
#[derive(Clone)]
pub struct MockEmbedder {
    dimensions: usize,
    /// Every text passed to `embed`, in call order.
    texts: Arc<Mutex<Vec<String>>>,
    should_fail: Arc<Mutex<bool>>,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            texts: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    pub fn embedded_texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.texts.lock().len()
    }

    /// Set failure mode for testing error handling.
    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if *self.should_fail.lock() {
            return Err(Error::embedding("mock embedder failure"));
        }

        self.texts.lock().extend(texts.iter().cloned());
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0; self.dimensions];
                if let Some(first) = v.first_mut() {
                    *first = t.len() as f32;
                }
                v
            })
            .collect())
    }
}

/// Exporter that lists partitions from the real store but records exports
/// in memory instead of writing to S3.
pub struct RecordingExporter {
    store: ClickHouseStore,
    exports: Mutex<Vec<(String, String)>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingExporter {
    pub fn new(store: ClickHouseStore) -> Self {
        Self {
            store,
            exports: Mutex::new(Vec::new()),
            failing: Mutex::new(Vec::new()),
        }
    }

    /// `(table, partition)` pairs exported so far.
    pub fn exports(&self) -> Vec<(String, String)> {
        self.exports.lock().clone()
    }

    /// Make exports of this partition value fail until cleared.
    pub fn fail_partition(&self, partition: &str) {
        self.failing.lock().push(partition.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }
}

#[async_trait]
impl PartitionExporter for RecordingExporter {
    async fn active_partitions(&self, table: &str) -> Result<Vec<ActivePartition>> {
        self.store.active_partitions(table).await
    }

    async fn export(&self, table: &str, partition: &ActivePartition) -> Result<()> {
        if self.failing.lock().contains(&partition.partition) {
            return Err(Error::internal("mock export failure"));
        }
        self.exports
            .lock()
            .push((table.to_string(), partition.partition.clone()));
        Ok(())
    }

    async fn service_names(&self) -> Result<Vec<String>> {
        self.store.service_names().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedder_shapes_vectors() {
        let mock = MockEmbedder::new(4);
        let texts = vec!["abc".to_string(), "de".to_string()];

        let vectors = mock.embed(&texts).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.len() == 4));
        assert_eq!(vectors[0][0], 3.0);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_embedder_failure_mode() {
        let mock = MockEmbedder::new(4);
        mock.set_should_fail(true);

        let result = mock.embed(&["x".to_string()]).await;
        assert!(result.is_err());
        assert_eq!(mock.call_count(), 0);
    }
}
