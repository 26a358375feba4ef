//! Common test setup functions.

use api::{router, AppState, ClickHouseStatus, StatusSource};
use axum::Router;
use clickhouse_client::{
    count_rows, health::init_schema, ClickHouseClient, ClickHouseConfig, ClickHouseLedger,
};
use ingest_core::{BackupConfig, EnricherConfig, LoaderConfig, Signal, DEFAULT_CURSOR_KEY};
use object_storage::Bucket;
use std::sync::Arc;
use worker::{BackupCoordinator, ClickHouseStore, EnrichmentTracker, FileLoader};

use crate::containers::TestContainers;
use crate::mocks::{MockEmbedder, RecordingExporter};

/// Vector length the mock embedder produces.
pub const TEST_DIMENSIONS: usize = 8;

/// Test context with a real ClickHouse and in-memory buckets.
///
/// Each context gets its own database, so tests sharing one server do not
/// see each other's ledgers.
pub struct TestContext {
    pub containers: TestContainers,
    pub clickhouse: ClickHouseClient,
    pub ledger: Arc<ClickHouseLedger>,
    pub store: Arc<ClickHouseStore>,
    pub raw: Bucket,
    pub backups: Bucket,
    pub embedder: Arc<MockEmbedder>,
    pub router: Router,
}

impl TestContext {
    /// Create a new test context with all components initialized.
    pub async fn new() -> Self {
        let containers = TestContainers::start().await;

        let database = format!("otel_test_{}", uuid::Uuid::new_v4().simple());
        let ch_config = ClickHouseConfig {
            url: Some(containers.clickhouse_url.clone()),
            database: Some(database),
            username: containers.clickhouse_username.clone(),
            password: containers.clickhouse_password.clone(),
            timeout_secs: 30,
        };
        let clickhouse =
            ClickHouseClient::new(ch_config).expect("Failed to create ClickHouse client");

        init_schema(&clickhouse)
            .await
            .expect("Failed to initialize schema");

        let status = Arc::new(ClickHouseStatus::new(clickhouse.clone(), DEFAULT_CURSOR_KEY));
        let router = router(AppState::new(status as Arc<dyn StatusSource>));

        Self {
            ledger: Arc::new(ClickHouseLedger::new(clickhouse.clone())),
            store: Arc::new(ClickHouseStore::new(clickhouse.clone())),
            raw: Bucket::in_memory("otel-raw"),
            backups: Bucket::in_memory("otel-backups"),
            embedder: Arc::new(MockEmbedder::new(TEST_DIMENSIONS)),
            containers,
            clickhouse,
            router,
        }
    }

    /// Loader for `signal` reading `<signal>/` of the raw bucket.
    pub fn loader(&self, signal: Signal, max_attempts: Option<u32>) -> FileLoader {
        let config = LoaderConfig {
            prefix: Some(format!("{}/", signal.as_str())),
            busy_interval_secs: Some(0),
            idle_interval_secs: Some(1),
            insert_batch_size: 2,
            max_file_workers: 2,
            max_attempts,
        };
        FileLoader::new(
            signal,
            &config,
            self.raw.clone(),
            self.ledger.clone(),
            self.store.clone(),
        )
        .expect("Failed to create loader")
    }

    pub fn tracker(&self, batch_size: usize) -> EnrichmentTracker {
        let config = EnricherConfig {
            batch_size,
            busy_interval_secs: Some(0),
            idle_interval_secs: Some(1),
            ..Default::default()
        };
        EnrichmentTracker::new(
            &config,
            self.ledger.clone(),
            self.store.clone(),
            self.store.clone(),
            self.embedder.clone(),
        )
    }

    /// Coordinator over the trace table with exports captured in memory.
    pub fn coordinator(&self) -> (BackupCoordinator, Arc<RecordingExporter>) {
        let exporter = Arc::new(RecordingExporter::new(self.store.as_ref().clone()));
        let config = BackupConfig {
            tables: vec![Signal::Traces.raw_table().to_string()],
            interval_secs: Some(60),
            export_url: Some("http://minio:9000/otel-backups".to_string()),
            ..Default::default()
        };
        let coordinator = BackupCoordinator::new(
            &config,
            self.ledger.clone(),
            exporter.clone(),
            self.backups.clone(),
        )
        .expect("Failed to create coordinator");
        (coordinator, exporter)
    }

    /// Put a raw file under the given key.
    pub async fn put_raw(&self, key: &str, body: impl Into<String>) {
        self.raw
            .put(key, body.into())
            .await
            .expect("Failed to put raw file");
    }

    pub async fn count(&self, table: &str) -> u64 {
        count_rows(&self.clickhouse, table)
            .await
            .expect("Failed to count rows")
    }
}
