//! OTLP ingestion and watermark layer.
//!
//! Runs any combination of:
//! - file loaders (traces, logs, metrics) from object storage into ClickHouse
//! - the embedding enrichment tracker
//! - the partition backup coordinator
//!
//! plus a small read-only health/status HTTP endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use api::{router, AppState, ClickHouseStatus};
use clickhouse_client::{ClickHouseClient, ClickHouseConfig, ClickHouseLedger, ExportTarget};
use ingest_core::{
    validate_section, BackupConfig, EmbeddingConfig, EnricherConfig, LoadersConfig, Role, Schedule,
};
use object_storage::{open_backup_bucket, open_raw_bucket, ObjectStorageConfig};
use telemetry::{health, init_tracing_from_env};
use worker::{
    run_periodic, BackupCoordinator, ClickHouseStore, EnrichmentTracker, FileLoader,
    HttpEmbedder, PeriodicTask,
};

const ENV_PREFIX: &str = "OTEL_INGEST";

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    /// Loops this process runs.
    #[serde(default = "default_roles")]
    roles: Vec<Role>,

    #[serde(default)]
    clickhouse: ClickHouseConfig,

    #[serde(default)]
    storage: ObjectStorageConfig,

    #[serde(default)]
    loaders: LoadersConfig,

    #[serde(default)]
    enricher: EnricherConfig,

    #[serde(default)]
    backup: BackupConfig,

    #[serde(default)]
    embedding: EmbeddingConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_roles() -> Vec<Role> {
    Role::ALL.to_vec()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            roles: default_roles(),
            clickhouse: ClickHouseConfig::default(),
            storage: ObjectStorageConfig::default(),
            loaders: LoadersConfig::default(),
            enricher: EnricherConfig::default(),
            backup: BackupConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Config {
    fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    fn needs_storage(&self) -> bool {
        self.roles
            .iter()
            .any(|r| r.loader_signal().is_some() || *r == Role::Backup)
    }

    /// Validate the sections the selected roles depend on.
    fn validate(&self) -> ingest_core::Result<()> {
        if self.roles.is_empty() {
            return Err(ingest_core::Error::config("roles: at least one role is required"));
        }

        validate_section("clickhouse", &self.clickhouse)?;
        if self.needs_storage() {
            validate_section("storage", &self.storage)?;
        }

        for role in &self.roles {
            match role.loader_signal() {
                Some(signal) => validate_section(
                    &format!("loaders.{}", signal),
                    self.loaders.for_signal(signal),
                )?,
                None if *role == Role::Enricher => {
                    validate_section("enricher", &self.enricher)?;
                    validate_section("embedding", &self.embedding)?;
                }
                None => validate_section("backup", &self.backup)?,
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting otel-ingest v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    config.validate().context("Invalid configuration")?;

    let roles: Vec<&str> = config.roles.iter().map(Role::as_str).collect();
    info!(roles = ?roles, "Loaded configuration");

    let clickhouse = ClickHouseClient::new(config.clickhouse.clone())
        .context("Failed to create ClickHouse client")?;

    if let Err(e) = clickhouse_client::health::init_schema(&clickhouse).await {
        // Tables may already exist; the loops retry against them either way.
        error!(error = %e, "Failed to initialize ClickHouse schema");
    }

    check_health(&config, &clickhouse).await;

    let cancel = CancellationToken::new();
    let handles = spawn_roles(&config, &clickhouse, &cancel).context("Failed to start workers")?;

    let status = ClickHouseStatus::new(clickhouse.clone(), config.enricher.cursor_key.clone());
    let app = router(AppState::new(Arc::new(status)));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    let server_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_cancel.cancel();
        })
        .await
        .context("Server error")?;

    info!("Shutting down...");
    cancel.cancel();

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Worker task ended abnormally");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Build and spawn one periodic loop per configured role.
fn spawn_roles(
    config: &Config,
    clickhouse: &ClickHouseClient,
    cancel: &CancellationToken,
) -> ingest_core::Result<Vec<JoinHandle<()>>> {
    let ledger = Arc::new(ClickHouseLedger::new(clickhouse.clone()));
    let store = Arc::new(ClickHouseStore::new(clickhouse.clone()));
    let mut handles = Vec::new();

    for role in &config.roles {
        let (task, schedule): (Arc<dyn PeriodicTask>, Schedule) = match role {
            Role::LoaderTraces | Role::LoaderLogs | Role::LoaderMetrics => {
                let signal = role
                    .loader_signal()
                    .ok_or_else(|| ingest_core::Error::internal("loader role without signal"))?;
                let loader_config = config.loaders.for_signal(signal);
                let loader = FileLoader::new(
                    signal,
                    loader_config,
                    open_raw_bucket(&config.storage)?,
                    ledger.clone(),
                    store.clone(),
                )?;
                (Arc::new(loader) as Arc<dyn PeriodicTask>, loader_config.schedule()?)
            }
            Role::Enricher => {
                let embedder = HttpEmbedder::new(&config.embedding)?;
                let tracker = EnrichmentTracker::new(
                    &config.enricher,
                    ledger.clone(),
                    store.clone(),
                    store.clone(),
                    Arc::new(embedder),
                );
                (Arc::new(tracker) as Arc<dyn PeriodicTask>, config.enricher.schedule()?)
            }
            Role::Backup => {
                let target = ExportTarget {
                    url: config.backup.export_url()?.to_string(),
                    access_key_id: config.storage.access_key_id.clone(),
                    secret_access_key: config.storage.secret_access_key.clone(),
                };
                let exporter = ClickHouseStore::new(clickhouse.clone()).with_export_target(target);
                let coordinator = BackupCoordinator::new(
                    &config.backup,
                    ledger.clone(),
                    Arc::new(exporter),
                    open_backup_bucket(&config.storage)?,
                )?;
                (Arc::new(coordinator) as Arc<dyn PeriodicTask>, config.backup.schedule()?)
            }
        };

        info!(role = role.as_str(), "Starting worker");
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            run_periodic(task, schedule, cancel).await;
        }));
    }

    Ok(handles)
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("roles")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    apply_env_overrides(&mut config, |name| {
        std::env::var(format!("{}_{}", ENV_PREFIX, name)).ok()
    });
    Ok(config)
}

/// Flat overrides on top of the layered sources.
///
/// The config crate's nested parsing doesn't work reliably with underscored
/// field names, so the common deployment knobs are read explicitly.
fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    // ClickHouse
    if let Some(url) = var("CLICKHOUSE_URL") {
        config.clickhouse.url = Some(url);
    }
    if let Some(database) = var("CLICKHOUSE_DATABASE") {
        config.clickhouse.database = Some(database);
    }
    if let Some(username) = var("CLICKHOUSE_USERNAME") {
        config.clickhouse.username = Some(username);
    }
    if let Some(password) = var("CLICKHOUSE_PASSWORD") {
        config.clickhouse.password = Some(password);
    }

    // Object storage
    if let Some(endpoint) = var("S3_ENDPOINT") {
        config.storage.endpoint = Some(endpoint);
    }
    if let Some(region) = var("S3_REGION") {
        config.storage.region = Some(region);
    }
    if let Some(key) = var("S3_ACCESS_KEY_ID") {
        config.storage.access_key_id = Some(key);
    }
    if let Some(secret) = var("S3_SECRET_ACCESS_KEY") {
        config.storage.secret_access_key = Some(secret);
    }
    if let Some(bucket) = var("RAW_BUCKET") {
        config.storage.raw_bucket = Some(bucket);
    }
    if let Some(bucket) = var("BACKUP_BUCKET") {
        config.storage.backup_bucket = Some(bucket);
    }

    // Loader prefixes
    if let Some(prefix) = var("TRACES_PREFIX") {
        config.loaders.traces.prefix = Some(prefix);
    }
    if let Some(prefix) = var("LOGS_PREFIX") {
        config.loaders.logs.prefix = Some(prefix);
    }
    if let Some(prefix) = var("METRICS_PREFIX") {
        config.loaders.metrics.prefix = Some(prefix);
    }

    // Backups and embeddings
    if let Some(url) = var("BACKUP_EXPORT_URL") {
        config.backup.export_url = Some(url);
    }
    if let Some(url) = var("EMBEDDING_URL") {
        config.embedding.url = Some(url);
    }
    if let Some(model) = var("EMBEDDING_MODEL") {
        config.embedding.model = Some(model);
    }
    if let Some(key) = var("EMBEDDING_API_KEY") {
        config.embedding.api_key = Some(key);
    }
}

/// Check component health on startup and disable components no role uses.
async fn check_health(config: &Config, clickhouse: &ClickHouseClient) {
    let ch_healthy = clickhouse_client::health::check_connection(clickhouse).await;
    if ch_healthy {
        health().clickhouse.set_healthy();
        info!("ClickHouse connection: healthy");
    } else {
        health().clickhouse.set_unhealthy("Connection failed");
        error!("ClickHouse connection: unhealthy");
    }

    health().object_storage.set_enabled(config.needs_storage());
    if config.needs_storage() {
        let probe = match open_raw_bucket(&config.storage) {
            Ok(bucket) => bucket.check().await,
            Err(e) => Err(e),
        };
        health().object_storage.observe(&probe);
        match probe {
            Ok(()) => info!("Object storage: healthy"),
            Err(e) => error!(error = %e, "Object storage: unhealthy"),
        }
    }

    // Embedding health is first known after the enricher's first batch.
    health().embedding.set_enabled(config.has_role(Role::Enricher));
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
