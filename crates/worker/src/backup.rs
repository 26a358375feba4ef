//! Partition backup coordinator.
//!
//! One cycle walks the configured tables in order and each table's active
//! partitions in order, exporting closed partitions the ledger has not
//! marked `done`. A daily partition is closed once `settle_days` have passed
//! since its date; until then it still receives rows and is left alone, so a
//! `done` record always covers a complete day. It then rebuilds the manifest from the ledger and overwrites it
//! in the backup bucket. A manifest failure is logged only; the ledger stays
//! authoritative and the next cycle republishes.

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use clickhouse_client::ActivePartition;
use ingest_core::{
    ident, BackupConfig, BackupManifest, Decision, PartitionLedger, PartitionRecord, Result,
    RetryPolicy, WorkStatus, MANIFEST_KEY,
};
use object_storage::Bucket;
use std::sync::Arc;
use telemetry::{health, metrics};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::scheduler::PeriodicTask;
use crate::store::PartitionExporter;

/// Outcome counts of one backup cycle.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BackupReport {
    pub exported: usize,
    pub failed: usize,
    pub skipped_done: usize,
    pub skipped_exhausted: usize,
    /// Partitions still inside their settle window.
    pub skipped_open: usize,
    /// Tables whose partitions could not be listed this cycle.
    pub tables_unavailable: usize,
    /// The manifest written this cycle, if publishing succeeded.
    pub manifest: Option<BackupManifest>,
    pub interrupted: bool,
}

impl BackupReport {
    pub fn did_work(&self) -> bool {
        self.exported + self.failed > 0
    }
}

/// Whether a daily partition can no longer receive rows on `today`.
///
/// Values that do not parse as dates carry no day and are always eligible.
fn is_closed(partition: &str, today: NaiveDate, settle_days: u32) -> bool {
    match NaiveDate::parse_from_str(partition, "%Y-%m-%d") {
        Ok(day) => day
            .checked_add_days(Days::new(u64::from(settle_days)))
            .is_some_and(|closes| closes <= today),
        Err(_) => true,
    }
}

pub struct BackupCoordinator {
    tables: Vec<String>,
    settle_days: u32,
    retry: RetryPolicy,
    ledger: Arc<dyn PartitionLedger>,
    exporter: Arc<dyn PartitionExporter>,
    backups: Bucket,
}

impl BackupCoordinator {
    pub fn new(
        config: &BackupConfig,
        ledger: Arc<dyn PartitionLedger>,
        exporter: Arc<dyn PartitionExporter>,
        backups: Bucket,
    ) -> Result<Self> {
        let tables = config
            .tables
            .iter()
            .map(|t| ident::sql_identifier(t).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            tables,
            settle_days: config.settle_days.max(1),
            retry: config.retry_policy(),
            ledger,
            exporter,
            backups,
        })
    }

    /// Export every pending closed partition, then publish the manifest.
    pub async fn backup_cycle(&self, cancel: &CancellationToken) -> Result<BackupReport> {
        self.backup_cycle_on(Utc::now().date_naive(), cancel).await
    }

    /// [`Self::backup_cycle`] with partitions judged closed relative to `today`.
    pub async fn backup_cycle_on(
        &self,
        today: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<BackupReport> {
        let mut report = BackupReport::default();

        for table in &self.tables {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }
            self.backup_table(table, today, cancel, &mut report).await?;
        }

        if report.interrupted {
            info!("Backup cycle cancelled before manifest publish");
            return Ok(report);
        }

        match self.publish_manifest().await {
            Ok(manifest) => {
                metrics().manifest_publishes.inc();
                report.manifest = Some(manifest);
            }
            Err(e) => {
                metrics().manifest_failures.inc();
                error!(error = %e, "Failed to publish backup manifest, ledger kept");
            }
        }

        info!(
            exported = report.exported,
            failed = report.failed,
            skipped = report.skipped_done,
            open = report.skipped_open,
            manifest = report.manifest.is_some(),
            "Backup cycle complete"
        );
        Ok(report)
    }

    async fn backup_table(
        &self,
        table: &str,
        today: NaiveDate,
        cancel: &CancellationToken,
        report: &mut BackupReport,
    ) -> Result<()> {
        let partitions = match self.exporter.active_partitions(table).await {
            Ok(partitions) => partitions,
            Err(e) => {
                report.tables_unavailable += 1;
                warn!(table = table, error = %e, "Could not list partitions, skipping table");
                return Ok(());
            }
        };
        let latest = self.ledger.latest_partitions(table).await?;

        for partition in partitions {
            if cancel.is_cancelled() {
                report.interrupted = true;
                return Ok(());
            }

            if !is_closed(&partition.partition, today, self.settle_days) {
                report.skipped_open += 1;
                debug!(table = table, partition = %partition.partition, "Partition still open");
                continue;
            }

            let attempt = match self.retry.decide(latest.get(&partition.partition)) {
                Decision::Process { attempt } => attempt,
                Decision::SkipDone => {
                    report.skipped_done += 1;
                    continue;
                }
                Decision::SkipExhausted { attempts } => {
                    report.skipped_exhausted += 1;
                    warn!(
                        table = table,
                        partition = %partition.partition,
                        attempts = attempts,
                        "Retry limit reached, skipping partition"
                    );
                    continue;
                }
            };

            let status = self.export(table, &partition, attempt).await;
            let record = PartitionRecord::new(table, &partition.partition, status, attempt);
            self.ledger.record_partition(&record).await?;

            match status {
                WorkStatus::Done => report.exported += 1,
                WorkStatus::Failed => report.failed += 1,
            }
        }
        Ok(())
    }

    async fn export(&self, table: &str, partition: &ActivePartition, attempt: u32) -> WorkStatus {
        let result = self.exporter.export(table, partition).await;
        health().clickhouse.observe(&result);
        match result {
            Ok(()) => {
                metrics().partitions_exported.inc();
                debug!(table = table, partition = %partition.partition, "Partition backed up");
                WorkStatus::Done
            }
            Err(e) => {
                metrics().partitions_failed.inc();
                error!(
                    table = table,
                    partition = %partition.partition,
                    attempt = attempt,
                    error = %e,
                    "Partition export failed"
                );
                WorkStatus::Failed
            }
        }
    }

    /// Build the manifest from the ledger and overwrite the published copy.
    pub async fn publish_manifest(&self) -> Result<BackupManifest> {
        let services = self.exporter.service_names().await?;
        let mut manifest = BackupManifest::new(services);
        for table in &self.tables {
            manifest.set_table(table.as_str(), self.ledger.done_partitions(table).await?);
        }

        let body = manifest.to_json()?;
        let written = self.backups.put(MANIFEST_KEY, body).await;
        health().object_storage.observe(&written);
        written?;

        debug!(
            bucket = self.backups.name(),
            services = manifest.services.len(),
            partitions = manifest.partition_count(),
            "Published backup manifest"
        );
        Ok(manifest)
    }
}

#[async_trait]
impl PeriodicTask for BackupCoordinator {
    fn name(&self) -> &str {
        "backup"
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> Result<bool> {
        self.backup_cycle(cancel).await.map(|r| r.did_work())
    }
}
