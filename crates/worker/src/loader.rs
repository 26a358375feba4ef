//! File loader: object-storage OTLP files into a raw table, once per file.
//!
//! Per cycle:
//! 1. list `.json` keys under the signal prefix
//! 2. resolve each key against the file ledger (skip `done`)
//! 3. download and unpack pending files, a few at a time
//! 4. insert rows, then append a `done` or `failed` record
//!
//! Step 4's insert and ledger write are not atomic. A crash between them
//! reloads the file on the next cycle and duplicates its rows: delivery is
//! at-least-once.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use ingest_core::{
    otlp, Decision, FileLedger, FileRecord, LoaderConfig, Result, RetryPolicy, Signal, SignalBatch,
    WorkStatus,
};
use object_storage::Bucket;
use std::sync::Arc;
use std::time::Instant;
use telemetry::{health, metrics};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::scheduler::PeriodicTask;
use crate::store::RawSink;

/// Outcome counts of one loader cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub listed: usize,
    pub loaded: usize,
    pub failed: usize,
    pub skipped_done: usize,
    pub skipped_exhausted: usize,
    pub rows: u64,
    /// Set when cancellation stopped the cycle before every pending file was handled.
    pub interrupted: bool,
}

impl LoadReport {
    pub fn did_work(&self) -> bool {
        self.loaded + self.failed > 0
    }
}

/// Loader for one signal.
pub struct FileLoader {
    signal: Signal,
    prefix: String,
    bucket: Bucket,
    ledger: Arc<dyn FileLedger>,
    sink: Arc<dyn RawSink>,
    chunk_size: usize,
    workers: usize,
    retry: RetryPolicy,
    name: String,
}

impl FileLoader {
    pub fn new(
        signal: Signal,
        config: &LoaderConfig,
        bucket: Bucket,
        ledger: Arc<dyn FileLedger>,
        sink: Arc<dyn RawSink>,
    ) -> Result<Self> {
        Ok(Self {
            signal,
            prefix: config.prefix()?.to_string(),
            bucket,
            ledger,
            sink,
            chunk_size: config.insert_batch_size,
            workers: config.max_file_workers.max(1),
            retry: config.retry_policy(),
            name: format!("loader-{}", signal),
        })
    }

    /// List, filter and load every pending file.
    ///
    /// Per-file problems become `failed` records. Listing or ledger errors
    /// abort the cycle; nothing is marked `done` without a successful insert.
    pub async fn poll_and_load(&self, cancel: &CancellationToken) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        let keys = self.bucket.list_json(&self.prefix).await;
        health().object_storage.observe(&keys);
        let keys = keys?;
        report.listed = keys.len();
        metrics().files_listed.inc_by(keys.len() as u64);

        let latest = self.ledger.latest_files(self.signal).await?;

        let mut pending = Vec::new();
        for key in keys {
            match self.retry.decide(latest.get(&key)) {
                Decision::Process { attempt } => pending.push((key, attempt)),
                Decision::SkipDone => report.skipped_done += 1,
                Decision::SkipExhausted { attempts } => {
                    report.skipped_exhausted += 1;
                    metrics().files_skipped_exhausted.inc();
                    warn!(
                        signal = %self.signal,
                        file = %key,
                        attempts = attempts,
                        "Retry limit reached, skipping file"
                    );
                }
            }
        }

        if pending.is_empty() {
            debug!(signal = %self.signal, listed = report.listed, "No new files");
            return Ok(report);
        }

        debug!(signal = %self.signal, pending = pending.len(), "Loading files");

        // Downloads run concurrently; insert and ledger write stay sequential,
        // so each file is claimed by exactly one writer.
        let mut fetched = stream::iter(pending)
            .map(|(key, attempt)| self.fetch(key, attempt))
            .buffer_unordered(self.workers);

        while let Some(file) = fetched.next().await {
            if cancel.is_cancelled() {
                report.interrupted = true;
                info!(signal = %self.signal, "Cancelled, remaining files left for the next cycle");
                break;
            }

            let FetchedFile {
                key,
                attempt,
                started,
                batch,
            } = file;

            let record = match batch {
                Ok(batch) => match self.insert(batch).await {
                    Ok(rows) => FileRecord::done(&key, rows as u64, attempt),
                    Err(e) => FileRecord::failed(&key, e.to_string(), attempt),
                },
                Err(e) => FileRecord::failed(&key, e.to_string(), attempt),
            };

            self.ledger.record_file(self.signal, &record).await?;
            metrics()
                .file_load_latency_ms
                .observe(started.elapsed().as_millis() as u64);

            if record.status == WorkStatus::Done {
                report.loaded += 1;
                report.rows += record.row_count;
                metrics().files_loaded.inc();
                metrics().rows_loaded.inc_by(record.row_count);
                debug!(
                    signal = %self.signal,
                    file = %key,
                    "Loaded {} {}",
                    record.row_count,
                    self.signal.row_label()
                );
            } else {
                report.failed += 1;
                metrics().files_failed.inc();
                error!(
                    signal = %self.signal,
                    file = %key,
                    attempt = attempt,
                    error = %record.error_message,
                    "Failed to load file"
                );
            }
        }

        info!(
            signal = %self.signal,
            listed = report.listed,
            loaded = report.loaded,
            failed = report.failed,
            skipped = report.skipped_done,
            rows = report.rows,
            "Loader cycle complete"
        );
        Ok(report)
    }

    async fn fetch(&self, key: String, attempt: u32) -> FetchedFile {
        let started = Instant::now();
        let batch = {
            let _in_flight = metrics().files_in_flight.track();
            match self.bucket.read(&key).await {
                Ok(body) => otlp::unpack(self.signal, &body),
                Err(e) => Err(e),
            }
        };

        FetchedFile {
            key,
            attempt,
            started,
            batch,
        }
    }

    async fn insert(&self, batch: SignalBatch) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let result = self.sink.insert_batch(batch, self.chunk_size).await;
        health().clickhouse.observe(&result);
        result
    }
}

struct FetchedFile {
    key: String,
    attempt: u32,
    started: Instant,
    batch: Result<SignalBatch>,
}

#[async_trait]
impl PeriodicTask for FileLoader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> Result<bool> {
        self.poll_and_load(cancel).await.map(|r| r.did_work())
    }
}
