//! End-to-end pipeline runs: raw files to ClickHouse, enrichment and backup.
//!
//! Requires Docker to be running for testcontainers, or
//! `OTEL_INGEST_TEST_CLICKHOUSE_URL` pointing at a server.

use ingest_core::{FileLedger, PartitionLedger, Signal, WorkStatus, MANIFEST_KEY};
use integration_tests::fixtures::{
    log_file, malformed_file, metric_file, trace_file, DAY_NS, JAN_1_2024_NS,
};
use integration_tests::setup::{TestContext, TEST_DIMENSIONS};
use tokio_util::sync::CancellationToken;

async fn enriched_count(ctx: &TestContext) -> u64 {
    ctx.clickhouse
        .inner()
        .query("SELECT count() FROM otel_traces_enriched FINAL")
        .fetch_one::<u64>()
        .await
        .unwrap()
}

/// Two good files and one malformed file: the good ones load, the bad one
/// is recorded as failed, and a second cycle loads nothing new.
#[tokio::test]
async fn test_trace_loader_is_idempotent() {
    let ctx = TestContext::new().await;
    ctx.put_raw("traces/a.json", trace_file("checkout", 1, 3, JAN_1_2024_NS))
        .await;
    ctx.put_raw("traces/b.json", trace_file("payments", 2, 2, JAN_1_2024_NS))
        .await;
    ctx.put_raw("traces/broken.json", malformed_file()).await;

    let loader = ctx.loader(Signal::Traces, None);
    let cancel = CancellationToken::new();

    let first = loader.poll_and_load(&cancel).await.unwrap();
    assert_eq!(first.listed, 3);
    assert_eq!(first.loaded, 2);
    assert_eq!(first.failed, 1);
    assert_eq!(first.rows, 5);
    assert_eq!(ctx.count("otel_traces").await, 5);

    let broken = ctx
        .ledger
        .latest_file(Signal::Traces, "traces/broken.json")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(broken.status, WorkStatus::Failed);
    assert!(!broken.error_message.is_empty());

    let second = loader.poll_and_load(&cancel).await.unwrap();
    assert_eq!(second.loaded, 0);
    assert_eq!(second.skipped_done, 2);
    assert_eq!(second.failed, 1, "failed file is retried");
    assert_eq!(ctx.count("otel_traces").await, 5, "no duplicate rows");
}

#[tokio::test]
async fn test_log_and_metric_loaders_use_their_own_tables() {
    let ctx = TestContext::new().await;
    ctx.put_raw("logs/a.json", log_file("checkout", 4, JAN_1_2024_NS))
        .await;
    ctx.put_raw("metrics/a.json", metric_file("checkout", 3, JAN_1_2024_NS))
        .await;

    let cancel = CancellationToken::new();
    let logs = ctx
        .loader(Signal::Logs, None)
        .poll_and_load(&cancel)
        .await
        .unwrap();
    let metrics = ctx
        .loader(Signal::Metrics, None)
        .poll_and_load(&cancel)
        .await
        .unwrap();

    assert_eq!((logs.loaded, logs.rows), (1, 4));
    assert_eq!((metrics.loaded, metrics.rows), (1, 3));
    assert_eq!(ctx.count("otel_logs").await, 4);
    assert_eq!(ctx.count("otel_metrics").await, 3);
    assert_eq!(ctx.count("otel_traces").await, 0);
}

/// A file that keeps failing is skipped once it reaches the attempt cap.
#[tokio::test]
async fn test_retry_cap_stops_reprocessing() {
    let ctx = TestContext::new().await;
    ctx.put_raw("traces/broken.json", malformed_file()).await;

    let loader = ctx.loader(Signal::Traces, Some(2));
    let cancel = CancellationToken::new();

    assert_eq!(loader.poll_and_load(&cancel).await.unwrap().failed, 1);
    assert_eq!(loader.poll_and_load(&cancel).await.unwrap().failed, 1);

    let third = loader.poll_and_load(&cancel).await.unwrap();
    assert_eq!(third.failed, 0);
    assert_eq!(third.skipped_exhausted, 1);

    let record = ctx
        .ledger
        .latest_file(Signal::Traces, "traces/broken.json")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.attempts, 2);
}

/// Enrichment walks the trace table in cursor order and never embeds a
/// span twice.
#[tokio::test]
async fn test_enricher_advances_cursor_through_all_spans() {
    let ctx = TestContext::new().await;
    ctx.put_raw("traces/a.json", trace_file("checkout", 7, 5, JAN_1_2024_NS))
        .await;
    ctx.loader(Signal::Traces, None)
        .poll_and_load(&CancellationToken::new())
        .await
        .unwrap();

    let tracker = ctx.tracker(2);
    let mut total = 0;
    loop {
        let report = tracker.enrich_batch().await.unwrap();
        if report.enriched == 0 {
            break;
        }
        total += report.enriched;
    }

    assert_eq!(total, 5);
    assert_eq!(ctx.embedder.call_count(), 5, "each span embedded once");
    assert_eq!(enriched_count(&ctx).await, 5);

    let cursor = tracker.current_cursor().await.unwrap();
    assert_eq!(cursor.position.timestamp_ns, JAN_1_2024_NS + 4_000_000);

    let dims: u64 = ctx
        .clickhouse
        .inner()
        .query("SELECT max(length(Embedding)) FROM otel_traces_enriched")
        .fetch_one::<u64>()
        .await
        .unwrap();
    assert_eq!(dims as usize, TEST_DIMENSIONS);
}

#[tokio::test]
async fn test_enricher_failure_keeps_cursor() {
    let ctx = TestContext::new().await;
    ctx.put_raw("traces/a.json", trace_file("checkout", 8, 2, JAN_1_2024_NS))
        .await;
    ctx.loader(Signal::Traces, None)
        .poll_and_load(&CancellationToken::new())
        .await
        .unwrap();

    let tracker = ctx.tracker(10);
    let before = tracker.current_cursor().await.unwrap();

    ctx.embedder.set_should_fail(true);
    assert!(tracker.enrich_batch().await.is_err());
    assert_eq!(tracker.current_cursor().await.unwrap().position, before.position);
    assert_eq!(enriched_count(&ctx).await, 0);

    ctx.embedder.set_should_fail(false);
    assert_eq!(tracker.enrich_batch().await.unwrap().enriched, 2);
}

/// Backup reads real partitions from `system.parts`, exports each once and
/// publishes a manifest naming only the done ones.
#[tokio::test]
async fn test_backup_exports_partitions_and_publishes_manifest() {
    let ctx = TestContext::new().await;
    ctx.put_raw("traces/day1.json", trace_file("checkout", 1, 2, JAN_1_2024_NS))
        .await;
    ctx.put_raw(
        "traces/day2.json",
        trace_file("payments", 2, 2, JAN_1_2024_NS + DAY_NS),
    )
    .await;
    ctx.loader(Signal::Traces, None)
        .poll_and_load(&CancellationToken::new())
        .await
        .unwrap();

    let (coordinator, exporter) = ctx.coordinator();
    exporter.fail_partition("2024-01-02");
    let cancel = CancellationToken::new();

    let first = coordinator.backup_cycle(&cancel).await.unwrap();
    assert_eq!(first.exported, 1);
    assert_eq!(first.failed, 1);

    let body = ctx.backups.read(MANIFEST_KEY).await.unwrap();
    let manifest: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(manifest["services"], serde_json::json!(["checkout", "payments"]));
    assert_eq!(manifest["tables"]["otel_traces"], serde_json::json!(["2024-01-01"]));

    exporter.clear_failures();
    let second = coordinator.backup_cycle(&cancel).await.unwrap();
    assert_eq!(second.exported, 1);
    assert_eq!(second.skipped_done, 1);
    assert_eq!(
        exporter.exports(),
        vec![
            ("otel_traces".to_string(), "2024-01-01".to_string()),
            ("otel_traces".to_string(), "2024-01-02".to_string()),
        ]
    );

    let done = ctx.ledger.done_partitions("otel_traces").await.unwrap();
    assert_eq!(done.len(), 2);
}
