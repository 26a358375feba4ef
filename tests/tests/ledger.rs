//! Watermark ledger behavior against a real ClickHouse.
//!
//! Requires Docker to be running for testcontainers, or
//! `OTEL_INGEST_TEST_CLICKHOUSE_URL` pointing at a server.

use chrono::{Duration, Utc};
use clickhouse_client::{file_ledger_summary, partition_ledger_summary};
use ingest_core::{
    Cursor, CursorPosition, CursorStore, FileLedger, FileRecord, PartitionLedger,
    PartitionRecord, Signal, WorkStatus,
};
use integration_tests::setup::TestContext;

/// A failed attempt followed by a success resolves to done.
#[tokio::test]
async fn test_latest_file_record_wins() {
    let ctx = TestContext::new().await;
    let now = Utc::now();

    let mut failed = FileRecord::failed("traces/a.json", "connection reset", 1);
    failed.processed_at = now - Duration::seconds(10);
    let mut done = FileRecord::done("traces/a.json", 12, 2);
    done.processed_at = now;

    // Insert out of order; the newest ProcessedAt must still win.
    ctx.ledger.record_file(Signal::Traces, &done).await.unwrap();
    ctx.ledger.record_file(Signal::Traces, &failed).await.unwrap();

    let latest = ctx
        .ledger
        .latest_file(Signal::Traces, "traces/a.json")
        .await
        .unwrap()
        .expect("file should be in the ledger");
    assert_eq!(latest.status, WorkStatus::Done);
    assert_eq!(latest.row_count, 12);
    assert_eq!(latest.attempts, 2);

    let all = ctx.ledger.latest_files(Signal::Traces).await.unwrap();
    assert_eq!(all.len(), 1, "duplicates collapse to one key");
}

/// Each signal keeps its own file ledger.
#[tokio::test]
async fn test_file_ledgers_are_per_signal() {
    let ctx = TestContext::new().await;

    ctx.ledger
        .record_file(Signal::Logs, &FileRecord::done("shared.json", 3, 1))
        .await
        .unwrap();

    assert!(ctx
        .ledger
        .latest_file(Signal::Traces, "shared.json")
        .await
        .unwrap()
        .is_none());
    assert!(ctx
        .ledger
        .latest_file(Signal::Logs, "shared.json")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_partition_ledger_and_summary() {
    let ctx = TestContext::new().await;
    let now = Utc::now();

    let mut first = PartitionRecord::new("otel_traces", "2024-01-01", WorkStatus::Failed, 1);
    first.processed_at = now - Duration::seconds(5);
    let mut retry = PartitionRecord::new("otel_traces", "2024-01-01", WorkStatus::Done, 2);
    retry.processed_at = now;
    let other = PartitionRecord::new("otel_traces", "2024-01-02", WorkStatus::Failed, 1);

    for record in [&first, &retry, &other] {
        ctx.ledger.record_partition(record).await.unwrap();
    }

    let latest = ctx.ledger.latest_partitions("otel_traces").await.unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest["2024-01-01"].status, WorkStatus::Done);
    assert_eq!(latest["2024-01-02"].status, WorkStatus::Failed);

    let done = ctx.ledger.done_partitions("otel_traces").await.unwrap();
    assert_eq!(done.into_iter().collect::<Vec<_>>(), vec!["2024-01-01"]);

    let summary = partition_ledger_summary(&ctx.clickhouse).await.unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].table_name, "otel_traces");
    assert_eq!((summary[0].done, summary[0].failed), (1, 1));
}

#[tokio::test]
async fn test_file_summary_counts_latest_state_only() {
    let ctx = TestContext::new().await;
    let now = Utc::now();

    let mut failed = FileRecord::failed("metrics/a.json", "timeout", 1);
    failed.processed_at = now - Duration::seconds(1);
    let mut done = FileRecord::done("metrics/a.json", 7, 2);
    done.processed_at = now;

    for record in [&failed, &done, &FileRecord::failed("metrics/b.json", "bad json", 1)] {
        ctx.ledger.record_file(Signal::Metrics, record).await.unwrap();
    }

    let summary = file_ledger_summary(&ctx.clickhouse, Signal::Metrics)
        .await
        .unwrap();
    assert_eq!(summary.done, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.rows_loaded, 7);
}

#[tokio::test]
async fn test_cursor_latest_update_wins() {
    let ctx = TestContext::new().await;
    assert!(ctx.ledger.load_cursor("global").await.unwrap().is_none());

    let old = Cursor {
        key: "global".to_string(),
        position: CursorPosition::new(100, "aaaa"),
        updated_at: Utc::now() - Duration::seconds(30),
    };
    let new = Cursor::origin("global")
        .advance(CursorPosition::new(200, "bbbb"))
        .unwrap();

    ctx.ledger.store_cursor(&new).await.unwrap();
    ctx.ledger.store_cursor(&old).await.unwrap();

    let loaded = ctx.ledger.load_cursor("global").await.unwrap().unwrap();
    assert_eq!(loaded.position, CursorPosition::new(200, "bbbb"));
}
