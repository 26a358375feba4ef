//! Embedding enrichment of raw spans.
//!
//! The tracker walks `otel_traces` in `(Timestamp, SpanId)` order behind a
//! persisted cursor. A batch is fetched after the cursor, embedded, written
//! to the enriched table, and only then is the cursor moved to the batch's
//! last row. Any failure leaves the cursor where it was and the whole batch
//! is recomputed next cycle; enriched writes replace by `(TraceId, SpanId)`.

use async_trait::async_trait;
use clickhouse_client::insert::EnrichedSpanRow;
use clickhouse_client::StoredSpan;
use ingest_core::{Cursor, CursorStore, EnricherConfig, Error, Result};
use std::fmt::Write as _;
use std::sync::Arc;
use telemetry::{health, metrics};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::embedding::Embedder;
use crate::scheduler::PeriodicTask;
use crate::store::{EnrichedSink, SpanSource};

/// Text fed to the embedding model for one span.
///
/// `service=.. span=.. kind=.. status=.. duration=12.5ms [message=..]`
/// followed by the span attributes as `key=value`, sorted by key.
pub fn embedding_text(span: &StoredSpan) -> String {
    let mut text = format!(
        "service={} span={} kind={} status={} duration={:.1}ms",
        span.service_name,
        span.span_name,
        span.span_kind,
        span.status_code,
        span.duration as f64 / 1_000_000.0
    );
    if !span.status_message.is_empty() {
        let _ = write!(text, " message={}", span.status_message);
    }

    let mut attributes: Vec<&(String, String)> = span.span_attributes.iter().collect();
    attributes.sort();
    for (key, value) in attributes {
        let _ = write!(text, " {}={}", key, value);
    }
    text
}

/// Outcome of one enrichment batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichReport {
    pub enriched: usize,
    /// Cursor after the batch; unchanged when nothing was enriched.
    pub cursor: Cursor,
}

pub struct EnrichmentTracker {
    cursor_key: String,
    batch_size: usize,
    cursors: Arc<dyn CursorStore>,
    source: Arc<dyn SpanSource>,
    sink: Arc<dyn EnrichedSink>,
    embedder: Arc<dyn Embedder>,
}

impl EnrichmentTracker {
    pub fn new(
        config: &EnricherConfig,
        cursors: Arc<dyn CursorStore>,
        source: Arc<dyn SpanSource>,
        sink: Arc<dyn EnrichedSink>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            cursor_key: config.cursor_key.clone(),
            batch_size: config.batch_size.max(1),
            cursors,
            source,
            sink,
            embedder,
        }
    }

    /// Current cursor, or the origin if none was stored yet.
    pub async fn current_cursor(&self) -> Result<Cursor> {
        Ok(self
            .cursors
            .load_cursor(&self.cursor_key)
            .await?
            .unwrap_or_else(|| Cursor::origin(&self.cursor_key)))
    }

    /// Enrich the next batch after `cursor`, returning the advanced cursor.
    ///
    /// The cursor is persisted only after every row of the batch is written.
    pub async fn enrich_after(&self, cursor: Cursor) -> Result<EnrichReport> {
        let spans = self
            .source
            .spans_after(&cursor.position, self.batch_size)
            .await?;

        let Some(last) = spans.last().map(StoredSpan::position) else {
            debug!(cursor = %cursor.position, "No new spans");
            return Ok(EnrichReport {
                enriched: 0,
                cursor,
            });
        };

        let next = cursor.advance(last)?;
        let texts: Vec<String> = spans.iter().map(embedding_text).collect();

        let vectors = self.embedder.embed(&texts).await;
        health().embedding.observe(&vectors);
        let vectors = vectors?;
        if vectors.len() != spans.len() {
            return Err(Error::embedding(format!(
                "expected {} embeddings, got {}",
                spans.len(),
                vectors.len()
            )));
        }

        let rows: Vec<EnrichedSpanRow> = spans
            .into_iter()
            .zip(texts)
            .zip(vectors)
            .map(|((span, text), vector)| EnrichedSpanRow::new(span, text, vector))
            .collect();

        let written = self.sink.write_enriched(&rows).await;
        health().clickhouse.observe(&written);
        written?;

        self.cursors.store_cursor(&next).await?;

        metrics().spans_enriched.inc_by(rows.len() as u64);
        info!(
            rows = rows.len(),
            from = %cursor.position,
            to = %next.position,
            "Enriched batch"
        );

        Ok(EnrichReport {
            enriched: rows.len(),
            cursor: next,
        })
    }

    /// Load the cursor and enrich one batch after it.
    pub async fn enrich_batch(&self) -> Result<EnrichReport> {
        metrics().enrich_batches.inc();
        let cursor = self.current_cursor().await?;
        let result = self.enrich_after(cursor).await;
        if let Err(e) = &result {
            metrics().enrich_failures.inc();
            warn!(error = %e, "Enrichment batch failed, cursor not moved");
        }
        result
    }
}

#[async_trait]
impl PeriodicTask for EnrichmentTracker {
    fn name(&self) -> &str {
        "enricher"
    }

    async fn run_cycle(&self, _cancel: &CancellationToken) -> Result<bool> {
        // A batch is one unit; it either commits its cursor or leaves it.
        self.enrich_batch().await.map(|r| r.enriched > 0)
    }
}
