//! Read-only pipeline status.

use axum::{extract::State, Json};
use telemetry::metrics;
use tracing::warn;

use crate::response::{ApiError, StatusResponse};
use crate::state::AppState;

/// GET /status - Ledger counts by status, row totals, cursor and counters.
pub async fn status_handler(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    let ledger = state.status.ledger_status().await.map_err(|e| {
        warn!(error = %e, "Status query failed");
        ApiError::from(e)
    })?;

    Ok(Json(StatusResponse {
        ledger,
        metrics: metrics().snapshot(),
        timestamp: chrono::Utc::now().timestamp_millis(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::router;
    use crate::state::{LedgerStatus, StatusSource};
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use clickhouse_client::FileLedgerSummary;
    use ingest_core::{DbErrorCode, Error, Result};
    use std::sync::Arc;

    struct Fixed(Option<LedgerStatus>);

    #[async_trait]
    impl StatusSource for Fixed {
        async fn ledger_status(&self) -> Result<LedgerStatus> {
            self.0
                .clone()
                .ok_or_else(|| Error::database(DbErrorCode::QueryFailed, "connection refused"))
        }
    }

    fn server(status: Option<LedgerStatus>) -> TestServer {
        let state = AppState::new(Arc::new(Fixed(status)));
        TestServer::new(router(state)).unwrap()
    }

    #[tokio::test]
    async fn test_status_reports_ledger_counts() {
        let mut ledger = LedgerStatus::default();
        ledger.files.insert(
            "traces".to_string(),
            FileLedgerSummary {
                done: 2,
                failed: 1,
                rows_loaded: 40,
            },
        );

        let response = server(Some(ledger)).get("/status").await;
        response.assert_status_ok();

        let body: serde_json::Value = response.json();
        assert_eq!(body["ledger"]["files"]["traces"]["done"], 2);
        assert_eq!(body["ledger"]["files"]["traces"]["rows_loaded"], 40);
        assert!(body["ledger"]["cursor"].is_null());
        assert!(body["metrics"]["files_loaded"].is_u64());
    }

    #[tokio::test]
    async fn test_status_maps_store_errors() {
        let response = server(None).get("/status").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);

        let body: serde_json::Value = response.json();
        assert_eq!(body["code"], "DB_001");
    }
}
