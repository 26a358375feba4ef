//! ClickHouse health checks and schema bootstrap.

use crate::client::{query_error, ClickHouseClient};
use crate::schema::{all_tables, create_database};
use ingest_core::Result;
use tracing::{debug, error};

/// Check ClickHouse connection health.
pub async fn check_connection(client: &ClickHouseClient) -> bool {
    match client.inner().query("SELECT 1").fetch_one::<u8>().await {
        Ok(_) => {
            debug!("ClickHouse connection healthy");
            true
        }
        Err(e) => {
            error!("ClickHouse health check failed: {}", e);
            false
        }
    }
}

/// Create the database and every table if missing.
pub async fn init_schema(client: &ClickHouseClient) -> Result<()> {
    client
        .admin()
        .query(&create_database(client.database())?)
        .execute()
        .await
        .map_err(query_error)?;

    for ddl in all_tables() {
        client
            .inner()
            .query(&ddl)
            .execute()
            .await
            .map_err(query_error)?;
    }

    debug!(database = client.database(), "ClickHouse schema initialized");
    Ok(())
}
