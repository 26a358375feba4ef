//! ClickHouse client wrapper.

use crate::config::ClickHouseConfig;
use clickhouse::Client;
use ingest_core::{ident, DbErrorCode, Error, Result};
use tracing::info;

/// ClickHouse client bound to one database.
#[derive(Clone)]
pub struct ClickHouseClient {
    inner: Client,
    database: String,
}

impl ClickHouseClient {
    /// Creates a new ClickHouse client.
    pub fn new(config: ClickHouseConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| Error::config("clickhouse.url is required"))?;
        let database = config
            .database
            .clone()
            .ok_or_else(|| Error::config("clickhouse.database is required"))?;
        ident::sql_identifier(&database)?;

        let mut client = Client::default()
            .with_url(&url)
            .with_database(&database)
            .with_option("max_execution_time", config.timeout_secs.to_string());

        if let Some(ref user) = config.username {
            client = client.with_user(user);
        }

        if let Some(ref pass) = config.password {
            client = client.with_password(pass);
        }

        info!(url = %url, database = %database, "Created ClickHouse client");

        Ok(Self {
            inner: client,
            database,
        })
    }

    /// Returns the inner clickhouse client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Database all unqualified table names resolve to.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// A client on the `default` database, for statements that must run
    /// before the target database exists.
    pub(crate) fn admin(&self) -> Client {
        self.inner.clone().with_database("default")
    }
}

pub(crate) fn query_error(e: clickhouse::error::Error) -> Error {
    Error::database(DbErrorCode::QueryFailed, e.to_string())
}

pub(crate) fn insert_error(e: clickhouse::error::Error) -> Error {
    Error::database(DbErrorCode::InsertFailed, e.to_string())
}
