//! ClickHouse access for the ingestion pipeline: raw and enriched tables,
//! the watermark ledger and partition exports.

pub mod client;
pub mod config;
pub mod health;
pub mod insert;
pub mod partitions;
pub mod query;
pub mod schema;
pub mod watermark;

pub use client::*;
pub use config::*;
pub use partitions::{ActivePartition, ExportTarget};
pub use query::*;
pub use watermark::ClickHouseLedger;
