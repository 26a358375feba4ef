//! Logging setup, component health and in-process counters for the
//! ingestion pipeline.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
