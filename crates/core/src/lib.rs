//! Core types for the OTLP ingestion pipeline: the watermark ledger contract,
//! OTLP unpacking, backup manifests and pipeline configuration.

pub mod config;
pub mod error;
pub mod ident;
pub mod manifest;
pub mod memory;
pub mod otlp;
pub mod signal;
pub mod watermark;

pub use config::*;
pub use error::{DbErrorCode, Error, Result};
pub use manifest::{BackupManifest, MANIFEST_KEY};
pub use memory::InMemoryLedger;
pub use otlp::{LogRecord, MetricPoint, SignalBatch, Span, SpanEvent, SpanLink};
pub use signal::Signal;
pub use watermark::*;
