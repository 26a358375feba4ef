//! Long-running pipeline components.
//!
//! - File loaders (object storage → raw tables, one per signal)
//! - Enrichment tracker (raw spans → embeddings, behind a cursor)
//! - Backup coordinator (raw partitions → backup bucket + manifest)
//!
//! Each implements [`PeriodicTask`] and is driven by [`run_periodic`].

pub mod backup;
pub mod embedding;
pub mod enricher;
pub mod loader;
pub mod scheduler;
pub mod store;

pub use backup::{BackupCoordinator, BackupReport};
pub use embedding::{Embedder, HttpEmbedder};
pub use enricher::{embedding_text, EnrichReport, EnrichmentTracker};
pub use loader::{FileLoader, LoadReport};
pub use scheduler::*;
pub use store::*;
