//! Object storage access: the landing bucket the collector writes OTLP files
//! to, and the backup bucket partition exports and the manifest go to.

pub mod bucket;
pub mod config;

pub use bucket::{open_backup_bucket, open_bucket, open_raw_bucket, Bucket, JSON_SUFFIX};
pub use config::{Backend, ObjectStorageConfig};
