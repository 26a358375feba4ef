//! Object storage configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Storage backend kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// AWS S3 or an S3-compatible service (MinIO, Garage).
    #[default]
    S3,
    /// Local directory; each bucket is a subdirectory.
    Local,
    /// Process memory, for tests and dry runs.
    Memory,
}

/// Object storage connection settings.
///
/// Bucket names and the endpoint are deployment-specific and have no
/// defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ObjectStorageConfig {
    #[serde(default)]
    pub backend: Backend,
    /// Custom endpoint for S3-compatible services, e.g. `http://minio:9000`.
    #[validate(url)]
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// Falls back to `AWS_ACCESS_KEY_ID` when unset.
    pub access_key_id: Option<String>,
    /// Falls back to `AWS_SECRET_ACCESS_KEY` when unset.
    pub secret_access_key: Option<String>,
    /// Allow plain HTTP (local development).
    #[serde(default)]
    pub allow_http: bool,
    /// Use path-style URLs (required by MinIO).
    #[serde(default)]
    pub force_path_style: bool,
    /// Root directory for the local backend.
    pub local_path: Option<String>,
    /// Bucket the collector lands OTLP files in.
    #[validate(required, length(min = 1))]
    pub raw_bucket: Option<String>,
    /// Bucket partition backups and the manifest are written to.
    #[validate(required, length(min = 1))]
    pub backup_bucket: Option<String>,
}
