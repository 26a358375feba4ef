//! Bucket handle over an `ObjectStore`.

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tracing::debug;

use ingest_core::{Error, Result};

use crate::config::{Backend, ObjectStorageConfig};

/// Suffix of files the loaders pick up.
pub const JSON_SUFFIX: &str = ".json";

/// One named bucket.
#[derive(Clone)]
pub struct Bucket {
    name: String,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("name", &self.name)
            .field("store", &self.store.to_string())
            .finish()
    }
}

impl Bucket {
    /// Wrap a pre-configured object store.
    pub fn with_store(name: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    /// An empty bucket held in memory.
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::with_store(name, Arc::new(InMemory::new()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keys ending in `.json` under `prefix`, sorted.
    pub async fn list_json(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = ObjectPath::from(prefix);
        let mut stream = self.store.list(Some(&prefix));

        let mut keys = Vec::new();
        while let Some(item) = stream.next().await {
            let meta = item.map_err(|e| {
                Error::storage(format!("failed to list {}/{}: {}", self.name, prefix, e))
            })?;
            let key = meta.location.to_string();
            if key.ends_with(JSON_SUFFIX) {
                keys.push(key);
            }
        }

        keys.sort();
        debug!(bucket = %self.name, prefix = %prefix, count = keys.len(), "listed objects");
        Ok(keys)
    }

    /// Read a whole object.
    pub async fn read(&self, key: &str) -> Result<Bytes> {
        let path = ObjectPath::from(key);
        let result = self
            .store
            .get(&path)
            .await
            .map_err(|e| Error::storage(format!("failed to get {}/{}: {}", self.name, key, e)))?;

        result
            .bytes()
            .await
            .map_err(|e| Error::storage(format!("failed to read {}/{}: {}", self.name, key, e)))
    }

    /// Write an object, replacing any previous version.
    pub async fn put(&self, key: &str, body: impl Into<Bytes>) -> Result<()> {
        let path = ObjectPath::from(key);
        let body: Bytes = body.into();
        self.store
            .put(&path, body.into())
            .await
            .map_err(|e| Error::storage(format!("failed to put {}/{}: {}", self.name, key, e)))?;
        Ok(())
    }

    /// Cheap reachability probe: lists the bucket root without recursing.
    pub async fn check(&self) -> Result<()> {
        self.store
            .list_with_delimiter(None)
            .await
            .map(|_| ())
            .map_err(|e| Error::storage(format!("bucket {} unreachable: {}", self.name, e)))
    }
}

/// Open a bucket described by the configuration.
pub fn open_bucket(config: &ObjectStorageConfig, bucket: &str) -> Result<Bucket> {
    let store: Arc<dyn ObjectStore> = match config.backend {
        Backend::Memory => Arc::new(InMemory::new()),
        Backend::Local => {
            let root = config.local_path.as_deref().ok_or_else(|| {
                Error::config("storage.local_path is required for the local backend")
            })?;
            let dir = std::path::Path::new(root).join(bucket);
            std::fs::create_dir_all(&dir)
                .map_err(|e| Error::storage(format!("failed to create {}: {}", dir.display(), e)))?;
            let store = LocalFileSystem::new_with_prefix(&dir)
                .map_err(|e| Error::storage(format!("failed to open {}: {}", dir.display(), e)))?;
            Arc::new(store)
        }
        Backend::S3 => {
            use object_store::aws::AmazonS3Builder;

            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
            if let Some(ref region) = config.region {
                builder = builder.with_region(region);
            }
            if let Some(ref endpoint) = config.endpoint {
                builder = builder.with_endpoint(endpoint);
            }
            if let Some(ref key) = config.access_key_id {
                builder = builder.with_access_key_id(key);
            }
            if let Some(ref secret) = config.secret_access_key {
                builder = builder.with_secret_access_key(secret);
            }
            if config.force_path_style {
                builder = builder.with_virtual_hosted_style_request(false);
            }
            if config.allow_http {
                builder = builder.with_allow_http(true);
            }

            let store = builder.build().map_err(|e| {
                Error::storage(format!("failed to build S3 client for {}: {}", bucket, e))
            })?;
            Arc::new(store)
        }
    };

    Ok(Bucket::with_store(bucket, store))
}

/// Open the landing bucket.
pub fn open_raw_bucket(config: &ObjectStorageConfig) -> Result<Bucket> {
    let name = config
        .raw_bucket
        .as_deref()
        .ok_or_else(|| Error::config("storage.raw_bucket is required"))?;
    open_bucket(config, name)
}

/// Open the backup bucket.
pub fn open_backup_bucket(config: &ObjectStorageConfig) -> Result<Bucket> {
    let name = config
        .backup_bucket
        .as_deref()
        .ok_or_else(|| Error::config("storage.backup_bucket is required"))?;
    open_bucket(config, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_json_filters_and_sorts() {
        let bucket = Bucket::in_memory("raw");
        for key in [
            "otel/traces/b.json",
            "otel/traces/a.json",
            "otel/traces/a.json.tmp",
            "otel/logs/c.json",
        ] {
            bucket.put(key, Bytes::from_static(b"{}")).await.unwrap();
        }

        let keys = bucket.list_json("otel/traces/").await.unwrap();
        assert_eq!(keys, vec!["otel/traces/a.json", "otel/traces/b.json"]);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let bucket = Bucket::in_memory("backups");
        bucket.put("manifest.json", Bytes::from_static(b"1")).await.unwrap();
        bucket.put("manifest.json", Bytes::from_static(b"2")).await.unwrap();
        assert_eq!(bucket.read("manifest.json").await.unwrap(), Bytes::from_static(b"2"));
    }

    #[tokio::test]
    async fn test_read_missing_is_storage_error() {
        let bucket = Bucket::in_memory("raw");
        let err = bucket.read("missing.json").await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(bucket.check().await.is_ok());
    }

    #[test]
    fn test_open_requires_bucket_names() {
        let config = ObjectStorageConfig {
            backend: Backend::Memory,
            ..Default::default()
        };
        assert!(open_raw_bucket(&config).is_err());

        let config = ObjectStorageConfig {
            raw_bucket: Some("otel-raw".to_string()),
            ..config
        };
        assert_eq!(open_raw_bucket(&config).unwrap().name(), "otel-raw");
    }
}
