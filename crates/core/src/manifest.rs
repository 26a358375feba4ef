//! Backup manifest document.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;

/// Object key of the manifest inside the backup bucket.
pub const MANIFEST_KEY: &str = "manifest.json";

/// Summary of backup coverage, rebuilt from the partition ledger every cycle.
///
/// Serializes as `{"services": [...], "tables": {"<table>": [...]}}` with
/// every list sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub services: BTreeSet<String>,
    pub tables: BTreeMap<String, BTreeSet<String>>,
}

impl BackupManifest {
    pub fn new(services: impl IntoIterator<Item = String>) -> Self {
        Self {
            services: services.into_iter().collect(),
            tables: BTreeMap::new(),
        }
    }

    /// Set the backed-up partitions of one table. Tables with no partitions
    /// still appear, with an empty list.
    pub fn set_table(&mut self, table: impl Into<String>, partitions: BTreeSet<String>) {
        self.tables.insert(table.into(), partitions);
    }

    pub fn partition_count(&self) -> usize {
        self.tables.values().map(BTreeSet::len).sum()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}
