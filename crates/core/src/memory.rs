//! In-memory watermark ledger.
//!
//! Keeps every appended record, like the ClickHouse ledger before a merge,
//! and resolves reads to the newest record per key by append order. Used by
//! tests and local dry runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::Result;
use crate::signal::Signal;
use crate::watermark::{
    Cursor, CursorStore, FileLedger, FileRecord, PartitionLedger, PartitionRecord,
};

#[derive(Default)]
struct Log {
    files: Vec<(Signal, FileRecord)>,
    partitions: Vec<PartitionRecord>,
    cursors: Vec<Cursor>,
}

/// Append-only ledger held in memory.
#[derive(Default)]
pub struct InMemoryLedger {
    log: Mutex<Log>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total file records ever appended for a signal, duplicates included.
    pub fn file_record_count(&self, signal: Signal) -> usize {
        self.log
            .lock()
            .files
            .iter()
            .filter(|(s, _)| *s == signal)
            .count()
    }

    /// Total partition records ever appended, duplicates included.
    pub fn partition_record_count(&self) -> usize {
        self.log.lock().partitions.len()
    }

    /// Every cursor value ever stored, oldest first.
    pub fn cursor_history(&self, key: &str) -> Vec<Cursor> {
        self.log
            .lock()
            .cursors
            .iter()
            .filter(|c| c.key == key)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl FileLedger for InMemoryLedger {
    async fn latest_file(&self, signal: Signal, filename: &str) -> Result<Option<FileRecord>> {
        Ok(self
            .log
            .lock()
            .files
            .iter()
            .rev()
            .find(|(s, r)| *s == signal && r.filename == filename)
            .map(|(_, r)| r.clone()))
    }

    async fn latest_files(&self, signal: Signal) -> Result<HashMap<String, FileRecord>> {
        let mut latest = HashMap::new();
        // Later appends overwrite earlier ones.
        for (s, record) in self.log.lock().files.iter() {
            if *s == signal {
                latest.insert(record.filename.clone(), record.clone());
            }
        }
        Ok(latest)
    }

    async fn record_file(&self, signal: Signal, record: &FileRecord) -> Result<()> {
        self.log.lock().files.push((signal, record.clone()));
        Ok(())
    }
}

#[async_trait]
impl PartitionLedger for InMemoryLedger {
    async fn latest_partitions(&self, table: &str) -> Result<HashMap<String, PartitionRecord>> {
        let mut latest = HashMap::new();
        for record in self.log.lock().partitions.iter() {
            if record.table_name == table {
                latest.insert(record.partition_id.clone(), record.clone());
            }
        }
        Ok(latest)
    }

    async fn record_partition(&self, record: &PartitionRecord) -> Result<()> {
        self.log.lock().partitions.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl CursorStore for InMemoryLedger {
    async fn load_cursor(&self, key: &str) -> Result<Option<Cursor>> {
        Ok(self
            .log
            .lock()
            .cursors
            .iter()
            .rev()
            .find(|c| c.key == key)
            .cloned())
    }

    async fn store_cursor(&self, cursor: &Cursor) -> Result<()> {
        self.log.lock().cursors.push(cursor.clone());
        Ok(())
    }
}
