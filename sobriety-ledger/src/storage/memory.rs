//! In-memory record store

use super::{Batch, Collection, RecordStore, WriteOp};
use crate::Result;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

type Table = BTreeMap<String, Vec<u8>>;

/// Ordered maps behind one lock; a batch is applied under a single write guard.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<HashMap<Collection, Table>>,
}

impl MemoryStorage {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a collection
    pub fn count(&self, collection: Collection) -> usize {
        self.tables.read().get(&collection).map_or(0, |table| table.len())
    }
}

impl RecordStore for MemoryStorage {
    fn get_bytes(&self, collection: Collection, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .tables
            .read()
            .get(&collection)
            .and_then(|table| table.get(key).cloned()))
    }

    fn list_bytes(&self, collection: Collection) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .tables
            .read()
            .get(&collection)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    fn commit(&self, batch: Batch) -> Result<()> {
        let mut tables = self.tables.write();
        for op in batch.into_ops() {
            match op {
                WriteOp::Put {
                    collection,
                    key,
                    value,
                } => {
                    tables.entry(collection).or_default().insert(key, value);
                }
                WriteOp::Delete { collection, key } => {
                    if let Some(table) = tables.get_mut(&collection) {
                        table.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }
}
