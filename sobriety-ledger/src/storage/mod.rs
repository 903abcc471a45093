//! Record store contract and adapters
//!
//! The ledger sees the store as four ordered maps from identifier to record:
//!
//! - `users` - `User` records (key: user id)
//! - `milestones` - `Milestone` records (key: milestone id)
//! - `rewards` - `Reward` records (key: reward id)
//! - `transactions` - append-only `Transaction` log (key: transaction id)
//!
//! Values are `bincode`-encoded. A missing key is absence, never an error.
//! Multi-record updates go through [`Batch`] and [`RecordStore::commit`] so
//! they become visible all at once or not at all.

mod memory;
mod rocks;

pub use memory::MemoryStorage;
pub use rocks::RocksStorage;

use crate::{
    types::{EntityId, Milestone, Reward, Transaction, User},
    Result,
};
use serde::{de::DeserializeOwned, Serialize};

/// Named record collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// User records
    Users,
    /// Milestone catalogue
    Milestones,
    /// Reward catalogue
    Rewards,
    /// Transaction log
    Transactions,
}

impl Collection {
    /// Every collection
    pub const ALL: [Collection; 4] = [
        Collection::Users,
        Collection::Milestones,
        Collection::Rewards,
        Collection::Transactions,
    ];

    /// Collection name (column family name for RocksDB)
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Milestones => "milestones",
            Collection::Rewards => "rewards",
            Collection::Transactions => "transactions",
        }
    }
}

/// A typed record living in one collection
pub trait Record: Serialize + DeserializeOwned {
    /// Collection holding this record type
    const COLLECTION: Collection;

    /// Entity name used in error messages
    const ENTITY: &'static str;

    /// Primary key
    fn id(&self) -> &EntityId;
}

impl Record for User {
    const COLLECTION: Collection = Collection::Users;
    const ENTITY: &'static str = "User";

    fn id(&self) -> &EntityId {
        &self.id
    }
}

impl Record for Milestone {
    const COLLECTION: Collection = Collection::Milestones;
    const ENTITY: &'static str = "Milestone";

    fn id(&self) -> &EntityId {
        &self.id
    }
}

impl Record for Reward {
    const COLLECTION: Collection = Collection::Rewards;
    const ENTITY: &'static str = "Reward";

    fn id(&self) -> &EntityId {
        &self.id
    }
}

impl Record for Transaction {
    const COLLECTION: Collection = Collection::Transactions;
    const ENTITY: &'static str = "Transaction";

    fn id(&self) -> &EntityId {
        &self.id
    }
}

/// One write inside a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert or overwrite
    Put {
        /// Target collection
        collection: Collection,
        /// Record key
        key: String,
        /// Encoded record
        value: Vec<u8>,
    },
    /// Remove if present
    Delete {
        /// Target collection
        collection: Collection,
        /// Record key
        key: String,
    },
}

/// Ordered set of writes committed atomically
#[derive(Debug, Clone, Default)]
pub struct Batch {
    ops: Vec<WriteOp>,
}

impl Batch {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an insert/overwrite of `record`
    pub fn put<R: Record>(&mut self, record: &R) -> Result<()> {
        let value = bincode::serialize(record)?;
        self.ops.push(WriteOp::Put {
            collection: R::COLLECTION,
            key: record.id().to_key(),
            value,
        });
        Ok(())
    }

    /// Queue a delete of the record with `id`
    pub fn delete<R: Record>(&mut self, id: &EntityId) {
        self.ops.push(WriteOp::Delete {
            collection: R::COLLECTION,
            key: id.to_key(),
        });
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Queued writes in order
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consume into the queued writes
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Byte-level store contract implemented by each backend
pub trait RecordStore: Send + Sync {
    /// Encoded record under `key`, if any
    fn get_bytes(&self, collection: Collection, key: &str) -> Result<Option<Vec<u8>>>;

    /// Every encoded record of a collection, in key order
    fn list_bytes(&self, collection: Collection) -> Result<Vec<Vec<u8>>>;

    /// Apply every write of `batch` atomically
    fn commit(&self, batch: Batch) -> Result<()>;
}

/// Typed `get`/`insert`/`delete`/`list` over any [`RecordStore`]
pub trait RecordStoreExt: RecordStore {
    /// Record with `id`, or `None` when absent
    fn get<R: Record>(&self, id: &EntityId) -> Result<Option<R>> {
        match self.get_bytes(R::COLLECTION, &id.to_key())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every record of the type, in key order
    fn list<R: Record>(&self) -> Result<Vec<R>> {
        self.list_bytes(R::COLLECTION)?
            .iter()
            .map(|bytes| bincode::deserialize(bytes).map_err(Into::into))
            .collect()
    }

    /// Insert or overwrite a single record
    fn insert<R: Record>(&self, record: &R) -> Result<()> {
        let mut batch = Batch::new();
        batch.put(record)?;
        self.commit(batch)
    }

    /// Delete a single record; deleting an absent key is a no-op
    fn delete<R: Record>(&self, id: &EntityId) -> Result<()> {
        let mut batch = Batch::new();
        batch.delete::<R>(id);
        self.commit(batch)
    }
}

impl<S: RecordStore + ?Sized> RecordStoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use uuid::Uuid;

    fn user(name: &str) -> User {
        User {
            id: EntityId::from_uuid(Uuid::new_v4()),
            name: name.to_string(),
            sobriety_date: 0,
            tokens: 0,
            claimed_milestones: vec![],
            roles: [Role::User].into_iter().collect(),
        }
    }

    #[test]
    fn test_batch_records_ops_in_order() {
        let a = user("a");
        let mut batch = Batch::new();
        batch.put(&a).unwrap();
        batch.delete::<User>(&a.id);
        assert_eq!(batch.len(), 2);
        assert!(matches!(batch.ops()[0], WriteOp::Put { collection: Collection::Users, .. }));
        assert!(matches!(batch.ops()[1], WriteOp::Delete { collection: Collection::Users, .. }));
    }

    #[test]
    fn test_typed_access_through_trait_object() {
        let store: Box<dyn RecordStore> = Box::new(MemoryStorage::new());
        let a = user("a");
        store.insert(&a).unwrap();
        assert_eq!(store.get::<User>(&a.id).unwrap(), Some(a.clone()));
        assert_eq!(store.list::<User>().unwrap().len(), 1);

        store.delete::<User>(&a.id).unwrap();
        assert_eq!(store.get::<User>(&a.id).unwrap(), None);
        // Deleting twice is fine
        store.delete::<User>(&a.id).unwrap();
    }
}
