//! Record store backed by RocksDB
//!
//! # Column Families
//!
//! - `users` - User records (key: user id)
//! - `milestones` - Milestone catalogue (key: milestone id)
//! - `rewards` - Reward catalogue (key: reward id)
//! - `transactions` - Append-only transaction log (key: transaction id)

use super::{Batch, Collection, RecordStore, WriteOp};
use crate::{
    config::StorageConfig,
    error::{Error, Result},
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, IteratorMode, Options, WriteBatch, DB,
};
use std::sync::Arc;

/// Storage wrapper for RocksDB
pub struct RocksStorage {
    db: Arc<DB>,
}

impl std::fmt::Debug for RocksStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStorage")
            .field("path", &self.db.path())
            .finish()
    }
}

impl RocksStorage {
    /// Open or create database
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        let tuning = &config.rocksdb;
        db_opts.set_write_buffer_size(tuning.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(tuning.max_write_buffer_number);
        db_opts.set_target_file_size_base(tuning.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(tuning.max_background_jobs);
        db_opts.set_level_zero_file_num_compaction_trigger(
            tuning.level0_file_num_compaction_trigger,
        );
        db_opts.set_compaction_style(DBCompactionStyle::Level);

        if tuning.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = Collection::ALL
            .iter()
            .map(|collection| ColumnFamilyDescriptor::new(collection.name(), Self::cf_options(*collection)))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = ?path,
            column_families = Collection::ALL.len(),
            "Opened RocksDB record store"
        );

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options(collection: Collection) -> Options {
        let mut opts = Options::default();
        match collection {
            // Users are read on every operation, favour LZ4 speed
            Collection::Users => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
                let mut block_opts = rocksdb::BlockBasedOptions::default();
                block_opts.set_bloom_filter(10.0, false);
                opts.set_block_based_table_factory(&block_opts);
            }
            Collection::Milestones | Collection::Rewards => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
            }
            // Append-only log, compress hard
            Collection::Transactions => {
                opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
                opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
            }
        }
        opts
    }

    fn cf_handle(&self, collection: Collection) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(collection.name())
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", collection.name())))
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

impl RecordStore for RocksStorage {
    fn get_bytes(&self, collection: Collection, key: &str) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(collection)?;
        Ok(self.db.get_cf(cf, key.as_bytes())?)
    }

    fn list_bytes(&self, collection: Collection) -> Result<Vec<Vec<u8>>> {
        let cf = self.cf_handle(collection)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            values.push(value.to_vec());
        }
        Ok(values)
    }

    fn commit(&self, batch: Batch) -> Result<()> {
        let writes = batch.len();
        let mut write_batch = WriteBatch::default();
        for op in batch.into_ops() {
            match op {
                WriteOp::Put {
                    collection,
                    key,
                    value,
                } => {
                    let cf = self.cf_handle(collection)?;
                    write_batch.put_cf(cf, key.as_bytes(), &value);
                }
                WriteOp::Delete { collection, key } => {
                    let cf = self.cf_handle(collection)?;
                    write_batch.delete_cf(cf, key.as_bytes());
                }
            }
        }

        // Atomic commit
        self.db.write(write_batch)?;

        tracing::debug!(writes, "Batch committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RecordStoreExt;
    use crate::types::{EntityId, Reward, Role, User};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn test_config() -> (StorageConfig, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            data_dir: temp_dir.path().to_path_buf(),
            ..StorageConfig::default()
        };
        (config, temp_dir)
    }

    fn test_user() -> User {
        User {
            id: EntityId::from_uuid(Uuid::new_v4()),
            name: "Jordan".into(),
            sobriety_date: 1_700_000_000_000_000_000,
            tokens: 25,
            claimed_milestones: vec![],
            roles: [Role::User].into_iter().collect(),
        }
    }

    #[test]
    fn test_storage_open() {
        let (config, _temp) = test_config();
        let storage = RocksStorage::open(&config).unwrap();
        for collection in Collection::ALL {
            assert!(storage.db.cf_handle(collection.name()).is_some());
        }
    }

    #[test]
    fn test_insert_and_get_user() {
        let (config, _temp) = test_config();
        let storage = RocksStorage::open(&config).unwrap();

        let user = test_user();
        storage.insert(&user).unwrap();

        let retrieved: User = storage.get(&user.id).unwrap().unwrap();
        assert_eq!(retrieved, user);

        let absent = EntityId::from_uuid(Uuid::new_v4());
        assert!(storage.get::<User>(&absent).unwrap().is_none());
    }

    #[test]
    fn test_atomic_batch() {
        let (config, _temp) = test_config();
        let storage = RocksStorage::open(&config).unwrap();

        let mut user = test_user();
        let mut reward = Reward {
            id: EntityId::from_uuid(Uuid::new_v4()),
            token_cost: 10,
            description: "Coffee voucher".into(),
            availability: 3,
        };
        storage.insert(&user).unwrap();
        storage.insert(&reward).unwrap();

        user.tokens -= reward.token_cost;
        reward.availability -= 1;
        let mut batch = Batch::new();
        batch.put(&user).unwrap();
        batch.put(&reward).unwrap();
        storage.commit(batch).unwrap();

        assert_eq!(storage.get::<User>(&user.id).unwrap().unwrap().tokens, 15);
        assert_eq!(
            storage.get::<Reward>(&reward.id).unwrap().unwrap().availability,
            2
        );
    }

    #[test]
    fn test_list_and_delete() {
        let (config, _temp) = test_config();
        let storage = RocksStorage::open(&config).unwrap();

        let users: Vec<User> = (0..3).map(|_| test_user()).collect();
        for user in &users {
            storage.insert(user).unwrap();
        }
        assert_eq!(storage.list::<User>().unwrap().len(), 3);

        storage.delete::<User>(&users[0].id).unwrap();
        let remaining = storage.list::<User>().unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|u| u.id != users[0].id));
    }

    #[test]
    fn test_reopen_keeps_records() {
        let (config, _temp) = test_config();
        let user = test_user();
        {
            let storage = RocksStorage::open(&config).unwrap();
            storage.insert(&user).unwrap();
            storage.close().unwrap();
        }
        let storage = RocksStorage::open(&config).unwrap();
        assert_eq!(storage.get::<User>(&user.id).unwrap(), Some(user));
    }
}
