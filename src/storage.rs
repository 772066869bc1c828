use rocksdb::{
    Direction, IteratorMode, Options, Transaction, TransactionDB, TransactionDBOptions,
    TransactionOptions, WriteOptions,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::config::StorageConfig;
use crate::error::LedgerError;

pub struct Storage {
    db: Arc<TransactionDB>,
    lock_timeout_ms: i64,
}

/// One open read-check-write unit. Rows read through `get_for_update` stay
/// exclusively locked until the enclosing `Storage::transact` commits.
pub struct Txn<'db> {
    inner: Transaction<'db, TransactionDB>,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>, config: &StorageConfig) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| LedgerError::Storage(e.to_string()))?;
            }
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(config.lock_timeout_ms);
        txn_db_opts.set_default_lock_timeout(config.lock_timeout_ms);

        let db = TransactionDB::open(&opts, &txn_db_opts, path)?;
        Ok(Storage {
            db: Arc::new(db),
            lock_timeout_ms: config.lock_timeout_ms,
        })
    }

    /// Runs `f` inside a single transaction: commit on `Ok`, roll back on `Err`.
    pub fn transact<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&Txn<'_>) -> Result<T, LedgerError>,
    {
        let mut txn_opts = TransactionOptions::default();
        txn_opts.set_lock_timeout(self.lock_timeout_ms);
        txn_opts.set_deadlock_detect(true);

        let txn = Txn {
            inner: self.db.transaction_opt(&WriteOptions::default(), &txn_opts),
        };
        match f(&txn) {
            Ok(value) => {
                txn.inner.commit()?;
                Ok(value)
            }
            Err(e) => {
                txn.inner.rollback()?;
                Err(e)
            }
        }
    }

    // Committed read of a single key.
    pub fn get<T: for<'a> Deserialize<'a>>(&self, key: &str) -> Result<Option<T>, LedgerError> {
        match self.db.get(key.as_bytes())? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    /// All values under `prefix`, read from one snapshot so a multi-row
    /// query never straddles a commit.
    pub fn scan_prefix<T: for<'a> Deserialize<'a>>(&self, prefix: &str) -> Result<Vec<T>, LedgerError> {
        let snapshot = self.db.snapshot();
        let mut out = Vec::new();
        for item in snapshot.iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward)) {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            out.push(bincode::deserialize(&value)?);
        }
        Ok(out)
    }
}

impl<'db> Txn<'db> {
    /// Reads and exclusively locks `key`.
    pub fn get_for_update<T: for<'a> Deserialize<'a>>(&self, key: &str) -> Result<Option<T>, LedgerError> {
        match self.inner.get_for_update(key.as_bytes(), true)? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), LedgerError> {
        let serialized = bincode::serialize(value)?;
        self.inner.put(key.as_bytes(), serialized)?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<(), LedgerError> {
        self.inner.delete(key.as_bytes())?;
        Ok(())
    }

    /// Keys under `prefix` in ascending order. Does not lock them.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, LedgerError> {
        let mut keys = Vec::new();
        for item in self
            .inner
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let key = String::from_utf8(key.into_vec())
                .map_err(|e| LedgerError::Serialization(e.to_string()))?;
            keys.push(key);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("db"), &StorageConfig::default()).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_commit_and_read_back() {
        let (_dir, storage) = open_temp();
        storage
            .transact(|txn| {
                txn.put("k:1", &10u64)?;
                txn.put("k:2", &20u64)?;
                txn.put("other", &99u64)
            })
            .unwrap();

        assert_eq!(storage.get::<u64>("k:1").unwrap(), Some(10));
        assert_eq!(storage.scan_prefix::<u64>("k:").unwrap(), vec![10, 20]);
    }

    #[test]
    fn test_error_rolls_back() {
        let (_dir, storage) = open_temp();
        let res: Result<(), LedgerError> = storage.transact(|txn| {
            txn.put("k:1", &10u64)?;
            Err(LedgerError::InvalidAmount)
        });

        assert_eq!(res, Err(LedgerError::InvalidAmount));
        assert_eq!(storage.get::<u64>("k:1").unwrap(), None);
    }

    #[test]
    fn test_keys_with_prefix_sees_own_writes() {
        let (_dir, storage) = open_temp();
        let keys = storage
            .transact(|txn| {
                txn.put("k:b", &1u64)?;
                txn.put("k:a", &1u64)?;
                txn.keys_with_prefix("k:")
            })
            .unwrap();
        assert_eq!(keys, vec!["k:a".to_string(), "k:b".to_string()]);
    }
}
