//! Singleton pool of seconds collected by ticks.
//!
//! The row is created on first access with a zero total; nothing needs to
//! initialize it up front.

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::storage::{Storage, Txn};

const RESERVE_KEY: &str = "reserve";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Reserve {
    pub total_seconds: u64,
}

pub struct ReserveStore;

impl ReserveStore {
    /// Read and lock the reserve row. Lock it before any account row.
    pub fn lock(txn: &Txn<'_>) -> Result<Reserve, LedgerError> {
        Ok(txn.get_for_update(RESERVE_KEY)?.unwrap_or_default())
    }

    pub fn save(txn: &Txn<'_>, reserve: &Reserve) -> Result<(), LedgerError> {
        txn.put(RESERVE_KEY, reserve)
    }

    pub fn get(storage: &Storage) -> Result<Reserve, LedgerError> {
        Ok(storage.get(RESERVE_KEY)?.unwrap_or_default())
    }
}

impl Reserve {
    pub fn deposit(&mut self, seconds: u64) -> Result<u64, LedgerError> {
        self.total_seconds = self
            .total_seconds
            .checked_add(seconds)
            .ok_or(LedgerError::Overflow)?;
        Ok(self.total_seconds)
    }

    pub fn withdraw(&mut self, seconds: u64) -> Result<u64, LedgerError> {
        if seconds > self.total_seconds {
            return Err(LedgerError::InsufficientReserve {
                requested: seconds,
                available: self.total_seconds,
            });
        }
        self.total_seconds -= seconds;
        Ok(self.total_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    #[test]
    fn test_lazy_creation() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("db"), &StorageConfig::default()).unwrap();

        assert_eq!(ReserveStore::get(&storage).unwrap().total_seconds, 0);

        storage
            .transact(|txn| {
                let mut reserve = ReserveStore::lock(txn)?;
                reserve.deposit(7)?;
                ReserveStore::save(txn, &reserve)
            })
            .unwrap();
        assert_eq!(ReserveStore::get(&storage).unwrap().total_seconds, 7);
    }

    #[test]
    fn test_withdraw_bounds() {
        let mut reserve = Reserve { total_seconds: 10 };
        assert_eq!(
            reserve.withdraw(11),
            Err(LedgerError::InsufficientReserve { requested: 11, available: 10 })
        );
        assert_eq!(reserve.withdraw(10).unwrap(), 0);
    }
}
