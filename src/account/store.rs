//! Account rows: key layout, id allocation and transactional access

use super::types::{is_valid_name, Account, AccountId};
use crate::error::LedgerError;
use crate::storage::{Storage, Txn};

pub const ACCOUNT_PREFIX: &str = "account:";
const NAME_PREFIX: &str = "account_name:";
const NEXT_ID_KEY: &str = "meta:next_account_id";

pub fn account_key(id: AccountId) -> String {
    // zero padded so key order matches id order
    format!("{}{:020}", ACCOUNT_PREFIX, id)
}

fn name_key(name: &str) -> String {
    format!("{}{}", NAME_PREFIX, name)
}

/// Row-level access to accounts. Mutating helpers take an open `Txn`; only
/// the ledger engine opens transactions.
pub struct AccountStore;

impl AccountStore {
    /// Insert a new account row, assigning the next id.
    pub fn insert(
        txn: &Txn<'_>,
        name: &str,
        balance: u64,
        is_admin: bool,
        now: i64,
    ) -> Result<Account, LedgerError> {
        if !is_valid_name(name) {
            return Err(LedgerError::InvalidAccountName(name.to_string()));
        }
        if txn.get_for_update::<AccountId>(&name_key(name))?.is_some() {
            return Err(LedgerError::AccountNameTaken(name.to_string()));
        }

        let id = txn.get_for_update::<AccountId>(NEXT_ID_KEY)?.unwrap_or(1);
        let next = id.checked_add(1).ok_or(LedgerError::Overflow)?;
        txn.put(NEXT_ID_KEY, &next)?;

        let account = Account::new(id, name.to_string(), balance, is_admin, now);
        txn.put(&account_key(id), &account)?;
        txn.put(&name_key(name), &id)?;
        Ok(account)
    }

    /// Read and lock an account row.
    pub fn lock(txn: &Txn<'_>, id: AccountId) -> Result<Account, LedgerError> {
        txn.get_for_update(&account_key(id))?
            .ok_or(LedgerError::AccountNotFound(id))
    }

    /// Read and lock an account row that must be active.
    pub fn lock_active(txn: &Txn<'_>, id: AccountId) -> Result<Account, LedgerError> {
        let account = Self::lock(txn, id)?;
        if !account.active {
            return Err(LedgerError::AccountInactive(id));
        }
        Ok(account)
    }

    pub fn save(txn: &Txn<'_>, account: &Account) -> Result<(), LedgerError> {
        txn.put(&account_key(account.id), account)
    }

    /// Ids of every account row, ascending.
    pub fn ids(txn: &Txn<'_>) -> Result<Vec<AccountId>, LedgerError> {
        txn.keys_with_prefix(ACCOUNT_PREFIX)?
            .iter()
            .map(|key| {
                key[ACCOUNT_PREFIX.len()..]
                    .parse::<AccountId>()
                    .map_err(|e| LedgerError::Serialization(format!("bad account key {}: {}", key, e)))
            })
            .collect()
    }

    // --- Committed reads ---

    pub fn get(storage: &Storage, id: AccountId) -> Result<Option<Account>, LedgerError> {
        storage.get(&account_key(id))
    }

    pub fn get_by_name(storage: &Storage, name: &str) -> Result<Option<Account>, LedgerError> {
        match storage.get::<AccountId>(&name_key(name))? {
            Some(id) => Self::get(storage, id),
            None => Ok(None),
        }
    }

    /// Every account, in id order, from one snapshot.
    pub fn all(storage: &Storage) -> Result<Vec<Account>, LedgerError> {
        storage.scan_prefix(ACCOUNT_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    fn open_temp() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("db"), &StorageConfig::default()).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_create_account() {
        let (_dir, storage) = open_temp();
        let account = storage
            .transact(|txn| AccountStore::insert(txn, "alice", 100, false, 42))
            .unwrap();

        assert_eq!(account.id, 1);
        assert!(account.active);
        assert_eq!(AccountStore::get(&storage, 1).unwrap(), Some(account.clone()));
        assert_eq!(AccountStore::get_by_name(&storage, "alice").unwrap(), Some(account));
    }

    #[test]
    fn test_ids_are_sequential_and_names_unique() {
        let (_dir, storage) = open_temp();
        storage
            .transact(|txn| {
                AccountStore::insert(txn, "alice", 1, false, 0)?;
                AccountStore::insert(txn, "bob", 1, false, 0)
            })
            .unwrap();

        let dup = storage.transact(|txn| AccountStore::insert(txn, "alice", 1, false, 0));
        assert_eq!(dup, Err(LedgerError::AccountNameTaken("alice".into())));

        let bad = storage.transact(|txn| AccountStore::insert(txn, "Bad Name", 1, false, 0));
        assert_eq!(bad, Err(LedgerError::InvalidAccountName("Bad Name".into())));

        let carol = storage
            .transact(|txn| AccountStore::insert(txn, "carol", 1, false, 0))
            .unwrap();
        assert_eq!(carol.id, 3);

        let ids = storage.transact(|txn| AccountStore::ids(txn)).unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_lock_active_rejects_inactive() {
        let (_dir, storage) = open_temp();
        storage
            .transact(|txn| {
                let mut acc = AccountStore::insert(txn, "alice", 0, false, 0)?;
                acc.deactivate(5);
                AccountStore::save(txn, &acc)
            })
            .unwrap();

        let res = storage.transact(|txn| AccountStore::lock_active(txn, 1));
        assert_eq!(res, Err(LedgerError::AccountInactive(1)));
        let res = storage.transact(|txn| AccountStore::lock(txn, 9));
        assert_eq!(res, Err(LedgerError::AccountNotFound(9)));
    }
}
