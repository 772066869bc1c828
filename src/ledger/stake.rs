//! Persisted stake-session records

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::AccountId;
use crate::error::LedgerError;
use crate::storage::{Storage, Txn};

const SESSION_PREFIX: &str = "session:";
const ACTIVE_SESSION_PREFIX: &str = "active_session:";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Settled,
    Forfeited,
}

/// How a caller resolves an active session.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettleOutcome {
    Completed,
    Forfeited,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StakeSession {
    pub id: Uuid,
    pub principal: AccountId,
    /// Already debited from the account for as long as the session is active.
    pub staked_amount: u64,
    pub remaining_seconds: u64,
    pub state: SessionState,
    pub started_at: i64,
    pub settled_at: Option<i64>,
}

impl StakeSession {
    pub fn new(principal: AccountId, staked_amount: u64, now: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal,
            staked_amount,
            remaining_seconds: staked_amount,
            state: SessionState::Active,
            started_at: now,
            settled_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }
}

fn session_key(id: Uuid) -> String {
    format!("{}{}", SESSION_PREFIX, id)
}

fn active_key(principal: AccountId) -> String {
    format!("{}{:020}", ACTIVE_SESSION_PREFIX, principal)
}

pub struct SessionStore;

impl SessionStore {
    /// Lock the per-principal marker and return the active session id, if any.
    pub fn lock_active_marker(txn: &Txn<'_>, principal: AccountId) -> Result<Option<Uuid>, LedgerError> {
        txn.get_for_update(&active_key(principal))
    }

    pub fn lock(txn: &Txn<'_>, id: Uuid) -> Result<StakeSession, LedgerError> {
        txn.get_for_update(&session_key(id))?
            .ok_or(LedgerError::SessionNotFound(id))
    }

    pub fn open(txn: &Txn<'_>, session: &StakeSession) -> Result<(), LedgerError> {
        txn.put(&session_key(session.id), session)?;
        txn.put(&active_key(session.principal), &session.id)
    }

    pub fn close(txn: &Txn<'_>, session: &StakeSession) -> Result<(), LedgerError> {
        txn.put(&session_key(session.id), session)?;
        txn.delete(&active_key(session.principal))
    }

    /// Ids of sessions still marked active, from one snapshot.
    pub fn active_ids(storage: &Storage) -> Result<Vec<Uuid>, LedgerError> {
        storage.scan_prefix(ACTIVE_SESSION_PREFIX)
    }

    pub fn get(storage: &Storage, id: Uuid) -> Result<Option<StakeSession>, LedgerError> {
        storage.get(&session_key(id))
    }

    pub fn get_active(storage: &Storage, principal: AccountId) -> Result<Option<StakeSession>, LedgerError> {
        match storage.get::<Uuid>(&active_key(principal))? {
            Some(id) => Self::get(storage, id),
            None => Ok(None),
        }
    }
}
