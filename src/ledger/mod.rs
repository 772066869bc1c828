//! The ledger engine: every state mutation of accounts, the reserve and stake
//! sessions goes through one of the operations here, each inside a single
//! storage transaction.
//!
//! Row locks are always taken in the same order to keep transactions from
//! deadlocking each other: session row, active-session marker, reserve,
//! then account rows by ascending id.

pub mod receipts;
pub mod stake;


use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::account::{Account, AccountId, AccountStore, LedgerStats};
use crate::clock::Clock;
use crate::config::{ForfeitPolicy, LedgerConfig, SessionConfig};
use crate::error::LedgerError;
use crate::reserve::ReserveStore;
use crate::storage::Storage;

pub use receipts::{
    DistributionAmount, DistributionReceipt, Recipients, ReserveTransferReceipt, SettleReceipt,
    TickReport, TransferReceipt,
};
pub use stake::{SessionState, SessionStore, SettleOutcome, StakeSession};

pub struct LedgerEngine {
    storage: Storage,
    clock: Arc<dyn Clock>,
    sessions: SessionConfig,
}

impl LedgerEngine {
    pub fn new(storage: Storage, clock: Arc<dyn Clock>, sessions: SessionConfig) -> Self {
        Self {
            storage,
            clock,
            sessions,
        }
    }

    /// Open the store named in `config.storage`.
    pub fn open(config: &LedgerConfig, clock: Arc<dyn Clock>) -> Result<Self, LedgerError> {
        Self::open_at(&config.storage.db_path, config, clock)
    }

    pub fn open_at(
        path: impl AsRef<Path>,
        config: &LedgerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LedgerError> {
        let storage = Storage::open(path, &config.storage)?;
        Ok(Self::new(storage, clock, config.sessions.clone()))
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.sessions
    }

    pub fn create_account(
        &self,
        name: &str,
        initial_seconds: u64,
        is_admin: bool,
    ) -> Result<Account, LedgerError> {
        let now = self.clock.unix_now();
        let account = self
            .storage
            .transact(|txn| AccountStore::insert(txn, name, initial_seconds, is_admin, now))?;
        info!(id = account.id, name, initial_seconds, is_admin, "Account created");
        Ok(account)
    }

    /// Remove one second from every active account with a positive balance,
    /// move the collected seconds into the reserve, then deactivate every
    /// active account left at zero.
    pub fn tick(&self) -> Result<TickReport, LedgerError> {
        let now = self.clock.unix_now();
        let report = self.storage.transact(|txn| {
            let mut reserve = ReserveStore::lock(txn)?;
            let mut decremented = 0u64;
            let mut deactivated = 0u64;

            for id in AccountStore::ids(txn)? {
                let mut account = AccountStore::lock(txn, id)?;
                if !account.active {
                    continue;
                }
                let decayed = account.decay_one();
                if decayed {
                    decremented += 1;
                }
                if account.balance == 0 {
                    account.deactivate(now);
                    deactivated += 1;
                }
                if decayed || !account.active {
                    AccountStore::save(txn, &account)?;
                }
            }

            let reserve_total = reserve.deposit(decremented)?;
            ReserveStore::save(txn, &reserve)?;
            Ok(TickReport {
                decremented,
                deactivated,
                reserve_total,
                at: now,
            })
        })?;

        debug!(
            decremented = report.decremented,
            deactivated = report.deactivated,
            reserve = report.reserve_total,
            "Tick committed"
        );
        Ok(report)
    }

    pub fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: u64,
    ) -> Result<TransferReceipt, LedgerError> {
        let receipt = self.storage.transact(|txn| {
            if from == to {
                return Err(LedgerError::SelfTransfer);
            }
            if amount == 0 {
                return Err(LedgerError::InvalidAmount);
            }

            let (mut sender, mut recipient) = if from < to {
                let s = AccountStore::lock(txn, from)?;
                (s, AccountStore::lock(txn, to)?)
            } else {
                let r = AccountStore::lock(txn, to)?;
                (AccountStore::lock(txn, from)?, r)
            };
            if !sender.active {
                return Err(LedgerError::AccountInactive(from));
            }
            if !recipient.active {
                return Err(LedgerError::AccountInactive(to));
            }

            let from_balance = sender.debit(amount)?;
            let to_balance = recipient.credit(amount)?;
            AccountStore::save(txn, &sender)?;
            AccountStore::save(txn, &recipient)?;

            Ok(TransferReceipt {
                from,
                to,
                amount,
                from_balance,
                to_balance,
            })
        })?;

        info!(from, to, amount, "Transfer committed");
        Ok(receipt)
    }

    /// Debit `amount` from `principal` and open a stake session for it.
    pub fn stake(&self, principal: AccountId, amount: u64) -> Result<StakeSession, LedgerError> {
        let now = self.clock.unix_now();
        let minimum = self.sessions.min_stake_seconds;
        let session = self.storage.transact(|txn| {
            if amount == 0 {
                return Err(LedgerError::InvalidAmount);
            }
            if amount < minimum {
                return Err(LedgerError::BelowMinimumStake {
                    minimum,
                    requested: amount,
                });
            }
            if SessionStore::lock_active_marker(txn, principal)?.is_some() {
                return Err(LedgerError::ActiveSessionExists(principal));
            }

            let mut account = AccountStore::lock_active(txn, principal)?;
            account.debit(amount)?;
            AccountStore::save(txn, &account)?;

            let session = StakeSession::new(principal, amount, now);
            SessionStore::open(txn, &session)?;
            Ok(session)
        })?;

        info!(session = %session.id, principal, amount, "Stake opened");
        Ok(session)
    }

    /// Resolve an active session. A closed session can never be settled again.
    pub fn settle(&self, id: Uuid, outcome: SettleOutcome) -> Result<SettleReceipt, LedgerError> {
        let now = self.clock.unix_now();
        let policy = self.sessions.forfeit_policy;
        let receipt = self.storage.transact(|txn| {
            let mut session = SessionStore::lock(txn, id)?;
            if !session.is_active() {
                return Err(LedgerError::SessionAlreadySettled(id));
            }
            SessionStore::lock_active_marker(txn, session.principal)?;

            let credited = match outcome {
                SettleOutcome::Completed => {
                    session.state = SessionState::Settled;
                    session.remaining_seconds = 0;
                    session
                        .staked_amount
                        .checked_mul(2)
                        .ok_or(LedgerError::Overflow)?
                }
                SettleOutcome::Forfeited => {
                    session.state = SessionState::Forfeited;
                    if policy == ForfeitPolicy::Reserve {
                        let mut reserve = ReserveStore::lock(txn)?;
                        reserve.deposit(session.staked_amount)?;
                        ReserveStore::save(txn, &reserve)?;
                    }
                    0
                }
            };

            let mut account = AccountStore::lock(txn, session.principal)?;
            if credited > 0 {
                account.credit(credited)?;
                AccountStore::save(txn, &account)?;
            }

            session.settled_at = Some(now);
            SessionStore::close(txn, &session)?;
            Ok(SettleReceipt {
                session,
                credited,
                balance: account.balance,
            })
        })?;

        info!(
            session = %id,
            principal = receipt.session.principal,
            state = ?receipt.session.state,
            credited = receipt.credited,
            "Stake settled"
        );
        Ok(receipt)
    }

    /// Forfeit every session the store still records as active. Run at
    /// startup: their countdowns died with the previous process.
    pub fn forfeit_orphaned_sessions(&self) -> Result<Vec<SettleReceipt>, LedgerError> {
        let mut settled = Vec::new();
        for id in SessionStore::active_ids(&self.storage)? {
            match self.settle(id, SettleOutcome::Forfeited) {
                Ok(receipt) => settled.push(receipt),
                Err(LedgerError::SessionAlreadySettled(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if !settled.is_empty() {
            warn!(count = settled.len(), "Forfeited orphaned stake sessions");
        }
        Ok(settled)
    }

    /// Admin-only: hand reserve seconds out evenly. The rounding remainder
    /// stays in the reserve.
    pub fn distribute_reserve(
        &self,
        admin: AccountId,
        amount: DistributionAmount,
        recipients: Recipients,
    ) -> Result<DistributionReceipt, LedgerError> {
        self.require_admin(admin)?;
        if let Recipients::Accounts(ids) = &recipients {
            if ids.is_empty() {
                return Err(LedgerError::NoRecipients);
            }
        }
        if amount == DistributionAmount::Exact(0) {
            return Err(LedgerError::InvalidAmount);
        }

        let receipt = self.storage.transact(|txn| {
            let mut reserve = ReserveStore::lock(txn)?;

            let mut targets = match &recipients {
                Recipients::AllActive => {
                    let mut active = Vec::new();
                    for id in AccountStore::ids(txn)? {
                        let account = AccountStore::lock(txn, id)?;
                        if account.active {
                            active.push(account);
                        }
                    }
                    active
                }
                Recipients::Accounts(ids) => {
                    let mut ids = ids.clone();
                    ids.sort_unstable();
                    ids.dedup();
                    ids.into_iter()
                        .map(|id| AccountStore::lock_active(txn, id))
                        .collect::<Result<Vec<_>, _>>()?
                }
            };
            if targets.is_empty() {
                return Err(LedgerError::NoRecipients);
            }

            let count = targets.len() as u64;
            let requested = match amount {
                DistributionAmount::Full => reserve.total_seconds,
                DistributionAmount::Exact(n) => {
                    if n > reserve.total_seconds {
                        return Err(LedgerError::InsufficientReserve {
                            requested: n,
                            available: reserve.total_seconds,
                        });
                    }
                    n
                }
            };
            let per_recipient = requested / count;
            if per_recipient == 0 {
                return match amount {
                    DistributionAmount::Full => Err(LedgerError::InsufficientReserve {
                        requested: count,
                        available: reserve.total_seconds,
                    }),
                    DistributionAmount::Exact(_) => Err(LedgerError::InvalidAmount),
                };
            }

            let total_distributed = per_recipient * count;
            let reserve_remaining = reserve.withdraw(total_distributed)?;
            for account in targets.iter_mut() {
                account.credit(per_recipient)?;
                AccountStore::save(txn, account)?;
            }
            ReserveStore::save(txn, &reserve)?;

            Ok(DistributionReceipt {
                recipients: targets.iter().map(|a| a.id).collect(),
                per_recipient,
                total_distributed,
                reserve_remaining,
            })
        })?;

        info!(
            admin,
            recipients = receipt.recipients.len(),
            per_recipient = receipt.per_recipient,
            remaining = receipt.reserve_remaining,
            "Reserve distributed"
        );
        Ok(receipt)
    }

    /// Admin-only: move an exact amount from the reserve to one account.
    pub fn transfer_from_reserve(
        &self,
        admin: AccountId,
        to: AccountId,
        amount: u64,
    ) -> Result<ReserveTransferReceipt, LedgerError> {
        self.require_admin(admin)?;
        let receipt = self.storage.transact(|txn| {
            if amount == 0 {
                return Err(LedgerError::InvalidAmount);
            }
            let mut reserve = ReserveStore::lock(txn)?;
            let reserve_remaining = reserve.withdraw(amount)?;
            let mut account = AccountStore::lock_active(txn, to)?;
            let to_balance = account.credit(amount)?;
            AccountStore::save(txn, &account)?;
            ReserveStore::save(txn, &reserve)?;
            Ok(ReserveTransferReceipt {
                to,
                amount,
                to_balance,
                reserve_remaining,
            })
        })?;

        info!(admin, to, amount, "Reserve transfer committed");
        Ok(receipt)
    }

    // The admin flag never changes after creation, so a committed read is enough.
    fn require_admin(&self, admin: AccountId) -> Result<(), LedgerError> {
        let account = self.account(admin)?;
        if !account.is_admin {
            return Err(LedgerError::NotAdmin(admin));
        }
        Ok(())
    }

    // --- Read queries ---

    pub fn account(&self, id: AccountId) -> Result<Account, LedgerError> {
        AccountStore::get(&self.storage, id)?.ok_or(LedgerError::AccountNotFound(id))
    }

    pub fn account_by_name(&self, name: &str) -> Result<Account, LedgerError> {
        AccountStore::get_by_name(&self.storage, name)?
            .ok_or_else(|| LedgerError::AccountNameNotFound(name.to_string()))
    }

    pub fn balance(&self, id: AccountId) -> Result<u64, LedgerError> {
        Ok(self.account(id)?.balance)
    }

    /// Every account ordered by name.
    pub fn accounts(&self) -> Result<Vec<Account>, LedgerError> {
        let mut all = AccountStore::all(&self.storage)?;
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    /// Top `limit` accounts by balance, ties broken by name.
    pub fn leaderboard(&self, limit: usize) -> Result<Vec<Account>, LedgerError> {
        let mut all = AccountStore::all(&self.storage)?;
        all.sort_by(|a, b| b.balance.cmp(&a.balance).then_with(|| a.name.cmp(&b.name)));
        all.truncate(limit);
        Ok(all)
    }

    pub fn reserve_total(&self) -> Result<u64, LedgerError> {
        Ok(ReserveStore::get(&self.storage)?.total_seconds)
    }

    pub fn statistics(&self) -> Result<LedgerStats, LedgerError> {
        let mut stats = LedgerStats::default();
        for account in AccountStore::all(&self.storage)? {
            stats.total_accounts += 1;
            if account.active {
                stats.active_accounts += 1;
            } else {
                stats.deactivated_accounts += 1;
            }
            stats.total_balance_seconds = stats.total_balance_seconds.saturating_add(account.balance);
        }
        stats.reserve_seconds = self.reserve_total()?;
        Ok(stats)
    }

    pub fn session(&self, id: Uuid) -> Result<StakeSession, LedgerError> {
        SessionStore::get(&self.storage, id)?.ok_or(LedgerError::SessionNotFound(id))
    }

    pub fn active_session(&self, principal: AccountId) -> Result<Option<StakeSession>, LedgerError> {
        SessionStore::get_active(&self.storage, principal)
    }
}
