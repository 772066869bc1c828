//! Checked second arithmetic on an account row

use super::types::Account;
use crate::error::LedgerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    InsufficientFunds { needed: u64, available: u64 },
    InvalidAmount,
    Overflow,
}

impl From<BalanceError> for LedgerError {
    fn from(err: BalanceError) -> Self {
        match err {
            BalanceError::InsufficientFunds { needed, available } => {
                LedgerError::InsufficientBalance { needed, available }
            }
            BalanceError::InvalidAmount => LedgerError::InvalidAmount,
            BalanceError::Overflow => LedgerError::Overflow,
        }
    }
}

impl Account {
    /// Credit (add) seconds. Zero is a no-op.
    pub fn credit(&mut self, amount: u64) -> Result<u64, BalanceError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(BalanceError::Overflow)?;
        Ok(self.balance)
    }

    /// Debit (subtract) seconds; never drives the balance below zero.
    pub fn debit(&mut self, amount: u64) -> Result<u64, BalanceError> {
        if amount == 0 {
            return Err(BalanceError::InvalidAmount);
        }
        if self.balance < amount {
            return Err(BalanceError::InsufficientFunds {
                needed: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        Ok(self.balance)
    }

    /// One tick's worth of decay. Returns true when a second was removed.
    pub fn decay_one(&mut self) -> bool {
        if self.active && self.balance > 0 {
            self.balance -= 1;
            true
        } else {
            false
        }
    }
}
