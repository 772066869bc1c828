//! Values returned by committed ledger operations

use serde::{Deserialize, Serialize};

use super::stake::StakeSession;
use crate::account::AccountId;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TickReport {
    /// Accounts that lost one second; also the reserve increase.
    pub decremented: u64,
    pub deactivated: u64,
    pub reserve_total: u64,
    pub at: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TransferReceipt {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: u64,
    pub from_balance: u64,
    pub to_balance: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SettleReceipt {
    pub session: StakeSession,
    /// Seconds returned to the account (zero on forfeit).
    pub credited: u64,
    pub balance: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DistributionReceipt {
    pub recipients: Vec<AccountId>,
    pub per_recipient: u64,
    pub total_distributed: u64,
    pub reserve_remaining: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReserveTransferReceipt {
    pub to: AccountId,
    pub amount: u64,
    pub to_balance: u64,
    pub reserve_remaining: u64,
}

/// How much of the reserve a distribution hands out.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistributionAmount {
    Full,
    Exact(u64),
}

/// Who receives a distribution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum Recipients {
    AllActive,
    Accounts(Vec<AccountId>),
}
