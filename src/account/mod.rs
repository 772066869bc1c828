//! Account model for the time ledger
//!
//! - `types`: the persisted account row
//! - `balance`: checked second arithmetic on a row
//! - `store`: key layout and transactional row access

pub mod types;
pub mod balance;
pub mod store;

pub use types::{Account, AccountId, LedgerStats};
pub use balance::BalanceError;
pub use store::AccountStore;
