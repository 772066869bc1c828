pub mod account;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod host;
pub mod ledger;
pub mod reserve;
pub mod scheduler;
pub mod session;
pub mod storage;

pub use error::{ErrorKind, LedgerError};
pub use ledger::LedgerEngine;
