//! Account type definitions

use serde::{Deserialize, Serialize};

/// Stable numeric identity, assigned at creation and never reused.
pub type AccountId = u64;

/// Longest accepted account name.
pub const MAX_NAME_LEN: usize = 32;

/// A principal holding a balance of seconds
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub name: String,

    /// Whole seconds, never negative.
    pub balance: u64,
    pub active: bool,
    pub is_admin: bool,

    pub created_at: i64,
    pub deactivated_at: Option<i64>,
}

impl Account {
    pub fn new(id: AccountId, name: String, balance: u64, is_admin: bool, now: i64) -> Self {
        Self {
            id,
            name,
            balance,
            active: true,
            is_admin,
            created_at: now,
            deactivated_at: None,
        }
    }

    /// Mark the account deactivated. The first deactivation timestamp wins.
    pub fn deactivate(&mut self, now: i64) {
        self.active = false;
        if self.deactivated_at.is_none() {
            self.deactivated_at = Some(now);
        }
    }
}

/// Lowercase ascii, digits, `_`, `-` and `.`; 1 to `MAX_NAME_LEN` chars.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.'))
}

/// Aggregate counters over every account
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub total_accounts: u64,
    pub active_accounts: u64,
    pub deactivated_accounts: u64,
    pub total_balance_seconds: u64,
    pub reserve_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_rules() {
        assert!(is_valid_name("alice"));
        assert!(is_valid_name("user_01.b-c"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Alice"));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name(&"a".repeat(MAX_NAME_LEN + 1)));
    }

    #[test]
    fn test_deactivate_keeps_first_timestamp() {
        let mut acc = Account::new(1, "alice".into(), 0, false, 100);
        acc.deactivate(200);
        acc.deactivate(300);
        assert!(!acc.active);
        assert_eq!(acc.deactivated_at, Some(200));
    }
}
