//! Account definitions for the ledger.

use balance_common::{AccountId, Amount};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A ledger account.
///
/// Accounts come into existence on their first credit and are never
/// deleted. The balance is never negative once committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Caller-supplied account identifier.
    pub id: AccountId,
    /// Current balance.
    pub balance: Amount,
}

impl Account {
    /// Create an account with the given balance.
    pub fn new(id: AccountId, balance: Amount) -> Self {
        Self { id, balance }
    }

    /// The zero-balance account reported for ids with no stored row.
    pub fn empty(id: AccountId) -> Self {
        Self {
            id,
            balance: Decimal::ZERO,
        }
    }
}
