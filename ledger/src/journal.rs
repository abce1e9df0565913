//! Ledger entry types.

use balance_common::{format_amount, AccountId, Amount, Timestamp, TransactionId};
use serde::{Deserialize, Serialize};

/// An immutable ledger entry, one per account touched by an applied mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Store-assigned identifier.
    pub id: TransactionId,
    /// Account the entry belongs to.
    pub account_id: AccountId,
    /// When the mutation was applied.
    pub created_at: Timestamp,
    /// Signed amount applied, negative for debits.
    pub delta: Amount,
    /// Account balance after `delta` was applied.
    pub remaining: Amount,
    /// Human-readable description.
    pub message: String,
}

/// A ledger entry that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub account_id: AccountId,
    pub created_at: Timestamp,
    pub delta: Amount,
    pub remaining: Amount,
    pub message: String,
}

impl NewTransaction {
    /// Entry for a single-account balance adjustment.
    pub fn adjustment(
        account_id: AccountId,
        created_at: Timestamp,
        delta: Amount,
        remaining: Amount,
    ) -> Self {
        Self {
            account_id,
            created_at,
            delta,
            remaining,
            message: format!(
                "Account [{}]: balance changed by [{}], [{}] remaining",
                account_id,
                format_amount(delta),
                format_amount(remaining)
            ),
        }
    }

    /// Entry for one leg of a transfer from `from` to `to`.
    ///
    /// `account_id` must be one of the two; the message names both so each
    /// leg identifies its counterparty.
    pub fn transfer_leg(
        account_id: AccountId,
        from: AccountId,
        to: AccountId,
        created_at: Timestamp,
        delta: Amount,
        remaining: Amount,
    ) -> Self {
        Self {
            account_id,
            created_at,
            delta,
            remaining,
            message: format!(
                "Transfer from account [{}] to account [{}]: balance changed by [{}], [{}] remaining",
                from,
                to,
                format_amount(delta),
                format_amount(remaining)
            ),
        }
    }

    /// Attach the store-assigned id.
    pub fn into_transaction(self, id: TransactionId) -> Transaction {
        Transaction {
            id,
            account_id: self.account_id,
            created_at: self.created_at,
            delta: self.delta,
            remaining: self.remaining,
            message: self.message,
        }
    }
}
