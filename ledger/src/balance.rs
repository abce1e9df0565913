//! Balance reconstruction from ledger history.

use balance_common::{Amount, TransactionId};
use rust_decimal::Decimal;

use crate::journal::Transaction;

/// A ledger entry that breaks the running-balance chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryViolation {
    /// `remaining` differs from the previous balance plus `delta`.
    BrokenChain {
        transaction_id: TransactionId,
        expected: Amount,
        recorded: Amount,
    },
    /// `remaining` is negative.
    NegativeBalance {
        transaction_id: TransactionId,
        remaining: Amount,
    },
}

/// Replay an account's entries, oldest first, and return the final balance.
///
/// Each entry must satisfy `remaining = previous remaining + delta`,
/// starting from zero, and no `remaining` may be negative.
pub fn replay_history<'a, I>(entries: I) -> Result<Amount, HistoryViolation>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut balance = Decimal::ZERO;
    for entry in entries {
        let expected = balance + entry.delta;
        if entry.remaining != expected {
            return Err(HistoryViolation::BrokenChain {
                transaction_id: entry.id,
                expected,
                recorded: entry.remaining,
            });
        }
        if entry.remaining < Decimal::ZERO {
            return Err(HistoryViolation::NegativeBalance {
                transaction_id: entry.id,
                remaining: entry.remaining,
            });
        }
        balance = entry.remaining;
    }
    Ok(balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::NewTransaction;
    use balance_common::{time, AccountId};

    fn entry(id: i64, delta: i64, remaining: i64) -> Transaction {
        NewTransaction::adjustment(
            AccountId::new(1),
            time::now(),
            Decimal::from(delta),
            Decimal::from(remaining),
        )
        .into_transaction(TransactionId::new(id))
    }

    #[test]
    fn test_replay_consistent_history() {
        let history = vec![entry(1, 100, 100), entry(2, -30, 70), entry(3, 5, 75)];
        assert_eq!(replay_history(&history), Ok(Decimal::from(75)));
    }

    #[test]
    fn test_replay_detects_broken_chain() {
        let history = vec![entry(1, 100, 100), entry(2, -30, 60)];
        assert_eq!(
            replay_history(&history),
            Err(HistoryViolation::BrokenChain {
                transaction_id: TransactionId::new(2),
                expected: Decimal::from(70),
                recorded: Decimal::from(60),
            })
        );
    }

    #[test]
    fn test_replay_detects_negative_balance() {
        let history = vec![entry(1, -10, -10)];
        assert!(matches!(
            replay_history(&history),
            Err(HistoryViolation::NegativeBalance { .. })
        ));
    }
}
