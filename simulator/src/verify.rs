//! Post-run invariant checks.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use thiserror::Error;

use balance_common::{AccountId, Amount, HistoryQuery, LedgerError};
use balance_ledger::{replay_history, HistoryViolation, LedgerEngine, LedgerStore};

/// A broken ledger invariant found after a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("account [{account}]: balance {actual} differs from expected {expected}")]
    BalanceMismatch {
        account: AccountId,
        expected: Amount,
        actual: Amount,
    },

    #[error("account [{account}]: negative balance {balance}")]
    NegativeBalance { account: AccountId, balance: Amount },

    #[error("account [{account}]: inconsistent history: {violation:?}")]
    History {
        account: AccountId,
        violation: HistoryViolation,
    },

    #[error("account [{account}]: history replays to {replayed}, balance is {balance}")]
    HistoryTotal {
        account: AccountId,
        replayed: Amount,
        balance: Amount,
    },
}

/// Check every account against its expected balance and its own history.
pub async fn verify_ledger<S: LedgerStore>(
    engine: &LedgerEngine<S>,
    expected: &BTreeMap<AccountId, Amount>,
) -> Result<Vec<Violation>, LedgerError> {
    let mut violations = Vec::new();

    for (&account, &want) in expected {
        let balance = engine.get_balance(account).await?.balance;
        if balance != want {
            violations.push(Violation::BalanceMismatch {
                account,
                expected: want,
                actual: balance,
            });
        }
        if balance < Decimal::ZERO {
            violations.push(Violation::NegativeBalance { account, balance });
        }

        let history = engine.get_history(&HistoryQuery::new(account)).await?;
        match replay_history(&history) {
            Ok(replayed) if replayed != balance => violations.push(Violation::HistoryTotal {
                account,
                replayed,
                balance,
            }),
            Ok(_) => {}
            Err(violation) => violations.push(Violation::History { account, violation }),
        }
    }

    Ok(violations)
}
