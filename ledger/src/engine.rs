//! Core ledger engine implementation.

use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use balance_common::{time, AccountId, Amount, HistoryQuery, LedgerError, Result};

use crate::account::Account;
use crate::config::LedgerConfig;
use crate::journal::{NewTransaction, Transaction};
use crate::store::{LedgerStore, StoreTransaction, UpdateOutcome};

/// The ledger engine applies balance mutations and answers history queries.
///
/// It keeps no mutable state of its own. All coordination between
/// concurrent callers happens in the store: each mutation is one store
/// transaction, and accounts are serialized by their row locks.
///
/// Inputs are trusted. Callers validate ids (positive, distinct for
/// transfers) and amounts (non-zero for adjustments, positive for
/// transfers) before calling in.
pub struct LedgerEngine<S> {
    store: S,
    config: LedgerConfig,
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Create a new ledger engine.
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Get an account. Unknown accounts have a zero balance.
    #[instrument(skip(self), fields(account = %id))]
    pub async fn get_balance(&self, id: AccountId) -> Result<Account> {
        let account = self.store.find_account(id).await.map_err(log_failure)?;
        Ok(account.unwrap_or_else(|| Account::empty(id)))
    }

    /// Credit (`delta > 0`) or debit (`delta < 0`) one account.
    ///
    /// A credit to an unknown account creates it. A debit that would take
    /// the balance below zero, or that targets an unknown account, fails
    /// with [`LedgerError::InsufficientFunds`]. On success exactly one
    /// ledger entry is written, atomically with the balance change.
    #[instrument(skip(self), fields(account = %id, delta = %delta))]
    pub async fn adjust_balance(&self, id: AccountId, delta: Amount) -> Result<Transaction> {
        let mut tx = self.store.begin().await.map_err(log_failure)?;

        let transaction = match apply_adjustment(&mut tx, id, delta).await {
            Ok(transaction) => transaction,
            Err(err) => return Err(abort(tx, err).await),
        };

        tx.commit().await.map_err(log_failure)?;

        info!(
            transaction_id = %transaction.id,
            remaining = %transaction.remaining,
            "Balance adjusted"
        );

        Ok(transaction)
    }

    /// Move `amount` from `from` to `to`.
    ///
    /// Both legs and both ledger entries commit together or not at all.
    /// The source must already hold `amount`; the destination is created
    /// if unknown. Returns the debit leg's entry.
    ///
    /// Row locks are taken in ascending account id order no matter which
    /// side is debited, so concurrent transfers between the same pair in
    /// opposite directions queue behind one another instead of deadlocking.
    #[instrument(skip(self), fields(from = %from, to = %to, amount = %amount))]
    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<Transaction> {
        let mut tx = self.store.begin().await.map_err(log_failure)?;

        let (debit, credit) = match apply_transfer(&mut tx, from, to, amount).await {
            Ok(legs) => legs,
            Err(err) => return Err(abort(tx, err).await),
        };

        tx.commit().await.map_err(log_failure)?;

        info!(
            debit_id = %debit.id,
            credit_id = %credit.id,
            from_remaining = %debit.remaining,
            to_remaining = %credit.remaining,
            "Transfer committed"
        );

        Ok(debit)
    }

    /// List an account's ledger entries.
    ///
    /// An account with no entries, known or not, yields an empty list.
    #[instrument(
        skip(self, query),
        fields(
            account = %query.account_id,
            sort = %query.sort,
            order = %query.order
        )
    )]
    pub async fn get_history(&self, query: &HistoryQuery) -> Result<Vec<Transaction>> {
        self.store
            .history(query, self.config.page_size)
            .await
            .map_err(log_failure)
    }
}

/// Steps of a single-account adjustment, inside an open unit.
async fn apply_adjustment<T: StoreTransaction>(
    tx: &mut T,
    id: AccountId,
    delta: Amount,
) -> Result<Transaction> {
    let account = mutate_balance(tx, id, delta).await?;
    let entry = NewTransaction::adjustment(id, time::now(), delta, account.balance);
    tx.insert_transaction(entry).await
}

/// Steps of a transfer, inside an open unit. Returns (debit, credit).
async fn apply_transfer<T: StoreTransaction>(
    tx: &mut T,
    from: AccountId,
    to: AccountId,
    amount: Amount,
) -> Result<(Transaction, Transaction)> {
    let (first, second) = if from < to { (from, to) } else { (to, from) };
    tx.lock_account(first).await?;
    tx.lock_account(second).await?;

    let source = mutate_balance(tx, from, -amount).await?;
    let target = mutate_balance(tx, to, amount).await?;

    let created_at = time::now();
    let debit = tx
        .insert_transaction(NewTransaction::transfer_leg(
            from,
            from,
            to,
            created_at,
            -amount,
            source.balance,
        ))
        .await?;
    let credit = tx
        .insert_transaction(NewTransaction::transfer_leg(
            to,
            from,
            to,
            created_at,
            amount,
            target.balance,
        ))
        .await?;

    Ok((debit, credit))
}

/// Apply `delta` to `id` and return the account as it now stands.
///
/// Unknown accounts are created by non-negative deltas and refuse negative
/// ones. If another unit creates the account between our failed update and
/// our insert, the update is applied again against the row it created.
async fn mutate_balance<T: StoreTransaction>(
    tx: &mut T,
    id: AccountId,
    delta: Amount,
) -> Result<Account> {
    let balance = match tx.apply_delta(id, delta).await? {
        UpdateOutcome::Updated(balance) => balance,
        UpdateOutcome::ConstraintViolated => {
            return Err(LedgerError::InsufficientFunds { account_id: id })
        }
        UpdateOutcome::NotFound if delta < Decimal::ZERO => {
            return Err(LedgerError::InsufficientFunds { account_id: id })
        }
        UpdateOutcome::NotFound => {
            if tx.create_account(id, delta).await? {
                delta
            } else {
                match tx.apply_delta(id, delta).await? {
                    UpdateOutcome::Updated(balance) => balance,
                    UpdateOutcome::ConstraintViolated => {
                        return Err(LedgerError::InsufficientFunds { account_id: id })
                    }
                    UpdateOutcome::NotFound => {
                        return Err(LedgerError::storage(format!(
                            "account [{id}] reported existing but could not be updated"
                        )))
                    }
                }
            }
        }
    };

    Ok(Account::new(id, balance))
}

/// Roll back a failed unit and hand back the error that failed it.
async fn abort<T: StoreTransaction>(tx: T, err: LedgerError) -> LedgerError {
    if let Err(rollback_err) = tx.rollback().await {
        error!(error = %rollback_err, "Rollback failed");
    }
    log_failure(err)
}

fn log_failure(err: LedgerError) -> LedgerError {
    match &err {
        LedgerError::InsufficientFunds { account_id } => {
            warn!(account = %account_id, code = err.error_code(), "Insufficient funds")
        }
        LedgerError::Storage(message) => {
            error!(error = %message, code = err.error_code(), "Ledger storage failure")
        }
    }
    err
}
