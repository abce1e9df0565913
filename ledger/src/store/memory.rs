//! In-memory store adapter.
//!
//! Mirrors the PostgreSQL adapter's semantics without a database:
//! per-account row locks held for the life of a unit, writes staged
//! privately and published in one step at commit, and store-assigned
//! monotonically increasing transaction ids.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use balance_common::{
    AccountId, Amount, HistoryQuery, LedgerError, Result, SortKey, SortOrder, TransactionId,
};

use super::{LedgerStore, StoreTransaction, UpdateOutcome, NON_NEGATIVE_BALANCE};
use crate::account::Account;
use crate::journal::{NewTransaction, Transaction};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Amount>,
    transactions: Vec<Transaction>,
}

#[derive(Debug, Default)]
struct Shared {
    /// Committed data. Never held across an await point.
    state: RwLock<MemoryState>,
    /// Row locks keyed by account id, also covering ids with no row yet.
    row_locks: DashMap<AccountId, Arc<Mutex<()>>>,
    next_transaction_id: AtomicI64,
    fail_inserts: AtomicBool,
}

/// Store adapter keeping everything in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    shared: Arc<Shared>,
}

impl MemoryLedgerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every ledger entry insert fail with a storage error until reset.
    /// Used to exercise rollback after balances were already touched.
    pub fn fail_transaction_inserts(&self, fail: bool) {
        self.shared.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Number of committed ledger entries across all accounts.
    pub fn transaction_count(&self) -> usize {
        self.shared.state.read().transactions.len()
    }

    /// Number of row lock entries currently tracked.
    pub fn row_lock_count(&self) -> usize {
        self.shared.row_locks.len()
    }

    /// All committed accounts, ordered by id.
    pub fn accounts(&self) -> Vec<Account> {
        self.shared
            .state
            .read()
            .accounts
            .iter()
            .map(|(id, balance)| Account::new(*id, *balance))
            .collect()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        Ok(MemoryTransaction {
            shared: self.shared.clone(),
            held: HashMap::new(),
            staged_accounts: HashMap::new(),
            staged_transactions: Vec::new(),
        })
    }

    async fn find_account(&self, id: AccountId) -> Result<Option<Account>> {
        let state = self.shared.state.read();
        Ok(state
            .accounts
            .get(&id)
            .map(|balance| Account::new(id, *balance)))
    }

    async fn history(&self, query: &HistoryQuery, page_size: u32) -> Result<Vec<Transaction>> {
        let mut entries: Vec<Transaction> = {
            let state = self.shared.state.read();
            state
                .transactions
                .iter()
                .filter(|t| t.account_id == query.account_id)
                .cloned()
                .collect()
        };

        entries.sort_by(|a, b| {
            let ordering = match query.sort {
                SortKey::ByTime => a.created_at.cmp(&b.created_at),
                SortKey::BySum => a.delta.cmp(&b.delta),
            }
            .then(a.id.cmp(&b.id));
            match query.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        if let Some((limit, offset)) = query.page.limit_offset(page_size) {
            entries = entries
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect();
        }

        Ok(entries)
    }
}

/// An open unit against [`MemoryLedgerStore`].
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    held: HashMap<AccountId, OwnedMutexGuard<()>>,
    staged_accounts: HashMap<AccountId, Amount>,
    staged_transactions: Vec<Transaction>,
}

impl MemoryTransaction {
    async fn acquire(&mut self, id: AccountId) {
        if self.held.contains_key(&id) {
            return;
        }
        let lock = self
            .shared
            .row_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        self.held.insert(id, guard);
    }

    fn current_balance(&self, id: AccountId) -> Option<Amount> {
        self.staged_accounts
            .get(&id)
            .copied()
            .or_else(|| self.shared.state.read().accounts.get(&id).copied())
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_account(&mut self, id: AccountId) -> Result<()> {
        self.acquire(id).await;
        Ok(())
    }

    async fn apply_delta(&mut self, id: AccountId, delta: Amount) -> Result<UpdateOutcome> {
        self.acquire(id).await;
        let outcome = match self.current_balance(id) {
            None => UpdateOutcome::NotFound,
            Some(balance) if balance + delta < Decimal::ZERO => UpdateOutcome::ConstraintViolated,
            Some(balance) => {
                self.staged_accounts.insert(id, balance + delta);
                UpdateOutcome::Updated(balance + delta)
            }
        };
        Ok(outcome)
    }

    async fn create_account(&mut self, id: AccountId, balance: Amount) -> Result<bool> {
        self.acquire(id).await;
        if self.current_balance(id).is_some() {
            return Ok(false);
        }
        if balance < Decimal::ZERO {
            return Err(LedgerError::storage(format!(
                "new row for account [{id}] violates check constraint \"{NON_NEGATIVE_BALANCE}\""
            )));
        }
        self.staged_accounts.insert(id, balance);
        Ok(true)
    }

    async fn insert_transaction(&mut self, entry: NewTransaction) -> Result<Transaction> {
        if self.shared.fail_inserts.load(Ordering::SeqCst) {
            return Err(LedgerError::storage("transaction insert rejected"));
        }
        let id = self.shared.next_transaction_id.fetch_add(1, Ordering::SeqCst) + 1;
        let transaction = entry.into_transaction(TransactionId::new(id));
        self.staged_transactions.push(transaction.clone());
        Ok(transaction)
    }

    async fn commit(mut self) -> Result<()> {
        {
            let mut state = self.shared.state.write();
            state.accounts.extend(self.staged_accounts.drain());
            state.transactions.append(&mut self.staged_transactions);
        }

        debug!(locks = self.held.len(), "Memory transaction committed");
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        debug!(
            locks = self.held.len(),
            discarded = self.staged_transactions.len(),
            "Memory transaction rolled back"
        );
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    /// Release held row locks and forget the ones nobody else is waiting on.
    fn drop(&mut self) {
        let ids: Vec<AccountId> = self.held.drain().map(|(id, _guard)| id).collect();
        for id in ids {
            self.shared
                .row_locks
                .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use balance_common::{time, Page};

    fn id(n: i64) -> AccountId {
        AccountId::new(n)
    }

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.create_account(id(1), Decimal::from(50)).await.unwrap());

        assert_eq!(store.find_account(id(1)).await.unwrap(), None);
        tx.commit().await.unwrap();
        assert_eq!(
            store.find_account(id(1)).await.unwrap(),
            Some(Account::new(id(1), Decimal::from(50)))
        );
    }

    #[tokio::test]
    async fn test_rollback_discards_everything() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_account(id(1), Decimal::from(50)).await.unwrap();
        tx.insert_transaction(NewTransaction::adjustment(
            id(1),
            time::now(),
            Decimal::from(50),
            Decimal::from(50),
        ))
        .await
        .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.find_account(id(1)).await.unwrap(), None);
        assert_eq!(store.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_conditioned_update_outcomes() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();

        assert_eq!(
            tx.apply_delta(id(1), Decimal::from(5)).await.unwrap(),
            UpdateOutcome::NotFound
        );
        tx.create_account(id(1), Decimal::from(20)).await.unwrap();
        assert_eq!(
            tx.apply_delta(id(1), Decimal::from(-30)).await.unwrap(),
            UpdateOutcome::ConstraintViolated
        );
        assert_eq!(
            tx.apply_delta(id(1), Decimal::from(-20)).await.unwrap(),
            UpdateOutcome::Updated(Decimal::ZERO)
        );
    }

    #[tokio::test]
    async fn test_create_account_reports_existing_row() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_account(id(3), Decimal::from(1)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(!tx.create_account(id(3), Decimal::from(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_dropped_unit_releases_row_lock() {
        let store = MemoryLedgerStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.lock_account(id(7)).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        let locked = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            tx.lock_account(id(7)),
        )
        .await;
        assert!(locked.is_ok());
    }

    #[tokio::test]
    async fn test_finished_units_forget_idle_row_locks() {
        let store = MemoryLedgerStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.lock_account(id(1)).await.unwrap();
        assert_eq!(
            tx.apply_delta(id(2), Decimal::from(-5)).await.unwrap(),
            UpdateOutcome::NotFound
        );
        assert_eq!(store.row_lock_count(), 2);
        tx.rollback().await.unwrap();
        assert_eq!(store.row_lock_count(), 0);

        let mut tx = store.begin().await.unwrap();
        tx.create_account(id(3), Decimal::from(1)).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.row_lock_count(), 0);
    }

    #[tokio::test]
    async fn test_contended_row_lock_survives_release() {
        let store = MemoryLedgerStore::new();
        let mut first = store.begin().await.unwrap();
        first.lock_account(id(4)).await.unwrap();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut second = store.begin().await.unwrap();
                second.lock_account(id(4)).await.unwrap();
                second.commit().await.unwrap();
            })
        };
        while Arc::strong_count(&store.shared.row_locks.get(&id(4)).unwrap()) < 3 {
            tokio::task::yield_now().await;
        }

        first.commit().await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.row_lock_count(), 0);
    }

    #[tokio::test]
    async fn test_history_paginates_after_sorting() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_account(id(1), Decimal::ZERO).await.unwrap();
        for delta in [5, 1, 4, 2, 3] {
            tx.insert_transaction(NewTransaction::adjustment(
                id(1),
                time::now(),
                Decimal::from(delta),
                Decimal::ZERO,
            ))
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();

        let query = HistoryQuery::new(id(1))
            .sorted(SortKey::BySum, SortOrder::Desc)
            .page(Page::Number(2));
        let page = store.history(&query, 2).await.unwrap();
        let deltas: Vec<Amount> = page.iter().map(|t| t.delta).collect();
        assert_eq!(deltas, vec![Decimal::from(3), Decimal::from(2)]);
    }
}
