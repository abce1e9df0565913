//! Persistent store adapters.
//!
//! The engine talks to storage only through [`LedgerStore`] and the
//! [`StoreTransaction`] it opens. A store transaction is the atomic unit:
//! everything done through it becomes visible at `commit`, or not at all.
//! Dropping a transaction without committing rolls it back, so a cancelled
//! caller never leaves partial effects behind.

use async_trait::async_trait;

use balance_common::{AccountId, Amount, HistoryQuery, Result};

use crate::account::Account;
use crate::journal::{NewTransaction, Transaction};

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Name of the storage constraint keeping balances non-negative.
pub const NON_NEGATIVE_BALANCE: &str = "non_negative_balance";

/// Outcome of a conditioned balance update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The delta was applied; carries the new balance.
    Updated(Amount),
    /// No account row exists for the id.
    NotFound,
    /// The row exists but the delta would take its balance below zero.
    ConstraintViolated,
}

/// A durable store of accounts and ledger entries.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: StoreTransaction;

    /// Open an atomic unit.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Read a committed account.
    async fn find_account(&self, id: AccountId) -> Result<Option<Account>>;

    /// Read committed ledger entries for one account.
    async fn history(&self, query: &HistoryQuery, page_size: u32) -> Result<Vec<Transaction>>;
}

/// One open atomic unit against a [`LedgerStore`].
#[async_trait]
pub trait StoreTransaction: Send {
    /// Take the lock on an account id, held until commit or rollback.
    /// Covers ids with no account row yet, so a transfer can lock both
    /// sides in a fixed order before either exists.
    async fn lock_account(&mut self, id: AccountId) -> Result<()>;

    /// Add `delta` to the balance of `id` if the result stays `>= 0`.
    async fn apply_delta(&mut self, id: AccountId, delta: Amount) -> Result<UpdateOutcome>;

    /// Create an account. Returns `false` if the row already exists, which
    /// happens when a concurrent unit created it first.
    async fn create_account(&mut self, id: AccountId, balance: Amount) -> Result<bool>;

    /// Append a ledger entry.
    async fn insert_transaction(&mut self, entry: NewTransaction) -> Result<Transaction>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}
