//! PostgreSQL store adapter.
//!
//! Units run at PostgreSQL's default READ COMMITTED isolation. Concurrent
//! mutations of one account serialize on its row lock; the conditioned
//! `UPDATE` re-evaluates its `balance + delta >= 0` predicate against the
//! latest committed row once the lock is granted.
//!
//! `lock_account` takes a transaction-scoped advisory lock keyed by the
//! account id before the row lock. Advisory locks exist whether or not the
//! row does, so transfers hold both ids in ascending order even when one
//! account is created by a concurrent unit midway through.
//!
//! ## Error Mapping
//!
//! | Failure | Result |
//! |---------|--------|
//! | Check violation (`23514`) on `non_negative_balance` during an update | `UpdateOutcome::ConstraintViolated` |
//! | Any other database error | `LedgerError::Storage` |
//! | Pool closed, timeouts, I/O | `LedgerError::Storage` |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::{debug, info, instrument};

use balance_common::{
    AccountId, Amount, HistoryQuery, LedgerError, Result, SortKey, TransactionId,
};

use super::{LedgerStore, StoreTransaction, UpdateOutcome, NON_NEGATIVE_BALANCE};
use crate::account::Account;
use crate::config::LedgerConfig;
use crate::journal::{NewTransaction, Transaction};

const CHECK_VIOLATION: &str = "23514";

/// Store adapter backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool using the timeouts and limits from `config`.
    pub async fn connect(config: &LedgerConfig) -> Result<Self> {
        let statement_timeout = millis(config.statement_timeout);
        let lock_timeout = millis(config.lock_timeout);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    let statement = format!("SET statement_timeout = {statement_timeout}");
                    sqlx::query(&statement).execute(&mut *conn).await?;
                    let lock = format!("SET lock_timeout = {lock_timeout}");
                    sqlx::query(&lock).execute(&mut *conn).await?;
                    Ok(())
                })
            })
            .connect(&config.database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        info!(
            max_connections = config.max_connections,
            statement_timeout_ms = statement_timeout,
            lock_timeout_ms = lock_timeout,
            "Connected to ledger database"
        );

        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::storage(format!("migration failed: {e}")))
    }

}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction> {
        let inner = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(PgTransaction { inner })
    }

    #[instrument(skip(self), fields(account = %id), err)]
    async fn find_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row: Option<AccountRow> =
            sqlx::query_as("SELECT account_id, balance FROM accounts WHERE account_id = $1")
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("find_account", e))?;

        Ok(row.map(Account::from))
    }

    #[instrument(skip(self, query), fields(account = %query.account_id), err)]
    async fn history(&self, query: &HistoryQuery, page_size: u32) -> Result<Vec<Transaction>> {
        let column = match query.sort {
            SortKey::ByTime => "created_at",
            SortKey::BySum => "delta",
        };
        let direction = query.order.as_sql();

        let mut sql = format!(
            r#"
            SELECT
                transaction_id,
                account_id,
                created_at,
                delta,
                remaining,
                message
            FROM transactions
            WHERE account_id = $1
            ORDER BY {column} {direction}, transaction_id {direction}
            "#
        );

        let page = query.page.limit_offset(page_size);
        if page.is_some() {
            sql.push_str(" LIMIT $2 OFFSET $3");
        }

        let mut statement = sqlx::query_as::<_, TransactionRow>(&sql).bind(query.account_id.get());
        if let Some((limit, offset)) = page {
            statement = statement.bind(to_i64(limit)).bind(to_i64(offset));
        }

        let rows = statement
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("history", e))?;

        debug!(entries = rows.len(), "History loaded");
        Ok(rows.into_iter().map(Transaction::from).collect())
    }
}

/// An open unit against [`PgLedgerStore`]. Rolled back by sqlx on drop.
pub struct PgTransaction {
    inner: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn lock_account(&mut self, id: AccountId) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(id.get())
            .execute(&mut *self.inner)
            .await
            .map_err(|e| map_sqlx_error("lock_account", e))?;

        sqlx::query("SELECT account_id FROM accounts WHERE account_id = $1 FOR UPDATE")
            .bind(id.get())
            .fetch_optional(&mut *self.inner)
            .await
            .map_err(|e| map_sqlx_error("lock_account", e))?;
        Ok(())
    }

    async fn apply_delta(&mut self, id: AccountId, delta: Amount) -> Result<UpdateOutcome> {
        let updated: std::result::Result<Option<(Decimal,)>, sqlx::Error> = sqlx::query_as(
            r#"
            UPDATE accounts
            SET balance = balance + $2
            WHERE account_id = $1 AND balance + $2 >= 0
            RETURNING balance
            "#,
        )
        .bind(id.get())
        .bind(delta)
        .fetch_optional(&mut *self.inner)
        .await;

        match updated {
            Ok(Some((balance,))) => Ok(UpdateOutcome::Updated(balance)),
            // A non-negative delta cannot fail the predicate, so no row
            // matched. The row may have been committed since this statement
            // started; the engine's create-then-reapply path handles that.
            Ok(None) if delta >= Decimal::ZERO => Ok(UpdateOutcome::NotFound),
            Ok(None) => {
                let exists: Option<(i64,)> =
                    sqlx::query_as("SELECT account_id FROM accounts WHERE account_id = $1")
                        .bind(id.get())
                        .fetch_optional(&mut *self.inner)
                        .await
                        .map_err(|e| map_sqlx_error("apply_delta", e))?;
                Ok(match exists {
                    Some(_) => UpdateOutcome::ConstraintViolated,
                    None => UpdateOutcome::NotFound,
                })
            }
            Err(e) if is_balance_violation(&e) => Ok(UpdateOutcome::ConstraintViolated),
            Err(e) => Err(map_sqlx_error("apply_delta", e)),
        }
    }

    async fn create_account(&mut self, id: AccountId, balance: Amount) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (account_id, balance)
            VALUES ($1, $2)
            ON CONFLICT (account_id) DO NOTHING
            "#,
        )
        .bind(id.get())
        .bind(balance)
        .execute(&mut *self.inner)
        .await
        .map_err(|e| map_sqlx_error("create_account", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_transaction(&mut self, entry: NewTransaction) -> Result<Transaction> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO transactions (account_id, created_at, delta, remaining, message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING transaction_id
            "#,
        )
        .bind(entry.account_id.get())
        .bind(entry.created_at)
        .bind(entry.delta)
        .bind(entry.remaining)
        .bind(&entry.message)
        .fetch_one(&mut *self.inner)
        .await
        .map_err(|e| map_sqlx_error("insert_transaction", e))?;

        Ok(entry.into_transaction(TransactionId::new(id)))
    }

    async fn commit(self) -> Result<()> {
        self.inner
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self) -> Result<()> {
        self.inner
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[derive(Debug, FromRow)]
struct AccountRow {
    account_id: i64,
    balance: Decimal,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account::new(AccountId::new(row.account_id), row.balance)
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    transaction_id: i64,
    account_id: i64,
    created_at: DateTime<Utc>,
    delta: Decimal,
    remaining: Decimal,
    message: String,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Transaction {
            id: TransactionId::new(row.transaction_id),
            account_id: AccountId::new(row.account_id),
            created_at: row.created_at,
            delta: row.delta,
            remaining: row.remaining,
            message: row.message,
        }
    }
}

/// True for a check violation of the balance constraint.
fn is_balance_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some(CHECK_VIOLATION)
                && db_err.constraint() == Some(NON_NEGATIVE_BALANCE)
        }
        _ => false,
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => LedgerError::storage(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            LedgerError::storage(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            LedgerError::storage(format!("timed out acquiring connection in {operation}"))
        }
        sqlx::Error::RowNotFound => {
            LedgerError::storage(format!("unexpected row not found in {operation}"))
        }
        _ => LedgerError::storage(format!("sqlx error in {operation}: {err}")),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
