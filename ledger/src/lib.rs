//! Balance Service Ledger Engine
//!
//! Per-account balances and an append-only transaction ledger. Every
//! mutation runs as one atomic unit against the store, balances never go
//! negative, and each applied mutation records exactly one ledger entry
//! per account it touched.

pub mod account;
pub mod balance;
pub mod config;
pub mod engine;
pub mod journal;
pub mod store;

pub use account::Account;
pub use balance::{replay_history, HistoryViolation};
pub use config::LedgerConfig;
pub use engine::LedgerEngine;
pub use journal::{NewTransaction, Transaction};
pub use store::{LedgerStore, MemoryLedgerStore, PgLedgerStore, StoreTransaction, UpdateOutcome};
