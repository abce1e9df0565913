//! Simulation controller.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use balance_common::{AccountId, Amount, LedgerError};
use balance_ledger::{LedgerEngine, LedgerStore};

use crate::metrics::SimulationMetrics;
use crate::workload::{Operation, Workload};

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub accounts: u32,
    pub workers: usize,
    pub operations: usize,
    pub seed: u64,
    pub max_amount: u32,
}

/// Result of a finished run.
#[derive(Debug)]
pub struct SimulationReport {
    pub metrics: SimulationMetrics,
    /// Opening balance plus every applied delta, per account.
    pub expected: BTreeMap<AccountId, Amount>,
    pub elapsed: Duration,
}

#[derive(Default)]
struct WorkerOutcome {
    metrics: SimulationMetrics,
    deltas: BTreeMap<AccountId, Amount>,
}

/// Drives concurrent workers against one engine.
pub struct SimulationController<S> {
    engine: Arc<LedgerEngine<S>>,
    params: SimulationParams,
}

impl<S: LedgerStore + 'static> SimulationController<S> {
    pub fn new(engine: Arc<LedgerEngine<S>>, params: SimulationParams) -> Self {
        Self { engine, params }
    }

    pub fn engine(&self) -> &LedgerEngine<S> {
        &self.engine
    }

    pub fn accounts(&self) -> Vec<AccountId> {
        (1..=i64::from(self.params.accounts))
            .map(AccountId::new)
            .collect()
    }

    /// Run every worker to completion.
    pub async fn run(&self) -> anyhow::Result<SimulationReport> {
        let accounts = self.accounts();

        let mut expected = BTreeMap::new();
        for &id in &accounts {
            let opening = self.engine.get_balance(id).await?.balance;
            expected.insert(id, opening);
        }

        info!(
            accounts = accounts.len(),
            workers = self.params.workers,
            operations = self.params.operations,
            seed = self.params.seed,
            "Running simulation"
        );

        let start = Instant::now();
        let handles: Vec<_> = (0..self.params.workers)
            .map(|worker| {
                let engine = self.engine.clone();
                let workload = Workload::new(
                    accounts.clone(),
                    self.params.max_amount,
                    self.params.seed.wrapping_add(worker as u64),
                );
                let count = share(self.params.operations, self.params.workers, worker);
                tokio::spawn(run_worker(engine, workload, count))
            })
            .collect();

        let mut metrics = SimulationMetrics::new();
        for result in futures::future::join_all(handles).await {
            let outcome = result?;
            metrics.merge(&outcome.metrics);
            for (id, delta) in outcome.deltas {
                *expected.entry(id).or_insert(Decimal::ZERO) += delta;
            }
        }

        Ok(SimulationReport {
            metrics,
            expected,
            elapsed: start.elapsed(),
        })
    }
}

/// Operations assigned to `worker` when `total` is split across `workers`.
fn share(total: usize, workers: usize, worker: usize) -> usize {
    total / workers + usize::from(worker < total % workers)
}

async fn run_worker<S: LedgerStore>(
    engine: Arc<LedgerEngine<S>>,
    mut workload: Workload,
    count: usize,
) -> WorkerOutcome {
    let mut outcome = WorkerOutcome::default();

    for _ in 0..count {
        let op = workload.next_operation();
        let started = Instant::now();
        let result = match op {
            Operation::Adjust { account, delta } => {
                engine.adjust_balance(account, delta).await.map(|_| ())
            }
            Operation::Transfer { from, to, amount } => {
                engine.transfer(from, to, amount).await.map(|_| ())
            }
        };
        let latency = started.elapsed();

        match result {
            Ok(()) => {
                outcome.metrics.record_success(op.kind(), latency);
                for (id, delta) in op.deltas() {
                    *outcome.deltas.entry(id).or_insert(Decimal::ZERO) += delta;
                }
            }
            Err(LedgerError::InsufficientFunds { account_id }) => {
                debug!(account = %account_id, "Operation refused");
                outcome.metrics.record_rejection(latency);
            }
            Err(LedgerError::Storage(message)) => {
                warn!(error = %message, ?op, "Operation failed");
                outcome.metrics.record_failure();
            }
        }
    }

    outcome
}
