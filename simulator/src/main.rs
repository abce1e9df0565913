//! Balance Service Simulator
//!
//! Drives concurrent random credits, debits and transfers through the
//! ledger engine, then checks that balances, history and applied deltas
//! still agree.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use balance_ledger::{LedgerConfig, LedgerEngine, LedgerStore, MemoryLedgerStore, PgLedgerStore};

mod controller;
mod metrics;
mod verify;
mod workload;

use controller::{SimulationController, SimulationParams};

/// Balance Service Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "balance-simulator")]
#[command(about = "Concurrent load generator and invariant checker for the balance ledger")]
struct Args {
    /// Number of accounts to spread operations over
    #[arg(short, long, default_value = "5")]
    accounts: u32,

    /// Number of concurrent workers
    #[arg(short, long, default_value = "16")]
    workers: usize,

    /// Total operations across all workers
    #[arg(short, long, default_value = "10000")]
    operations: usize,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Largest amount per operation, in whole units
    #[arg(long, default_value = "100")]
    max_amount: u32,

    /// PostgreSQL URL; the in-memory store is used when absent
    #[arg(long, env = "SIMULATOR_DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    if args.accounts == 0 || args.workers == 0 || args.max_amount == 0 {
        anyhow::bail!("--accounts, --workers and --max-amount must be positive");
    }

    let params = SimulationParams {
        accounts: args.accounts,
        workers: args.workers,
        operations: args.operations,
        seed: args.seed.unwrap_or_else(rand::random),
        max_amount: args.max_amount,
    };

    info!("Starting Balance Service Simulator");

    match args.database_url {
        Some(url) => {
            let config = LedgerConfig {
                database_url: url,
                ..LedgerConfig::from_env()
            };
            let store = PgLedgerStore::connect(&config).await?;
            store.migrate().await?;
            info!("Using PostgreSQL store");
            simulate(LedgerEngine::new(store, config), params).await
        }
        None => {
            info!("Using in-memory store");
            simulate(
                LedgerEngine::new(MemoryLedgerStore::new(), LedgerConfig::default()),
                params,
            )
            .await
        }
    }
}

async fn simulate<S: LedgerStore + 'static>(
    engine: LedgerEngine<S>,
    params: SimulationParams,
) -> anyhow::Result<()> {
    let seed = params.seed;
    let controller = SimulationController::new(Arc::new(engine), params);
    let report = controller.run().await?;

    let metrics = &report.metrics;
    info!("Simulation complete");
    info!(seed, elapsed_ms = report.elapsed.as_millis() as u64, "Run finished");
    info!("Total operations: {}", metrics.total());
    info!(
        "Applied: {} (credits {}, debits {}, transfers {})",
        metrics.applied(),
        metrics.credits,
        metrics.debits,
        metrics.transfers
    );
    info!("Rejected (insufficient funds): {}", metrics.rejected);
    info!("Failed (storage): {}", metrics.failed);
    info!(
        "Latency avg/p50/p99: {}/{}/{}µs",
        metrics.average_latency_us(),
        metrics.p50_latency_us(),
        metrics.p99_latency_us()
    );
    info!("Throughput: {:.0} ops/s", metrics.throughput(report.elapsed));

    let violations = verify::verify_ledger(controller.engine(), &report.expected).await?;
    if !violations.is_empty() {
        for violation in &violations {
            error!(%violation, "Invariant violated");
        }
        anyhow::bail!("{} ledger invariant violation(s) detected", violations.len());
    }

    for (account, balance) in &report.expected {
        info!(account = %account, balance = %balance, "Final balance");
    }
    info!("All ledger invariants hold");
    Ok(())
}
