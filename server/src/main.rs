//! Balance Service Server Binary
//!
//! Serves the ledger over HTTP, backed by PostgreSQL.

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use balance_ledger::{LedgerEngine, PgLedgerStore};
use balance_server::config::LogFormat;
use balance_server::{router, AppState, ServerConfig, ServerState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
    );
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    info!("Starting Balance Service");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let node_id = config
        .node_id
        .clone()
        .unwrap_or_else(|| format!("balance-{}", uuid::Uuid::new_v4()));

    info!(node_id = %node_id, "Node ID assigned");

    let store = PgLedgerStore::connect(&config.ledger).await?;
    store.migrate().await?;
    info!(max_connections = config.ledger.max_connections, "Database ready");

    let state = AppState::new(LedgerEngine::new(store, config.ledger.clone()));
    let app = router(state.clone());

    let addr = config
        .socket_addr()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let listener = TcpListener::bind(addr).await?;
    state.set_lifecycle(ServerState::Running);

    info!(
        node_id = %node_id,
        listen_addr = %addr,
        page_size = config.ledger.page_size,
        "Balance Service running"
    );

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
            shutdown_state.set_lifecycle(ServerState::ShuttingDown);
        })
        .await?;

    info!(node_id = %node_id, "Balance Service shutdown complete");
    Ok(())
}
