//! Shared application state.

use std::sync::Arc;

use parking_lot::RwLock;

use balance_ledger::{LedgerEngine, LedgerStore};

/// Server operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Server is starting up.
    Starting,
    /// Server is running and accepting requests.
    Running,
    /// Server is draining in-flight requests before exit.
    ShuttingDown,
}

impl ServerState {
    /// Check if the server is accepting new requests.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, ServerState::Running)
    }
}

/// State handed to every request handler.
pub struct AppState<S> {
    pub engine: Arc<LedgerEngine<S>>,
    lifecycle: Arc<RwLock<ServerState>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}

impl<S: LedgerStore> AppState<S> {
    pub fn new(engine: LedgerEngine<S>) -> Self {
        Self {
            engine: Arc::new(engine),
            lifecycle: Arc::new(RwLock::new(ServerState::Starting)),
        }
    }

    pub fn lifecycle(&self) -> ServerState {
        *self.lifecycle.read()
    }

    pub fn set_lifecycle(&self, state: ServerState) {
        *self.lifecycle.write() = state;
    }
}
