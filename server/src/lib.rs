//! Balance Service HTTP Server
//!
//! Decodes and validates requests, calls the ledger engine, and maps its
//! typed outcomes to HTTP responses. No ledger rules live here.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use routes::router;
pub use state::{AppState, ServerState};
