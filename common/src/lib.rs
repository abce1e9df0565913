//! Balance Service Common Types
//!
//! This crate contains shared types used across the balance service,
//! including identifiers, monetary helpers, history query parameters and
//! the ledger error taxonomy.

pub mod identifiers;
pub mod monetary;
pub mod history;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use history::*;
pub use error::*;
pub use time::*;
