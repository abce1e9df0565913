//! Error types for ledger operations.

use crate::AccountId;
use thiserror::Error;

/// Failure of a ledger operation.
///
/// Every failure aborts the atomic unit it occurred in, so a caller that
/// receives an error can rely on nothing having been applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A debit would make or keep the balance negative. Debiting an
    /// account that does not exist also lands here.
    #[error("Insufficient funds on account [{account_id}]")]
    InsufficientFunds { account_id: AccountId },

    /// Any failure of the underlying store.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Create a storage error from anything printable.
    pub fn storage(message: impl Into<String>) -> Self {
        LedgerError::Storage(message.into())
    }

    /// Get a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = LedgerError::InsufficientFunds {
            account_id: AccountId::new(3),
        };
        assert_eq!(err.error_code(), "INSUFFICIENT_FUNDS");
        assert_eq!(err.to_string(), "Insufficient funds on account [3]");

        let err = LedgerError::storage("connection reset");
        assert_eq!(err.error_code(), "STORAGE_ERROR");
    }
}
