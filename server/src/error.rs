//! Mapping of request and ledger failures to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use balance_common::LedgerError;

/// Failure of a request.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request was malformed or failed validation.
    #[error("{0}")]
    Validation(String),

    /// The ledger refused or failed the operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The server is not accepting requests.
    #[error("service unavailable")]
    Unavailable,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Ledger(LedgerError::InsufficientFunds { .. }) => StatusCode::CONFLICT,
            ApiError::Ledger(LedgerError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::Ledger(LedgerError::InsufficientFunds { .. }) => "insufficient_funds",
            ApiError::Ledger(LedgerError::Storage(_)) => "storage_error",
            ApiError::Unavailable => "unavailable",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, code = self.code(), "Request failed");
        } else {
            warn!(error = %self, code = self.code(), "Request rejected");
        }
        json_error(status, self.code(), self.to_string())
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
