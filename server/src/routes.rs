//! HTTP routes.
//!
//! | Method | Path | Ledger operation |
//! |--------|------|------------------|
//! | GET | `/alive` | none |
//! | GET | `/:id` | balance lookup |
//! | POST | `/change-balance` | single-account adjustment |
//! | POST | `/transfer` | two-account transfer |
//! | GET | `/transactions/:id?sort=&order=&page=` | history query |
//!
//! Every route answers 503 unless the server is in the running state.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use balance_common::{AccountId, HistoryQuery, Page, SortKey, SortOrder};
use balance_ledger::{Account, LedgerStore, Transaction};

use crate::error::ApiError;
use crate::state::AppState;

/// Build the application router.
pub fn router<S: LedgerStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/:id", get(get_balance::<S>))
        .route("/transactions/:id", get(get_transactions::<S>))
        .route("/transfer", post(transfer::<S>))
        .route("/change-balance", post(change_balance::<S>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_running::<S>,
        ))
        .route("/alive", get(alive::<S>))
        .with_state(state)
}

/// Refuse ledger requests while starting up or draining.
async fn require_running<S: LedgerStore>(
    State(state): State<AppState<S>>,
    request: Request,
    next: Next,
) -> Response {
    if state.lifecycle().accepts_requests() {
        next.run(request).await
    } else {
        ApiError::Unavailable.into_response()
    }
}

/// Body of `POST /change-balance`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeBalanceRequest {
    pub id: i64,
    pub delta: Decimal,
}

impl ChangeBalanceRequest {
    fn validate(&self) -> Result<(AccountId, Decimal), ApiError> {
        let mut problems = Vec::new();
        if self.id <= 0 {
            problems.push("[id] must be a positive integer");
        }
        if self.delta.is_zero() {
            problems.push("[delta] must be non-zero");
        }
        into_validated(problems, (AccountId::new(self.id), self.delta))
    }
}

/// Body of `POST /transfer`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub id1: i64,
    pub id2: i64,
    pub delta: Decimal,
}

impl TransferRequest {
    fn validate(&self) -> Result<(AccountId, AccountId, Decimal), ApiError> {
        let mut problems = Vec::new();
        if self.id1 <= 0 {
            problems.push("[id1] must be a positive integer");
        }
        if self.id2 <= 0 {
            problems.push("[id2] must be a positive integer");
        }
        if self.id1 == self.id2 {
            problems.push("[id2] must differ from [id1]");
        }
        if self.delta <= Decimal::ZERO {
            problems.push("[delta] must be positive");
        }
        into_validated(
            problems,
            (AccountId::new(self.id1), AccountId::new(self.id2), self.delta),
        )
    }
}

/// Query string of `GET /transactions/:id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    pub sort: Option<String>,
    pub order: Option<String>,
    pub page: Option<String>,
}

impl HistoryParams {
    fn into_query(self, account_id: AccountId) -> Result<HistoryQuery, ApiError> {
        let sort = match non_empty(self.sort) {
            Some(sort) => sort.parse::<SortKey>().map_err(|e| ApiError::validation(e.to_string()))?,
            None => SortKey::ByTime,
        };
        let order = match non_empty(self.order) {
            Some(order) => order
                .parse::<SortOrder>()
                .map_err(|e| ApiError::validation(e.to_string()))?,
            None => SortOrder::Asc,
        };
        let page = match non_empty(self.page) {
            Some(page) => Page::from_option(Some(page.trim().parse::<u32>().map_err(|_| {
                ApiError::validation(
                    "Query param [page] not valid: param must be a non-negative integer",
                )
            })?)),
            None => Page::All,
        };

        Ok(HistoryQuery::new(account_id).sorted(sort, order).page(page))
    }
}

async fn alive<S: LedgerStore>(State(state): State<AppState<S>>) -> Response {
    if state.lifecycle().accepts_requests() {
        (StatusCode::OK, "alive").into_response()
    } else {
        ApiError::Unavailable.into_response()
    }
}

#[instrument(skip(state))]
async fn get_balance<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Account>, ApiError> {
    let id = parse_account_id(&id)?;
    let account = state.engine.get_balance(id).await?;
    Ok(Json(account))
}

#[instrument(skip(state, payload))]
async fn change_balance<S: LedgerStore>(
    State(state): State<AppState<S>>,
    payload: Result<Json<ChangeBalanceRequest>, JsonRejection>,
) -> Result<Json<Transaction>, ApiError> {
    let Json(request) = payload.map_err(json_rejection)?;
    let (id, delta) = request.validate()?;
    let transaction = state.engine.adjust_balance(id, delta).await?;
    Ok(Json(transaction))
}

#[instrument(skip(state, payload))]
async fn transfer<S: LedgerStore>(
    State(state): State<AppState<S>>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<Transaction>, ApiError> {
    let Json(request) = payload.map_err(json_rejection)?;
    let (from, to, amount) = request.validate()?;
    let transaction = state.engine.transfer(from, to, amount).await?;
    Ok(Json(transaction))
}

#[instrument(skip(state, params))]
async fn get_transactions<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let id = parse_account_id(&id)?;
    let Query(params) = params.map_err(|e| ApiError::validation(e.body_text()))?;
    let query = params.into_query(id)?;
    let history = state.engine.get_history(&query).await?;
    Ok(Json(history))
}

fn parse_account_id(raw: &str) -> Result<AccountId, ApiError> {
    raw.parse::<i64>()
        .ok()
        .map(AccountId::new)
        .filter(AccountId::is_valid)
        .ok_or_else(|| {
            ApiError::validation(format!("Account id [{raw}] not valid: must be a positive integer"))
        })
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::validation(format!("JSON Unmarshalling failed. [{}]", rejection.body_text()))
}

fn into_validated<T>(problems: Vec<&str>, value: T) -> Result<T, ApiError> {
    if problems.is_empty() {
        Ok(value)
    } else {
        Err(ApiError::validation(format!(
            "Validation error(s): {}",
            problems.join("; ")
        )))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
