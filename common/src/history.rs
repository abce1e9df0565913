//! Transaction history query parameters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::AccountId;

/// Field a history listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortKey {
    /// Order by `created_at`.
    #[default]
    #[serde(rename = "by-time")]
    ByTime,
    /// Order by `delta`.
    #[serde(rename = "by-sum")]
    BySum,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::ByTime => "by-time",
            SortKey::BySum => "by-sum",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = ParseQueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "by-time" => Ok(SortKey::ByTime),
            "by-sum" => Ok(SortKey::BySum),
            _ => Err(ParseQueryError::new(
                "sort",
                "valid options are [by-sum], [by-time]",
            )),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    /// SQL keyword for this direction.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = ParseQueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(ParseQueryError::new(
                "order",
                "valid options are [asc], [desc]",
            )),
        }
    }
}

/// Which slice of the history to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Page {
    /// The full, unpaginated result set.
    #[default]
    All,
    /// A one-based page number.
    Number(u32),
}

impl Page {
    /// Build a page from an optional page number. `Some(0)` is page 1.
    pub fn from_option(page: Option<u32>) -> Self {
        match page {
            None => Page::All,
            Some(n) => Page::Number(n.max(1)),
        }
    }

    /// Limit and offset for a given page size, `None` when unpaginated.
    pub fn limit_offset(&self, page_size: u32) -> Option<(u64, u64)> {
        match *self {
            Page::All => None,
            Page::Number(n) => {
                let n = u64::from(n.max(1));
                let size = u64::from(page_size);
                Some((size, (n - 1) * size))
            }
        }
    }
}

/// A transaction history query for one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    pub account_id: AccountId,
    pub sort: SortKey,
    pub order: SortOrder,
    pub page: Page,
}

impl HistoryQuery {
    /// Query the whole history of an account, oldest first.
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            sort: SortKey::default(),
            order: SortOrder::default(),
            page: Page::All,
        }
    }

    pub fn sorted(mut self, sort: SortKey, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    pub fn page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }
}

/// Error parsing a history query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseQueryError {
    pub param: &'static str,
    pub message: &'static str,
}

impl ParseQueryError {
    fn new(param: &'static str, message: &'static str) -> Self {
        Self { param, message }
    }
}

impl fmt::Display for ParseQueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query param [{}] not valid: {}", self.param, self.message)
    }
}

impl std::error::Error for ParseQueryError {}
