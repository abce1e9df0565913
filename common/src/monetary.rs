//! Monetary helpers.
//!
//! Balances and deltas are exact decimals. The ledger keeps a single
//! currency, so amounts carry no currency code.

use rust_decimal::{Decimal, RoundingStrategy};

/// A signed monetary amount.
pub type Amount = Decimal;

/// Decimal places used when rendering amounts in ledger messages.
pub const DISPLAY_DECIMAL_PLACES: u32 = 2;

/// Render an amount with two decimal places, e.g. `-30.00`. Halves round
/// away from zero.
pub fn format_amount(amount: Amount) -> String {
    let rounded = amount.round_dp_with_strategy(
        DISPLAY_DECIMAL_PLACES,
        RoundingStrategy::MidpointAwayFromZero,
    );
    format!("{:.2}", rounded)
}
