//! Random operation generation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use balance_common::{AccountId, Amount};

/// Kinds of ledger operations the simulator issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Credit,
    Debit,
    Transfer,
}

/// One ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Signed single-account adjustment.
    Adjust { account: AccountId, delta: Amount },
    /// Move `amount` between two distinct accounts.
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Adjust { delta, .. } if delta.is_sign_negative() => OperationKind::Debit,
            Operation::Adjust { .. } => OperationKind::Credit,
            Operation::Transfer { .. } => OperationKind::Transfer,
        }
    }

    /// Per-account balance changes if the operation is applied.
    pub fn deltas(&self) -> Vec<(AccountId, Amount)> {
        match *self {
            Operation::Adjust { account, delta } => vec![(account, delta)],
            Operation::Transfer { from, to, amount } => vec![(from, -amount), (to, amount)],
        }
    }
}

/// Seeded generator of random operations over a fixed account set.
///
/// Roughly 40% credits, 20% debits and 40% transfers. With a single
/// account no transfers are generated.
pub struct Workload {
    accounts: Vec<AccountId>,
    max_cents: i64,
    rng: StdRng,
}

impl Workload {
    /// Create a workload. `max_amount` is in whole units and must be positive.
    pub fn new(accounts: Vec<AccountId>, max_amount: u32, seed: u64) -> Self {
        Self {
            accounts,
            max_cents: i64::from(max_amount.max(1)) * 100,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw the next operation.
    pub fn next_operation(&mut self) -> Operation {
        let roll = self.rng.gen_range(0..10);
        let amount = Decimal::new(self.rng.gen_range(1..=self.max_cents), 2);

        if roll >= 6 && self.accounts.len() > 1 {
            let from = self.rng.gen_range(0..self.accounts.len());
            let mut to = self.rng.gen_range(0..self.accounts.len() - 1);
            if to >= from {
                to += 1;
            }
            return Operation::Transfer {
                from: self.accounts[from],
                to: self.accounts[to],
                amount,
            };
        }

        let account = self.accounts[self.rng.gen_range(0..self.accounts.len())];
        let delta = if roll < 4 || roll >= 6 { amount } else { -amount };
        Operation::Adjust { account, delta }
    }
}
