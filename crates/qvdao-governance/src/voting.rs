//! Quadratic voting arithmetic.
//!
//! Stake converts to weight as `floor(sqrt(stake))`. Casting votes then
//! costs weight according to the ledger's [`VoteWeighting`] policy.

use serde::{Deserialize, Serialize};

use qvdao_types::{Amount, Weight};

/// Integer square root using Newton's method.
/// Returns floor(sqrt(n)).
pub fn integer_sqrt(n: u128) -> u128 {
    if n <= 1 {
        return n;
    }

    let mut x = n;
    // (n + 1) / 2 without overflowing at u128::MAX
    let mut y = n / 2 + (n & 1);

    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }

    x
}

/// Voting weight derived from a staked amount.
pub fn weight_for_stake(stake: Amount) -> Weight {
    integer_sqrt(stake)
}

/// Calculate cost for quadratic voting.
///
/// Returns `None` when `votes^2` does not fit.
pub fn quadratic_cost(votes: u128) -> Option<u128> {
    votes.checked_mul(votes)
}

/// Maximum votes purchasable with a budget: floor(sqrt(budget)).
pub fn max_votes_from_budget(budget: Weight) -> u128 {
    integer_sqrt(budget)
}

/// How a voter's credits translate into cost and applied weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteWeighting {
    /// Cost `credits^2`, applied weight `credits`.
    #[default]
    Linear,
    /// Cost `credits`, applied weight `floor(sqrt(credits))`.
    SqrtCredits,
}

impl VoteWeighting {
    /// Weight consumed from the voter's available weight.
    pub fn cost(&self, credits: u128) -> Option<u128> {
        match self {
            VoteWeighting::Linear => quadratic_cost(credits),
            VoteWeighting::SqrtCredits => Some(credits),
        }
    }

    /// Weight added to the chosen side of the tally.
    pub fn applied_weight(&self, credits: u128) -> Weight {
        match self {
            VoteWeighting::Linear => credits,
            VoteWeighting::SqrtCredits => integer_sqrt(credits),
        }
    }

    /// Largest credit count affordable with `available` weight.
    pub fn max_credits(&self, available: Weight) -> u128 {
        match self {
            VoteWeighting::Linear => max_votes_from_budget(available),
            VoteWeighting::SqrtCredits => available,
        }
    }
}
