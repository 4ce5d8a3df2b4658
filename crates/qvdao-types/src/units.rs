//! Scalar units used across the ledger.

/// Token amount in the staking asset's smallest unit.
pub type Amount = u128;

/// Voting weight. Derived from stake as `floor(sqrt(stake))`.
pub type Weight = u128;

/// Unix time in seconds.
pub type Timestamp = u64;

/// Proposal identifier, assigned monotonically starting at 1.
pub type ProposalId = u64;

pub const SECONDS_PER_DAY: u64 = 86_400;
