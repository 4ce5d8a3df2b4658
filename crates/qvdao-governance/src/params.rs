//! Governance parameter store.
//!
//! Every tunable constant of the ledger lives here. Parameters are plain
//! `u64`s so they round-trip through TOML configuration files unchanged.

use serde::{Deserialize, Serialize};

use crate::error::{GovernanceError, Result};
use crate::voting::VoteWeighting;
use qvdao_types::Weight;

/// Minimum participation rule for a proposal outcome to be binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuorumRule {
    /// Fixed amount of participating weight.
    Absolute(u64),
    /// Percentage of the total outstanding weight snapshotted at creation.
    Percent(u8),
}

impl QuorumRule {
    /// Weight required for a proposal whose creation-time total weight was
    /// `total_weight`.
    pub fn required_weight(&self, total_weight: Weight) -> Weight {
        match *self {
            QuorumRule::Absolute(weight) => Weight::from(weight),
            QuorumRule::Percent(pct) => total_weight.saturating_mul(Weight::from(pct)) / 100,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            QuorumRule::Absolute(_) => Ok(()),
            QuorumRule::Percent(pct) if (1..=100).contains(&pct) => Ok(()),
            QuorumRule::Percent(pct) => Err(GovernanceError::InvalidQuorum(format!(
                "percentage must be within 1..=100, got {}",
                pct
            ))),
        }
    }
}

/// Tunable governance constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceParams {
    /// Participation required for an outcome to count
    pub quorum: QuorumRule,
    /// A proposal passes iff `for * 100 / total > passing_threshold_percent`
    pub passing_threshold_percent: u8,
    /// Minimum staked amount needed to create a proposal
    pub proposal_stake_threshold: u64,
    /// Exact deposit required to create a proposal (0 disables deposits)
    pub proposal_deposit: u64,
    /// Shortest allowed voting period (seconds, inclusive)
    pub min_voting_period: u64,
    /// Longest allowed voting period (seconds, inclusive)
    pub max_voting_period: u64,
    /// Seconds a proposal waits in `Pending` before voting opens
    pub voting_delay: u64,
    /// Maximum description length in bytes
    pub max_description_len: usize,
    /// Bound on the delegation cycle-check walk
    pub max_delegation_depth: usize,
    /// How credits map to cost and applied weight
    pub vote_weighting: VoteWeighting,
}

impl Default for GovernanceParams {
    fn default() -> Self {
        Self {
            quorum: QuorumRule::Absolute(10),
            passing_threshold_percent: 51,
            proposal_stake_threshold: 100,
            proposal_deposit: 0,
            min_voting_period: 3_600,       // 1 hour
            max_voting_period: 2_592_000,   // 30 days
            voting_delay: 0,
            max_description_len: 1_000,
            max_delegation_depth: 16,
            vote_weighting: VoteWeighting::Linear,
        }
    }
}

impl GovernanceParams {
    /// Whether proposals must carry a deposit.
    pub fn deposits_enabled(&self) -> bool {
        self.proposal_deposit > 0
    }

    /// Validate the whole parameter set.
    pub fn validate(&self) -> Result<()> {
        self.quorum.validate()?;

        if !(1..=100).contains(&self.passing_threshold_percent) {
            return Err(GovernanceError::InvalidParameter(format!(
                "passing threshold must be within 1..=100, got {}",
                self.passing_threshold_percent
            )));
        }

        if self.min_voting_period == 0 {
            return Err(GovernanceError::InvalidParameter(
                "minimum voting period cannot be 0".to_string(),
            ));
        }

        if self.min_voting_period > self.max_voting_period {
            return Err(GovernanceError::InvalidParameter(format!(
                "minimum voting period {} exceeds maximum {}",
                self.min_voting_period, self.max_voting_period
            )));
        }

        if self.max_delegation_depth == 0 {
            return Err(GovernanceError::InvalidParameter(
                "delegation depth cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}
