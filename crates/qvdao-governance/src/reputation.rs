//! Advisory reputation scores.
//!
//! Scores reward participation and alignment with outcomes and decay
//! linearly towards a baseline. Nothing in the ledger reads them back to
//! decide weight, eligibility or outcomes.

use serde::{Deserialize, Serialize};

use crate::membership::Member;
use qvdao_types::{Timestamp, SECONDS_PER_DAY};

/// Reward and decay constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationParams {
    /// Starting score and decay floor
    pub baseline: u64,
    /// Granted for casting any vote
    pub participation_reward: u64,
    /// Granted to voters on the winning side at finalization
    pub alignment_reward: u64,
    /// Granted to the proposer of a succeeded proposal
    pub proposer_bonus: u64,
    /// Granted to a member receiving a delegation
    pub delegate_trust_reward: u64,
    /// Granted to a member delegating
    pub delegator_credit: u64,
    /// Points lost per whole day without an update
    pub decay_per_day: u64,
}

impl Default for ReputationParams {
    fn default() -> Self {
        Self {
            baseline: 100,
            participation_reward: 1,
            alignment_reward: 5,
            proposer_bonus: 20,
            delegate_trust_reward: 2,
            delegator_credit: 1,
            decay_per_day: 1,
        }
    }
}

/// Why a member's reputation changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReputationEvent {
    Voted,
    AlignedWithOutcome,
    ProposalSucceeded,
    ReceivedDelegation,
    Delegated,
}

/// Applies [`ReputationParams`] to members.
#[derive(Debug, Clone, Default)]
pub struct ReputationTracker {
    params: ReputationParams,
}

impl ReputationTracker {
    pub fn new(params: ReputationParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ReputationParams {
        &self.params
    }

    pub fn baseline(&self) -> u64 {
        self.params.baseline
    }

    /// Score after decay, without touching the member.
    pub fn decayed_score(&self, member: &Member, now: Timestamp) -> u64 {
        let days = now.saturating_sub(member.last_reputation_update) / SECONDS_PER_DAY;
        let decay = days.saturating_mul(self.params.decay_per_day);
        member
            .reputation_score
            .saturating_sub(decay)
            .max(self.params.baseline.min(member.reputation_score))
    }

    /// Decay the member to `now`, then add the reward for `event`.
    pub fn record(&self, member: &mut Member, event: ReputationEvent, now: Timestamp) {
        let reward = match event {
            ReputationEvent::Voted => self.params.participation_reward,
            ReputationEvent::AlignedWithOutcome => self.params.alignment_reward,
            ReputationEvent::ProposalSucceeded => self.params.proposer_bonus,
            ReputationEvent::ReceivedDelegation => self.params.delegate_trust_reward,
            ReputationEvent::Delegated => self.params.delegator_credit,
        };

        member.reputation_score = self.decayed_score(member, now).saturating_add(reward);
        member.last_reputation_update = now.max(member.last_reputation_update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qvdao_types::Address;

    fn member(score: u64, updated: Timestamp) -> Member {
        Member {
            address: Address::from_label("alice"),
            staked_amount: 100,
            own_voting_weight: 10,
            delegated_in_weight: 0,
            delegate: None,
            joined_at: 0,
            reputation_score: score,
            last_reputation_update: updated,
        }
    }

    #[test]
    fn test_rewards() {
        let tracker = ReputationTracker::default();
        let mut m = member(100, 0);

        tracker.record(&mut m, ReputationEvent::Voted, 10);
        assert_eq!(m.reputation_score, 101);
        tracker.record(&mut m, ReputationEvent::ProposalSucceeded, 20);
        assert_eq!(m.reputation_score, 121);
        assert_eq!(m.last_reputation_update, 20);
    }

    #[test]
    fn test_linear_decay_floors_at_baseline() {
        let tracker = ReputationTracker::default();
        let m = member(130, 0);

        assert_eq!(tracker.decayed_score(&m, SECONDS_PER_DAY - 1), 130);
        assert_eq!(tracker.decayed_score(&m, 10 * SECONDS_PER_DAY), 120);
        assert_eq!(tracker.decayed_score(&m, 365 * SECONDS_PER_DAY), 100);
    }

    #[test]
    fn test_decay_applied_before_reward() {
        let tracker = ReputationTracker::default();
        let mut m = member(130, 0);

        tracker.record(&mut m, ReputationEvent::AlignedWithOutcome, 10 * SECONDS_PER_DAY);
        assert_eq!(m.reputation_score, 125);
    }
}
