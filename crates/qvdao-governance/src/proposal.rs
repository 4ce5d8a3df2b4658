//! Proposal lifecycle management.
//!
//! Proposals go through states: Pending -> Active -> Succeeded/Defeated -> Executed,
//! with Canceled reachable from Pending or Active. Transitions never go back.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::{GovernanceError, Result};
use crate::params::GovernanceParams;
use qvdao_types::{Address, Amount, ProposalId, Timestamp, Weight};

/// Proposal status in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProposalState {
    /// Created, waiting for voting to start
    Pending,
    /// Voting is open
    Active,
    /// Withdrawn by the proposer or the owner
    Canceled,
    /// Voting ended without passing
    Defeated,
    /// Voting ended, proposal passed
    Succeeded,
    /// Passed and carried out
    Executed,
}

impl ProposalState {
    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: ProposalState) -> bool {
        use ProposalState::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Canceled)
                | (Active, Canceled)
                | (Active, Succeeded)
                | (Active, Defeated)
                | (Succeeded, Executed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalState::Canceled | ProposalState::Defeated | ProposalState::Executed
        )
    }

    /// Voting has ended one way or another.
    pub fn is_finalized(&self) -> bool {
        !matches!(self, ProposalState::Pending | ProposalState::Active)
    }
}

/// Why a proposal left the voting phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProposalOutcome {
    Passed,
    QuorumNotReached,
    ThresholdNotReached,
    Canceled,
}

/// Vote support options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteSupport {
    For,
    Against,
}

impl From<bool> for VoteSupport {
    fn from(support: bool) -> Self {
        if support {
            VoteSupport::For
        } else {
            VoteSupport::Against
        }
    }
}

/// Funds a proposal directs out of the treasury when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct TreasuryTransfer {
    pub recipient: Address,
    pub amount: Amount,
}

/// Append-only record of a single vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteRecord {
    pub proposal_id: ProposalId,
    pub voter: Address,
    pub credits: u128,
    pub support: VoteSupport,
    pub weight_applied: Weight,
    pub timestamp: Timestamp,
}

/// Result of counting a proposal's votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub total_votes: Weight,
    pub required_quorum: Weight,
    pub outcome: ProposalOutcome,
}

impl Tally {
    pub fn state(&self) -> ProposalState {
        match self.outcome {
            ProposalOutcome::Passed => ProposalState::Succeeded,
            _ => ProposalState::Defeated,
        }
    }
}

/// Governance proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Proposal {
    /// Unique proposal ID
    pub id: ProposalId,
    /// Proposer address
    pub proposer: Address,
    /// Free text, bounded by `max_description_len`
    pub description: String,
    pub created_at: Timestamp,
    /// Equal to `created_at` unless a voting delay is configured
    pub voting_starts_at: Timestamp,
    /// Votes are accepted while `now < voting_deadline`
    pub voting_deadline: Timestamp,
    pub for_weight: Weight,
    pub against_weight: Weight,
    pub state: ProposalState,
    pub outcome: Option<ProposalOutcome>,
    pub voters: BTreeSet<Address>,
    /// Members whose own weight already sits in the tally, directly or
    /// through a delegate's vote
    pub counted_weight_of: BTreeSet<Address>,
    pub votes: Vec<VoteRecord>,
    /// Refundable deposit held in custody
    pub deposit_amount: Amount,
    pub transfer: Option<TreasuryTransfer>,
    /// Total outstanding weight at creation (for percentage quorum)
    pub total_weight_snapshot: Weight,
    pub finalized_at: Option<Timestamp>,
    pub executed_at: Option<Timestamp>,
    pub canceled_at: Option<Timestamp>,
}

impl Proposal {
    /// Move to `next`, enforcing the state machine.
    pub fn transition(&mut self, next: ProposalState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(GovernanceError::InvalidState(self.state));
        }
        self.state = next;
        Ok(())
    }

    /// Undo `Succeeded -> Executed` after a failed disbursement.
    pub(crate) fn revert_execution(&mut self) {
        if self.state == ProposalState::Executed {
            self.state = ProposalState::Succeeded;
            self.executed_at = None;
        }
    }

    pub fn total_votes(&self) -> Weight {
        self.for_weight.saturating_add(self.against_weight)
    }

    /// Check if voter has voted.
    pub fn has_voted(&self, voter: &Address) -> bool {
        self.voters.contains(voter)
    }

    /// Whether `member`'s own weight has already been counted here.
    pub fn weight_counted(&self, member: &Address) -> bool {
        self.counted_weight_of.contains(member)
    }

    pub fn vote_of(&self, voter: &Address) -> Option<&VoteRecord> {
        self.votes.iter().find(|v| &v.voter == voter)
    }

    /// Whether `voter` may vote at `now`, ignoring their weight.
    pub fn check_vote(&self, voter: &Address, now: Timestamp) -> Result<()> {
        match self.state {
            ProposalState::Pending => return Err(GovernanceError::VotingNotStarted),
            ProposalState::Active => {}
            _ => return Err(GovernanceError::VotingClosed),
        }
        if now < self.voting_starts_at {
            return Err(GovernanceError::VotingNotStarted);
        }
        if now >= self.voting_deadline {
            return Err(GovernanceError::VotingClosed);
        }
        if self.has_voted(voter) {
            return Err(GovernanceError::AlreadyVoted);
        }
        Ok(())
    }

    /// Cast a vote.
    pub fn cast_vote(&mut self, record: VoteRecord) -> Result<()> {
        self.check_vote(&record.voter, record.timestamp)?;

        // Compute before touching anything
        let (for_weight, against_weight) = match record.support {
            VoteSupport::For => (
                self.for_weight
                    .checked_add(record.weight_applied)
                    .ok_or_else(|| GovernanceError::overflow("for weight"))?,
                self.against_weight,
            ),
            VoteSupport::Against => (
                self.for_weight,
                self.against_weight
                    .checked_add(record.weight_applied)
                    .ok_or_else(|| GovernanceError::overflow("against weight"))?,
            ),
        };

        self.for_weight = for_weight;
        self.against_weight = against_weight;
        self.voters.insert(record.voter);
        self.counted_weight_of.insert(record.voter);
        self.votes.push(record);
        Ok(())
    }

    /// Whether voting can be closed at `now`.
    pub fn check_finalize(&self, now: Timestamp) -> Result<()> {
        match self.state {
            ProposalState::Pending | ProposalState::Active if now <= self.voting_deadline => {
                Err(GovernanceError::VotingStillOpen {
                    deadline: self.voting_deadline,
                })
            }
            ProposalState::Active => Ok(()),
            // Past the deadline but never activated: nothing was ever votable
            ProposalState::Pending => Err(GovernanceError::InvalidState(self.state)),
            state => Err(GovernanceError::AlreadyFinalized(state)),
        }
    }

    /// Count the votes against quorum and passing threshold.
    pub fn tally(&self, params: &GovernanceParams) -> Tally {
        let total_votes = self.total_votes();
        let required_quorum = params.quorum.required_weight(self.total_weight_snapshot);

        let outcome = if total_votes < required_quorum {
            ProposalOutcome::QuorumNotReached
        } else if total_votes == 0 {
            ProposalOutcome::ThresholdNotReached
        } else {
            let for_percentage = self.for_weight.saturating_mul(100) / total_votes;
            if for_percentage > Weight::from(params.passing_threshold_percent) {
                ProposalOutcome::Passed
            } else {
                ProposalOutcome::ThresholdNotReached
            }
        };

        Tally {
            total_votes,
            required_quorum,
            outcome,
        }
    }

    /// Voters on the winning side of a decided proposal.
    pub fn aligned_voters(&self) -> Vec<Address> {
        let winning = match self.outcome {
            Some(ProposalOutcome::Passed) => VoteSupport::For,
            Some(ProposalOutcome::ThresholdNotReached) => VoteSupport::Against,
            _ => return Vec::new(),
        };
        self.votes
            .iter()
            .filter(|v| v.support == winning)
            .map(|v| v.voter)
            .collect()
    }
}

/// Arguments for a new proposal, already validated by the ledger.
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub proposer: Address,
    pub description: String,
    pub created_at: Timestamp,
    pub voting_starts_at: Timestamp,
    pub voting_deadline: Timestamp,
    pub deposit_amount: Amount,
    pub transfer: Option<TreasuryTransfer>,
    pub total_weight_snapshot: Weight,
}

/// Proposal registry managing all proposals.
#[derive(Debug, Clone)]
pub struct ProposalRegistry {
    proposals: BTreeMap<ProposalId, Proposal>,
    next_id: ProposalId,
}

impl ProposalRegistry {
    pub fn new() -> Self {
        Self {
            proposals: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Id the next created proposal will get.
    pub fn next_id(&self) -> ProposalId {
        self.next_id
    }

    /// Create a new proposal. Starts `Active` unless voting opens later.
    pub fn create(&mut self, new: NewProposal) -> ProposalId {
        let id = self.next_id;
        self.next_id += 1;

        let state = if new.voting_starts_at > new.created_at {
            ProposalState::Pending
        } else {
            ProposalState::Active
        };

        let proposal = Proposal {
            id,
            proposer: new.proposer,
            description: new.description,
            created_at: new.created_at,
            voting_starts_at: new.voting_starts_at,
            voting_deadline: new.voting_deadline,
            for_weight: 0,
            against_weight: 0,
            state,
            outcome: None,
            voters: BTreeSet::new(),
            counted_weight_of: BTreeSet::new(),
            votes: Vec::new(),
            deposit_amount: new.deposit_amount,
            transfer: new.transfer,
            total_weight_snapshot: new.total_weight_snapshot,
            finalized_at: None,
            executed_at: None,
            canceled_at: None,
        };

        self.proposals.insert(id, proposal);
        id
    }

    pub fn get(&self, id: ProposalId) -> Option<&Proposal> {
        self.proposals.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ProposalId) -> Option<&mut Proposal> {
        self.proposals.get_mut(&id)
    }

    /// Look up a proposal or fail with `ProposalNotFound`.
    pub fn require(&self, id: ProposalId) -> Result<&Proposal> {
        self.get(id).ok_or(GovernanceError::ProposalNotFound(id))
    }

    pub(crate) fn require_mut(&mut self, id: ProposalId) -> Result<&mut Proposal> {
        self.proposals
            .get_mut(&id)
            .ok_or(GovernanceError::ProposalNotFound(id))
    }

    /// Proposals in id order, optionally restricted to one state.
    pub fn list(&self, state: Option<ProposalState>) -> Vec<&Proposal> {
        self.proposals
            .values()
            .filter(|p| state.map_or(true, |s| p.state == s))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.proposals.len()
    }

    /// Pending proposals whose voting window has opened.
    pub fn due_for_activation(&self, now: Timestamp) -> Vec<ProposalId> {
        self.proposals
            .values()
            .filter(|p| p.state == ProposalState::Pending && p.voting_starts_at <= now)
            .map(|p| p.id)
            .collect()
    }
}

impl Default for ProposalRegistry {
    fn default() -> Self {
        Self::new()
    }
}
