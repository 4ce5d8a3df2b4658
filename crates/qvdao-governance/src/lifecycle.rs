//! Proposal lifecycle: creation, voting, finalization, cancellation and
//! treasury execution.

use serde::Deserialize;

use crate::custody::{AssetCustody, Disburser};
use crate::error::{GovernanceError, Result};
use crate::events::GovernanceEvent;
use crate::guard::EntryPoint;
use crate::ledger::GovernanceLedger;
use crate::proposal::{
    NewProposal, Proposal, ProposalOutcome, ProposalState, TreasuryTransfer, VoteRecord,
    VoteSupport,
};
use crate::reputation::ReputationEvent;
use crate::treasury::{TransactionType, TreasuryCheckpoint};
use qvdao_types::{Address, Amount, ProposalId, Timestamp, Weight};

/// What a proposer submits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProposalDraft {
    pub description: String,
    /// Voting period in seconds
    pub voting_period: u64,
    /// Must equal the configured deposit, or 0 when deposits are disabled
    pub deposit: Amount,
    pub transfer: Option<TreasuryTransfer>,
}

impl ProposalDraft {
    pub fn new(description: impl Into<String>, voting_period: u64) -> Self {
        Self {
            description: description.into(),
            voting_period,
            ..Self::default()
        }
    }

    pub fn with_deposit(mut self, deposit: Amount) -> Self {
        self.deposit = deposit;
        self
    }

    pub fn with_transfer(mut self, recipient: Address, amount: Amount) -> Self {
        self.transfer = Some(TreasuryTransfer { recipient, amount });
        self
    }
}

impl<C: AssetCustody> GovernanceLedger<C> {
    /// Create a proposal. Returns its id.
    pub fn create_proposal(
        &mut self,
        caller: Address,
        draft: ProposalDraft,
        now: Timestamp,
    ) -> Result<ProposalId> {
        self.begin(now)?;

        let have = self.members.stake_of(&caller);
        let need = Amount::from(self.params.proposal_stake_threshold);
        if have < need {
            return Err(GovernanceError::InsufficientStake { have, need });
        }

        let (min, max) = (self.params.min_voting_period, self.params.max_voting_period);
        if draft.voting_period < min || draft.voting_period > max {
            return Err(GovernanceError::InvalidVotingPeriod {
                period: draft.voting_period,
                min,
                max,
            });
        }

        if draft.description.len() > self.params.max_description_len {
            return Err(GovernanceError::DescriptionTooLong {
                len: draft.description.len(),
                max: self.params.max_description_len,
            });
        }

        let required = Amount::from(self.params.proposal_deposit);
        if draft.deposit != required {
            return Err(GovernanceError::InvalidAmount(if self.params.deposits_enabled() {
                format!("deposit must be exactly {}, got {}", required, draft.deposit)
            } else {
                "deposits are disabled".to_string()
            }));
        }

        if let Some(transfer) = &draft.transfer {
            if transfer.recipient.is_zero() {
                return Err(GovernanceError::InvalidAmount(
                    "transfer recipient cannot be the zero address".to_string(),
                ));
            }
            if transfer.amount == 0 {
                return Err(GovernanceError::InvalidAmount(
                    "transfer amount must be positive".to_string(),
                ));
            }
        }

        let voting_starts_at = now
            .checked_add(self.params.voting_delay)
            .ok_or_else(|| GovernanceError::overflow("voting start"))?;
        let voting_deadline = voting_starts_at
            .checked_add(draft.voting_period)
            .ok_or_else(|| GovernanceError::overflow("voting deadline"))?;
        let escrowed = self
            .escrowed_deposits
            .checked_add(draft.deposit)
            .ok_or_else(|| GovernanceError::overflow("escrowed deposits"))?;

        if draft.deposit > 0 {
            self.custody.pull(&caller, draft.deposit)?;
        }
        self.escrowed_deposits = escrowed;

        let id = self.proposals.create(NewProposal {
            proposer: caller,
            description: draft.description,
            created_at: now,
            voting_starts_at,
            voting_deadline,
            deposit_amount: draft.deposit,
            transfer: draft.transfer,
            total_weight_snapshot: self.members.total_weight(),
        });

        tracing::info!(
            "Proposal #{} created by {} (voting {}..{})",
            id,
            caller.short(),
            voting_starts_at,
            voting_deadline
        );
        self.events.emit(
            now,
            GovernanceEvent::ProposalCreated {
                id,
                proposer: caller,
                voting_deadline,
                deposit: draft.deposit,
                transfer: draft.transfer,
            },
        );
        Ok(id)
    }

    /// Withdraw a proposal while voting is still open. Proposer or owner only.
    pub fn cancel_proposal(&mut self, caller: Address, id: ProposalId, now: Timestamp) -> Result<()> {
        self.begin(now)?;

        let proposal = self.proposals.require(id)?;
        if caller != proposal.proposer && !self.ownership.is_owner(&caller) {
            return Err(GovernanceError::NotAuthorized(
                "only the proposer or owner can cancel".to_string(),
            ));
        }
        let from = proposal.state;
        if !matches!(from, ProposalState::Pending | ProposalState::Active) {
            return Err(GovernanceError::InvalidState(from));
        }
        // Once voting has closed the outcome is fixed; only finalize may settle the deposit
        if now >= proposal.voting_deadline {
            return Err(GovernanceError::VotingClosed);
        }
        let (proposer, deposit) = (proposal.proposer, proposal.deposit_amount);

        if deposit > 0 {
            self.custody.push(&proposer, deposit)?;
            self.escrowed_deposits -= deposit;
        }

        let proposal = self.proposals.require_mut(id)?;
        proposal.transition(ProposalState::Canceled)?;
        proposal.outcome = Some(ProposalOutcome::Canceled);
        proposal.canceled_at = Some(now);

        tracing::info!("Proposal #{} canceled by {}", id, caller.short());
        self.events.emit(
            now,
            GovernanceEvent::ProposalStateChanged {
                id,
                from,
                to: ProposalState::Canceled,
            },
        );
        Ok(())
    }

    /// Spend `credits` on `id`. Returns the weight added to the tally.
    pub fn vote(
        &mut self,
        caller: Address,
        id: ProposalId,
        support: VoteSupport,
        credits: u128,
        now: Timestamp,
    ) -> Result<Weight> {
        self.begin(now)?;

        let proposal = self.proposals.require(id)?;
        proposal.check_vote(&caller, now)?;
        if credits == 0 {
            return Err(GovernanceError::InvalidAmount(
                "must cast at least one vote credit".to_string(),
            ));
        }

        let (available, lenders) = self.uncounted_weight(proposal, &caller);
        let weighting = self.params.vote_weighting;
        let cost = weighting
            .cost(credits)
            .ok_or(GovernanceError::InsufficientVotingPower {
                cost: u128::MAX,
                available,
            })?;
        if cost > available {
            return Err(GovernanceError::InsufficientVotingPower { cost, available });
        }
        let weight = weighting.applied_weight(credits);

        let proposal = self.proposals.require_mut(id)?;
        proposal.cast_vote(VoteRecord {
            proposal_id: id,
            voter: caller,
            credits,
            support,
            weight_applied: weight,
            timestamp: now,
        })?;
        proposal.counted_weight_of.extend(lenders);
        self.reward(&caller, ReputationEvent::Voted, now);

        tracing::debug!(
            "{} voted {:?} on #{} with {} credits (cost {}, weight {})",
            caller.short(),
            support,
            id,
            credits,
            cost,
            weight
        );
        self.events.emit(
            now,
            GovernanceEvent::Voted {
                id,
                voter: caller,
                support,
                credits,
                weight,
            },
        );
        Ok(weight)
    }

    /// Weight `voter` may still spend on `proposal`, and the delegators whose
    /// own weight it includes.
    ///
    /// Own weight that already reached the tally, either through its owner's
    /// vote or through a delegate's, is left out.
    fn uncounted_weight(&self, proposal: &Proposal, voter: &Address) -> (Weight, Vec<Address>) {
        let delegating = self.members.get(voter).map_or(true, |m| m.is_delegating());
        if delegating {
            return (0, Vec::new());
        }

        let own_weight = |member: &Address| {
            self.members
                .get(member)
                .map_or(0, |m| m.own_voting_weight)
        };
        let mut available = if proposal.weight_counted(voter) {
            0
        } else {
            own_weight(voter)
        };
        let mut lenders = Vec::new();
        for lender in self.delegations.get_delegators(voter) {
            if !proposal.weight_counted(&lender) {
                available = available.saturating_add(own_weight(&lender));
                lenders.push(lender);
            }
        }
        (available, lenders)
    }

    /// Close voting on `id` and decide it. Anyone may call once the
    /// deadline has passed.
    pub fn finalize_proposal(&mut self, id: ProposalId, now: Timestamp) -> Result<ProposalState> {
        self.begin(now)?;

        let proposal = self.proposals.require(id)?;
        proposal.check_finalize(now)?;
        let tally = proposal.tally(&self.params);
        let next = tally.state();
        let (proposer, deposit) = (proposal.proposer, proposal.deposit_amount);

        // Deposit leaves escrow: back to the proposer, or into the treasury
        if deposit > 0 {
            match next {
                ProposalState::Succeeded => self.custody.push(&proposer, deposit)?,
                _ => {
                    self.treasury.check_credit(deposit)?;
                    self.treasury.credit(
                        TransactionType::ForfeitedDeposit,
                        deposit,
                        proposer,
                        Some(id),
                        now,
                    );
                }
            }
            self.escrowed_deposits -= deposit;
        }

        let proposal = self.proposals.require_mut(id)?;
        proposal.transition(next)?;
        proposal.outcome = Some(tally.outcome);
        proposal.finalized_at = Some(now);
        let aligned = proposal.aligned_voters();

        for voter in &aligned {
            self.reward(voter, ReputationEvent::AlignedWithOutcome, now);
        }
        if next == ProposalState::Succeeded {
            self.reward(&proposer, ReputationEvent::ProposalSucceeded, now);
        }

        tracing::info!(
            "Proposal #{} finalized: {:?} ({} of {} required weight)",
            id,
            tally.outcome,
            tally.total_votes,
            tally.required_quorum
        );
        self.events.emit(
            now,
            GovernanceEvent::ProposalStateChanged {
                id,
                from: ProposalState::Active,
                to: next,
            },
        );
        Ok(next)
    }

    /// Execute a succeeded proposal, disbursing its transfer if it has one.
    ///
    /// The proposal is marked executed and the treasury debited before the
    /// disburser runs. If the disburser fails, both are restored and the
    /// proposal can be executed again.
    pub fn execute_proposal(
        &mut self,
        caller: Address,
        id: ProposalId,
        disburser: &mut dyn Disburser<C>,
        now: Timestamp,
    ) -> Result<()> {
        // State first, so a nested call for the same proposal reports
        // AlreadyExecuted rather than ReentrantCall
        match self.proposals.require(id)?.state {
            ProposalState::Succeeded => {}
            ProposalState::Executed => return Err(GovernanceError::AlreadyExecuted),
            state @ (ProposalState::Pending | ProposalState::Active) => {
                return Err(GovernanceError::NotFinalized(state))
            }
            state => return Err(GovernanceError::InvalidState(state)),
        }
        self.begin(now)?;

        let transfer = self.proposals.require(id)?.transfer;
        if let Some(t) = transfer {
            self.treasury.check_disburse(t.amount)?;
        }

        let checkpoint = self.treasury.checkpoint();
        let proposal = self.proposals.require_mut(id)?;
        proposal.transition(ProposalState::Executed)?;
        proposal.executed_at = Some(now);

        if let Some(t) = transfer {
            if let Err(e) = self.treasury.disburse(t.recipient, t.amount, id, now) {
                self.rollback_execution(id, checkpoint);
                return Err(e);
            }

            if let Err(e) = self.guard.enter(EntryPoint::ExecuteProposal(id)) {
                self.rollback_execution(id, checkpoint);
                return Err(e);
            }
            let result = disburser.disburse(self, t.recipient, t.amount);
            self.guard.exit();

            if let Err(e) = result {
                self.rollback_execution(id, checkpoint);
                tracing::warn!("Proposal #{} disbursement failed: {}", id, e);
                return Err(e.into());
            }
        }

        tracing::info!("Proposal #{} executed by {}", id, caller.short());
        self.events.emit(
            now,
            GovernanceEvent::ProposalStateChanged {
                id,
                from: ProposalState::Succeeded,
                to: ProposalState::Executed,
            },
        );
        self.events.emit(
            now,
            GovernanceEvent::ProposalExecuted {
                id,
                executor: caller,
                transfer,
            },
        );
        Ok(())
    }

    fn rollback_execution(&mut self, id: ProposalId, checkpoint: TreasuryCheckpoint) {
        self.treasury.restore(checkpoint);
        if let Some(proposal) = self.proposals.get_mut(id) {
            proposal.revert_execution();
        }
    }

    // ---- queries ----

    pub fn get_proposal(&self, id: ProposalId) -> Option<&Proposal> {
        self.proposals.get(id)
    }

    /// Proposals in id order, optionally filtered by state.
    pub fn list_proposals(&self, state: Option<ProposalState>) -> Vec<&Proposal> {
        self.proposals.list(state)
    }

    pub fn proposal_count(&self) -> usize {
        self.proposals.count()
    }

    pub fn get_votes(&self, id: ProposalId) -> Result<&[VoteRecord]> {
        Ok(&self.proposals.require(id)?.votes)
    }

    pub fn get_vote(&self, id: ProposalId, voter: &Address) -> Option<&VoteRecord> {
        self.proposals.get(id)?.vote_of(voter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::{CustodyPayout, Vault};
    use crate::params::{GovernanceParams, QuorumRule};
    use crate::reputation::ReputationParams;

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    const DAY: u64 = 86_400;
    const HOUR: u64 = 3_600;

    // Three voters with weight 10 can each put 3 credits in
    fn params() -> GovernanceParams {
        GovernanceParams {
            quorum: QuorumRule::Absolute(6),
            ..GovernanceParams::default()
        }
    }

    fn ledger_with(params: GovernanceParams) -> GovernanceLedger<Vault> {
        let mut vault = Vault::new();
        for name in ["alice", "bob", "carol"] {
            vault.credit(addr(name), 10_000);
        }
        let mut ledger =
            GovernanceLedger::new(addr("owner"), params, ReputationParams::default(), vault)
                .unwrap();
        ledger.stake(addr("alice"), 150, 0).unwrap();
        ledger.stake(addr("bob"), 100, 0).unwrap();
        ledger.stake(addr("carol"), 100, 0).unwrap();
        ledger
    }

    fn ledger() -> GovernanceLedger<Vault> {
        ledger_with(params())
    }

    #[test]
    fn test_create_requires_stake() {
        let mut ledger = ledger();
        ledger.unstake(addr("bob"), 1, 1).unwrap();
        assert_eq!(
            ledger.create_proposal(addr("bob"), ProposalDraft::new("x", DAY), 2),
            Err(GovernanceError::InsufficientStake { have: 99, need: 100 })
        );
        assert_eq!(
            ledger.create_proposal(addr("alice"), ProposalDraft::new("x", DAY), 2),
            Ok(1)
        );
    }

    #[test]
    fn test_create_validates_draft() {
        let mut ledger = ledger();
        let alice = addr("alice");

        assert!(matches!(
            ledger.create_proposal(alice, ProposalDraft::new("x", 60), 1),
            Err(GovernanceError::InvalidVotingPeriod { .. })
        ));
        assert!(matches!(
            ledger.create_proposal(alice, ProposalDraft::new("x".repeat(1_001), DAY), 1),
            Err(GovernanceError::DescriptionTooLong { len: 1_001, max: 1_000 })
        ));
        assert!(matches!(
            ledger.create_proposal(alice, ProposalDraft::new("x", DAY).with_deposit(5), 1),
            Err(GovernanceError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.create_proposal(alice, ProposalDraft::new("x", DAY).with_transfer(Address::ZERO, 5), 1),
            Err(GovernanceError::InvalidAmount(_))
        ));
        assert_eq!(ledger.proposal_count(), 0);
    }

    #[test]
    fn test_voting_delay_keeps_pending() {
        let mut ledger = ledger_with(GovernanceParams {
            voting_delay: 100,
            ..params()
        });
        let id = ledger
            .create_proposal(addr("alice"), ProposalDraft::new("x", DAY), 10)
            .unwrap();
        assert_eq!(ledger.get_proposal(id).unwrap().state, ProposalState::Pending);
        assert_eq!(
            ledger.vote(addr("bob"), id, VoteSupport::For, 1, 50),
            Err(GovernanceError::VotingNotStarted)
        );

        ledger.vote(addr("bob"), id, VoteSupport::For, 1, 110).unwrap();
        assert_eq!(ledger.get_proposal(id).unwrap().state, ProposalState::Active);
    }

    #[test]
    fn test_vote_budget() {
        let mut ledger = ledger();
        let id = ledger
            .create_proposal(addr("alice"), ProposalDraft::new("x", DAY), 1)
            .unwrap();

        // bob has weight 10: 3 credits cost 9, 4 would cost 16
        assert_eq!(
            ledger.vote(addr("bob"), id, VoteSupport::For, 4, 2),
            Err(GovernanceError::InsufficientVotingPower { cost: 16, available: 10 })
        );
        assert_eq!(ledger.vote(addr("bob"), id, VoteSupport::For, 3, 2), Ok(3));
        assert_eq!(
            ledger.vote(addr("bob"), id, VoteSupport::For, 1, 3),
            Err(GovernanceError::AlreadyVoted)
        );
        assert!(matches!(
            ledger.vote(addr("carol"), id, VoteSupport::For, 0, 3),
            Err(GovernanceError::InvalidAmount(_))
        ));
        assert_eq!(ledger.get_vote(id, &addr("bob")).map(|v| v.credits), Some(3));
    }

    #[test]
    fn test_sqrt_credit_weighting() {
        let mut ledger = ledger_with(GovernanceParams {
            vote_weighting: crate::voting::VoteWeighting::SqrtCredits,
            ..params()
        });
        let id = ledger
            .create_proposal(addr("alice"), ProposalDraft::new("x", DAY), 1)
            .unwrap();
        assert_eq!(ledger.vote(addr("bob"), id, VoteSupport::For, 9, 2), Ok(3));
    }

    #[test]
    fn test_finalize_before_deadline() {
        let mut ledger = ledger();
        let id = ledger
            .create_proposal(addr("alice"), ProposalDraft::new("x", DAY), 1)
            .unwrap();
        assert_eq!(
            ledger.finalize_proposal(id, DAY),
            Err(GovernanceError::VotingStillOpen { deadline: DAY + 1 })
        );
        assert_eq!(ledger.finalize_proposal(id, DAY + 2), Ok(ProposalState::Defeated));
        assert_eq!(
            ledger.finalize_proposal(id, DAY + 3),
            Err(GovernanceError::AlreadyFinalized(ProposalState::Defeated))
        );
    }

    #[test]
    fn test_cancel() {
        let mut ledger = ledger();
        let id = ledger
            .create_proposal(addr("alice"), ProposalDraft::new("x", DAY), 1)
            .unwrap();

        assert!(matches!(
            ledger.cancel_proposal(addr("bob"), id, 2),
            Err(GovernanceError::NotAuthorized(_))
        ));
        ledger.cancel_proposal(addr("owner"), id, 2).unwrap();
        assert_eq!(ledger.get_proposal(id).unwrap().state, ProposalState::Canceled);
        assert_eq!(
            ledger.cancel_proposal(addr("alice"), id, 3),
            Err(GovernanceError::InvalidState(ProposalState::Canceled))
        );
        assert_eq!(
            ledger.vote(addr("bob"), id, VoteSupport::For, 1, 3),
            Err(GovernanceError::VotingClosed)
        );
    }

    #[test]
    fn test_deposit_refunded_on_success() {
        let mut ledger = ledger_with(GovernanceParams {
            proposal_deposit: 50,
            ..params()
        });
        let id = ledger
            .create_proposal(addr("alice"), ProposalDraft::new("x", DAY).with_deposit(50), 1)
            .unwrap();
        assert_eq!(ledger.escrowed_deposits(), 50);
        assert_eq!(ledger.custody().balance_of(&addr("alice")), 10_000 - 150 - 50);

        ledger.vote(addr("bob"), id, VoteSupport::For, 3, 2).unwrap();
        ledger.vote(addr("carol"), id, VoteSupport::For, 3, 2).unwrap();
        assert_eq!(ledger.finalize_proposal(id, DAY + 2), Ok(ProposalState::Succeeded));

        assert_eq!(ledger.escrowed_deposits(), 0);
        assert_eq!(ledger.custody().balance_of(&addr("alice")), 10_000 - 150);
        assert_eq!(ledger.treasury_balance(), 0);
    }

    #[test]
    fn test_deposit_forfeited_on_defeat() {
        let mut ledger = ledger_with(GovernanceParams {
            proposal_deposit: 50,
            ..params()
        });
        let id = ledger
            .create_proposal(addr("alice"), ProposalDraft::new("x", DAY).with_deposit(50), 1)
            .unwrap();
        assert_eq!(ledger.finalize_proposal(id, DAY + 2), Ok(ProposalState::Defeated));

        assert_eq!(ledger.escrowed_deposits(), 0);
        assert_eq!(ledger.treasury_balance(), 50);
        assert_eq!(
            ledger.treasury().history()[0].tx_type,
            TransactionType::ForfeitedDeposit
        );
    }

    #[test]
    fn test_execute_transfer() {
        let mut ledger = ledger();
        ledger.fund_treasury(addr("carol"), 500, 0).unwrap();
        let id = ledger
            .create_proposal(
                addr("alice"),
                ProposalDraft::new("grant", DAY).with_transfer(addr("dave"), 200),
                1,
            )
            .unwrap();
        ledger.vote(addr("bob"), id, VoteSupport::For, 3, 2).unwrap();
        ledger.vote(addr("carol"), id, VoteSupport::For, 3, 2).unwrap();

        assert_eq!(
            ledger.execute_proposal(addr("bob"), id, &mut CustodyPayout, 3),
            Err(GovernanceError::NotFinalized(ProposalState::Active))
        );
        ledger.finalize_proposal(id, DAY + 2).unwrap();
        ledger
            .execute_proposal(addr("bob"), id, &mut CustodyPayout, DAY + 3)
            .unwrap();

        assert_eq!(ledger.treasury_balance(), 300);
        assert_eq!(ledger.custody().balance_of(&addr("dave")), 200);
        assert_eq!(
            ledger.execute_proposal(addr("bob"), id, &mut CustodyPayout, DAY + 4),
            Err(GovernanceError::AlreadyExecuted)
        );
    }

    #[test]
    fn test_execute_defeated_is_invalid() {
        let mut ledger = ledger();
        let id = ledger
            .create_proposal(addr("alice"), ProposalDraft::new("x", DAY), 1)
            .unwrap();
        ledger.finalize_proposal(id, DAY + 2).unwrap();
        assert_eq!(
            ledger.execute_proposal(addr("bob"), id, &mut CustodyPayout, DAY + 3),
            Err(GovernanceError::InvalidState(ProposalState::Defeated))
        );
    }

    #[test]
    fn test_aligned_voters_rewarded() {
        let mut ledger = ledger();
        let id = ledger
            .create_proposal(addr("alice"), ProposalDraft::new("x", HOUR), 1)
            .unwrap();
        ledger.vote(addr("bob"), id, VoteSupport::For, 3, 2).unwrap();
        ledger.vote(addr("carol"), id, VoteSupport::Against, 1, 2).unwrap();
        ledger.finalize_proposal(id, HOUR + 2).unwrap();

        // baseline 100, +1 participation, +5 alignment
        assert_eq!(ledger.get_reputation(&addr("bob"), HOUR + 2), Some(106));
        assert_eq!(ledger.get_reputation(&addr("carol"), HOUR + 2), Some(101));
        // proposer bonus
        assert_eq!(ledger.get_reputation(&addr("alice"), HOUR + 2), Some(120));
    }
}
