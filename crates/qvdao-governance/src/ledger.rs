//! The governance ledger: one authoritative state machine over members,
//! delegations, proposals, treasury and ownership.
//!
//! Every mutating operation takes an explicit `now`, runs housekeeping for
//! that instant (expired delegations, proposals whose voting opened), checks
//! its preconditions, performs any custody transfer and only then commits.
//! A failed operation leaves the ledger as housekeeping left it.
//!
//! Proposal lifecycle operations live in [`crate::lifecycle`].

use crate::auth::Ownership;
use crate::custody::AssetCustody;
use crate::delegation::{Delegation, DelegationGraph};
use crate::error::{GovernanceError, Result};
use crate::events::{EventLog, EventObserver, EventRecord, GovernanceEvent, UndelegateReason};
use crate::guard::ReentrancyGuard;
use crate::membership::{Member, MembershipLedger};
use crate::params::{GovernanceParams, QuorumRule};
use crate::proposal::{ProposalRegistry, ProposalState};
use crate::reputation::{ReputationEvent, ReputationParams, ReputationTracker};
use crate::treasury::{TransactionType, Treasury};
use qvdao_types::{Address, Amount, Timestamp, Weight};

/// Governance ledger generic over the asset custody collaborator.
#[derive(Debug)]
pub struct GovernanceLedger<C: AssetCustody> {
    pub(crate) params: GovernanceParams,
    pub(crate) members: MembershipLedger,
    pub(crate) delegations: DelegationGraph,
    pub(crate) reputation: ReputationTracker,
    pub(crate) proposals: ProposalRegistry,
    pub(crate) treasury: Treasury,
    pub(crate) ownership: Ownership,
    pub(crate) events: EventLog,
    pub(crate) guard: ReentrancyGuard,
    pub(crate) custody: C,
    /// Proposal deposits held until finalization
    pub(crate) escrowed_deposits: Amount,
}

impl<C: AssetCustody> GovernanceLedger<C> {
    /// Create a ledger owned by `owner`.
    pub fn new(
        owner: Address,
        params: GovernanceParams,
        reputation: ReputationParams,
        custody: C,
    ) -> Result<Self> {
        if owner.is_zero() {
            return Err(GovernanceError::InvalidParameter(
                "owner cannot be the zero address".to_string(),
            ));
        }
        params.validate()?;

        tracing::info!(
            "Governance ledger created: owner {}, quorum {:?}, threshold {}%",
            owner.short(),
            params.quorum,
            params.passing_threshold_percent
        );

        Ok(Self {
            delegations: DelegationGraph::new().with_max_depth(params.max_delegation_depth),
            params,
            members: MembershipLedger::new(),
            reputation: ReputationTracker::new(reputation),
            proposals: ProposalRegistry::new(),
            treasury: Treasury::new(),
            ownership: Ownership::new(owner),
            events: EventLog::new(),
            guard: ReentrancyGuard::new(),
            custody,
            escrowed_deposits: 0,
        })
    }

    /// Ledger with default parameters.
    pub fn with_defaults(owner: Address, custody: C) -> Result<Self> {
        Self::new(
            owner,
            GovernanceParams::default(),
            ReputationParams::default(),
            custody,
        )
    }

    /// Register an observer for every future event.
    pub fn subscribe(&mut self, observer: impl EventObserver + 'static) {
        self.events.subscribe(Box::new(observer));
    }

    /// Bring time-driven state up to `now`.
    pub fn settle(&mut self, now: Timestamp) -> Result<()> {
        self.begin(now)
    }

    /// Common prologue of every mutating operation.
    pub(crate) fn begin(&mut self, now: Timestamp) -> Result<()> {
        self.guard.check()?;
        self.expire_delegations(now);
        self.activate_proposals(now);
        Ok(())
    }

    fn expire_delegations(&mut self, now: Timestamp) {
        for delegator in self.delegations.expired(now) {
            let Ok(delegation) = self.delegations.remove(&delegator) else {
                continue;
            };
            let weight = self.members.detach_delegate(delegator);
            tracing::debug!(
                "Delegation {} -> {} expired at {}",
                delegator.short(),
                delegation.delegatee.short(),
                now
            );
            self.events.emit(
                now,
                GovernanceEvent::Undelegated {
                    delegator,
                    delegatee: delegation.delegatee,
                    weight,
                    reason: UndelegateReason::Expired,
                },
            );
        }
    }

    fn activate_proposals(&mut self, now: Timestamp) {
        for id in self.proposals.due_for_activation(now) {
            let Some(proposal) = self.proposals.get_mut(id) else {
                continue;
            };
            if proposal.transition(ProposalState::Active).is_ok() {
                tracing::debug!("Proposal #{} voting opened", id);
                self.events.emit(
                    now,
                    GovernanceEvent::ProposalStateChanged {
                        id,
                        from: ProposalState::Pending,
                        to: ProposalState::Active,
                    },
                );
            }
        }
    }

    pub(crate) fn reward(&mut self, address: &Address, event: ReputationEvent, now: Timestamp) {
        if let Some(member) = self.members.get_mut(address) {
            self.reputation.record(member, event, now);
        }
    }

    // ---- staking ----

    /// Stake `amount` for `caller`. Returns the caller's new votable weight.
    pub fn stake(&mut self, caller: Address, amount: Amount, now: Timestamp) -> Result<Weight> {
        self.begin(now)?;

        let change = self.members.prepare_stake(caller, amount)?;
        self.custody.pull(&caller, amount)?;
        self.members.apply(&change, now, self.reputation.baseline());

        if change.is_new_member {
            tracing::info!("New member {}", caller.short());
        }
        tracing::info!(
            "{} staked {} (stake {}, weight {})",
            caller.short(),
            amount,
            change.new_stake,
            change.new_weight
        );
        self.events.emit(
            now,
            GovernanceEvent::Staked {
                member: caller,
                amount,
                total_stake: change.new_stake,
                weight: change.new_weight,
            },
        );
        Ok(self.members.weight_of(&caller))
    }

    /// Withdraw `amount` of `caller`'s stake. Returns the remaining votable weight.
    pub fn unstake(&mut self, caller: Address, amount: Amount, now: Timestamp) -> Result<Weight> {
        self.begin(now)?;

        let change = self.members.prepare_unstake(caller, amount)?;
        self.custody.push(&caller, amount)?;
        self.members.apply(&change, now, self.reputation.baseline());

        tracing::info!(
            "{} unstaked {} (stake {}, weight {})",
            caller.short(),
            amount,
            change.new_stake,
            change.new_weight
        );
        self.events.emit(
            now,
            GovernanceEvent::Unstaked {
                member: caller,
                amount,
                total_stake: change.new_stake,
                weight: change.new_weight,
            },
        );
        Ok(self.members.weight_of(&caller))
    }

    // ---- delegation ----

    /// Delegate `caller`'s own weight to `delegatee`.
    ///
    /// Returns the weight that moved.
    pub fn set_delegate(
        &mut self,
        caller: Address,
        delegatee: Address,
        expires_at: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<Weight> {
        self.begin(now)?;

        if !self.members.contains(&caller) {
            return Err(GovernanceError::NotMember(caller));
        }
        if !delegatee.is_zero() && delegatee != caller && !self.members.contains(&delegatee) {
            return Err(GovernanceError::InvalidDelegate(format!(
                "{} is not a member",
                delegatee.short()
            )));
        }
        if let Some(expiry) = expires_at {
            if expiry <= now {
                return Err(GovernanceError::InvalidDelegate(format!(
                    "expiry {} is not after {}",
                    expiry, now
                )));
            }
        }
        self.delegations.check_new_edge(caller, delegatee)?;

        self.delegations
            .insert(Delegation::new(caller, delegatee, now, expires_at));
        let weight = self.members.attach_delegate(caller, delegatee);
        self.reward(&delegatee, ReputationEvent::ReceivedDelegation, now);
        self.reward(&caller, ReputationEvent::Delegated, now);

        tracing::info!(
            "{} delegated {} to {}",
            caller.short(),
            weight,
            delegatee.short()
        );
        self.events.emit(
            now,
            GovernanceEvent::Delegated {
                delegator: caller,
                delegatee,
                weight,
                expires_at,
            },
        );
        Ok(weight)
    }

    /// Revoke `caller`'s delegation. Returns the weight that came back.
    pub fn undelegate(&mut self, caller: Address, now: Timestamp) -> Result<Weight> {
        self.begin(now)?;

        let delegation = self.delegations.remove(&caller)?;
        let weight = self.members.detach_delegate(caller);

        tracing::info!(
            "{} revoked delegation to {}",
            caller.short(),
            delegation.delegatee.short()
        );
        self.events.emit(
            now,
            GovernanceEvent::Undelegated {
                delegator: caller,
                delegatee: delegation.delegatee,
                weight,
                reason: UndelegateReason::Revoked,
            },
        );
        Ok(weight)
    }

    // ---- treasury ----

    /// Move `amount` from `caller` into the treasury.
    pub fn fund_treasury(&mut self, caller: Address, amount: Amount, now: Timestamp) -> Result<()> {
        self.begin(now)?;

        if amount == 0 {
            return Err(GovernanceError::InvalidAmount(
                "treasury deposit must be positive".to_string(),
            ));
        }
        self.treasury.check_credit(amount)?;
        self.custody.pull(&caller, amount)?;
        self.treasury
            .credit(TransactionType::Deposit, amount, caller, None, now);

        tracing::info!(
            "Treasury funded with {} by {} (balance {})",
            amount,
            caller.short(),
            self.treasury.balance()
        );
        self.events
            .emit(now, GovernanceEvent::TreasuryFunded { from: caller, amount });
        Ok(())
    }

    // ---- administration ----

    /// Set the minimum stake needed to create a proposal.
    pub fn update_proposal_threshold(
        &mut self,
        caller: Address,
        new_threshold: u64,
        now: Timestamp,
    ) -> Result<()> {
        self.begin(now)?;
        self.ownership.authorize(&caller)?;

        let old = self.params.proposal_stake_threshold;
        self.params.proposal_stake_threshold = new_threshold;

        tracing::info!("Proposal threshold {} -> {}", old, new_threshold);
        self.events.emit(
            now,
            GovernanceEvent::ThresholdUpdated {
                old,
                new: new_threshold,
            },
        );
        Ok(())
    }

    /// Switch quorum to a percentage of total weight.
    pub fn update_quorum_percentage(
        &mut self,
        caller: Address,
        percent: u8,
        now: Timestamp,
    ) -> Result<()> {
        self.update_quorum(caller, QuorumRule::Percent(percent), now)
    }

    /// Replace the quorum rule.
    pub fn update_quorum(&mut self, caller: Address, rule: QuorumRule, now: Timestamp) -> Result<()> {
        self.begin(now)?;
        self.ownership.authorize(&caller)?;
        rule.validate()?;

        let old = self.params.quorum;
        self.params.quorum = rule;

        tracing::info!("Quorum {:?} -> {:?}", old, rule);
        self.events
            .emit(now, GovernanceEvent::QuorumUpdated { old, new: rule });
        Ok(())
    }

    /// Replace the whole parameter set.
    pub fn set_governance_parameters(
        &mut self,
        caller: Address,
        params: GovernanceParams,
        now: Timestamp,
    ) -> Result<()> {
        self.begin(now)?;
        let admin = self.ownership.authorize(&caller)?;
        params.validate()?;

        self.delegations.set_max_depth(params.max_delegation_depth);
        self.params = params;

        tracing::info!("Governance parameters updated by {}", admin.owner.short());
        self.events
            .emit(now, GovernanceEvent::ParametersUpdated { by: caller });
        Ok(())
    }

    /// Nominate a new owner. The nominee must accept.
    pub fn transfer_ownership(
        &mut self,
        caller: Address,
        new_owner: Address,
        now: Timestamp,
    ) -> Result<()> {
        self.begin(now)?;
        self.ownership.begin_transfer(&caller, new_owner)?;

        tracing::info!(
            "Ownership transfer started: {} -> {}",
            caller.short(),
            new_owner.short()
        );
        self.events.emit(
            now,
            GovernanceEvent::OwnershipTransferStarted {
                owner: caller,
                pending_owner: new_owner,
            },
        );
        Ok(())
    }

    /// Accept a pending ownership nomination.
    pub fn accept_ownership(&mut self, caller: Address, now: Timestamp) -> Result<()> {
        self.begin(now)?;
        let previous = self.ownership.accept(&caller)?;

        tracing::info!(
            "Ownership transferred: {} -> {}",
            previous.short(),
            caller.short()
        );
        self.events.emit(
            now,
            GovernanceEvent::OwnershipTransferred {
                previous,
                owner: caller,
            },
        );
        Ok(())
    }

    // ---- queries ----

    pub fn params(&self) -> &GovernanceParams {
        &self.params
    }

    pub fn reputation_params(&self) -> &ReputationParams {
        self.reputation.params()
    }

    pub fn owner(&self) -> Address {
        self.ownership.owner()
    }

    pub fn pending_owner(&self) -> Option<Address> {
        self.ownership.pending_owner()
    }

    pub fn get_member(&self, address: &Address) -> Option<&Member> {
        self.members.get(address)
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    pub fn member_count(&self) -> usize {
        self.members.member_count()
    }

    /// Votable weight: own weight unless delegating, plus incoming weight.
    pub fn get_weight(&self, address: &Address) -> Weight {
        self.members.weight_of(address)
    }

    pub fn total_weight(&self) -> Weight {
        self.members.total_weight()
    }

    pub fn total_staked(&self) -> Amount {
        self.members.total_staked()
    }

    pub fn get_delegation(&self, delegator: &Address) -> Option<&Delegation> {
        self.delegations.get_delegation(delegator)
    }

    pub fn get_delegators(&self, delegate: &Address) -> Vec<Address> {
        self.delegations.get_delegators(delegate)
    }

    pub fn get_all_delegators(&self, delegate: &Address) -> Vec<Address> {
        self.delegations.get_all_delegators(delegate)
    }

    pub fn resolve_delegate(&self, address: Address) -> Address {
        self.delegations.resolve_delegate(address)
    }

    /// Reputation decayed to `now`, or `None` for non-members.
    pub fn get_reputation(&self, address: &Address, now: Timestamp) -> Option<u64> {
        self.members
            .get(address)
            .map(|m| self.reputation.decayed_score(m, now))
    }

    pub fn treasury(&self) -> &Treasury {
        &self.treasury
    }

    pub fn treasury_balance(&self) -> Amount {
        self.treasury.balance()
    }

    pub fn escrowed_deposits(&self) -> Amount {
        self.escrowed_deposits
    }

    pub fn events(&self) -> &[EventRecord] {
        self.events.records()
    }

    pub fn events_since(&self, seq: u64) -> &[EventRecord] {
        self.events.since(seq)
    }

    pub fn custody(&self) -> &C {
        &self.custody
    }

    pub fn custody_mut(&mut self) -> &mut C {
        &mut self.custody
    }

    /// Whether an external call is in flight.
    pub fn is_locked(&self) -> bool {
        self.guard.is_locked()
    }

    /// Weight conservation plus agreement between members and the
    /// delegation graph.
    pub fn is_consistent(&self) -> bool {
        if !self.members.weight_conserved() {
            return false;
        }
        let delegating = self.members.iter().filter(|m| m.is_delegating()).count();
        if delegating != self.delegations.edge_count() {
            return false;
        }
        self.members.iter().all(|m| match m.delegate {
            Some(target) => self
                .delegations
                .get_delegation(&m.address)
                .map_or(false, |d| d.delegatee == target),
            None => !self.delegations.is_delegating(&m.address),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::Vault;

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    fn ledger() -> GovernanceLedger<Vault> {
        let vault = Vault::new()
            .with_balance(addr("alice"), 1_000)
            .with_balance(addr("bob"), 1_000)
            .with_balance(addr("carol"), 1_000);
        GovernanceLedger::with_defaults(addr("owner"), vault).unwrap()
    }

    #[test]
    fn test_zero_owner_rejected() {
        let result = GovernanceLedger::with_defaults(Address::ZERO, Vault::new());
        assert!(matches!(result, Err(GovernanceError::InvalidParameter(_))));
    }

    #[test]
    fn test_stake_and_unstake() {
        let mut ledger = ledger();
        assert_eq!(ledger.stake(addr("alice"), 100, 1).unwrap(), 10);
        assert_eq!(ledger.stake(addr("alice"), 21, 2).unwrap(), 11);
        assert_eq!(ledger.custody().held(), 121);

        assert_eq!(ledger.unstake(addr("alice"), 21, 3).unwrap(), 10);
        assert_eq!(ledger.custody().balance_of(&addr("alice")), 900);
        assert_eq!(ledger.total_weight(), 10);
        assert_eq!(ledger.events().len(), 3);
    }

    #[test]
    fn test_failed_pull_changes_nothing() {
        let mut ledger = ledger();
        let err = ledger.stake(addr("dave"), 5, 1).unwrap_err();
        assert!(matches!(err, GovernanceError::TransferFailed(_)));
        assert_eq!(ledger.member_count(), 0);
        assert!(ledger.events().is_empty());
    }

    #[test]
    fn test_delegate_moves_weight() {
        let mut ledger = ledger();
        ledger.stake(addr("alice"), 100, 1).unwrap();
        ledger.stake(addr("bob"), 400, 1).unwrap();

        assert_eq!(ledger.set_delegate(addr("alice"), addr("bob"), None, 2).unwrap(), 10);
        assert_eq!(ledger.get_weight(&addr("alice")), 0);
        assert_eq!(ledger.get_weight(&addr("bob")), 30);
        assert!(ledger.is_consistent());

        assert_eq!(ledger.undelegate(addr("alice"), 3).unwrap(), 10);
        assert_eq!(ledger.get_weight(&addr("bob")), 20);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn test_delegate_requires_members() {
        let mut ledger = ledger();
        ledger.stake(addr("alice"), 100, 1).unwrap();

        assert_eq!(
            ledger.set_delegate(addr("bob"), addr("alice"), None, 2),
            Err(GovernanceError::NotMember(addr("bob")))
        );
        assert!(matches!(
            ledger.set_delegate(addr("alice"), addr("bob"), None, 2),
            Err(GovernanceError::InvalidDelegate(_))
        ));
        assert!(matches!(
            ledger.set_delegate(addr("alice"), addr("alice"), None, 2),
            Err(GovernanceError::InvalidDelegate(_))
        ));
    }

    #[test]
    fn test_stake_while_delegating_follows_delegation() {
        let mut ledger = ledger();
        ledger.stake(addr("alice"), 100, 1).unwrap();
        ledger.stake(addr("bob"), 100, 1).unwrap();
        ledger.set_delegate(addr("alice"), addr("bob"), None, 2).unwrap();

        ledger.stake(addr("alice"), 300, 3).unwrap();
        assert_eq!(ledger.get_weight(&addr("bob")), 30);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn test_expired_delegation_settles() {
        let mut ledger = ledger();
        ledger.stake(addr("alice"), 100, 1).unwrap();
        ledger.stake(addr("bob"), 100, 1).unwrap();
        ledger.set_delegate(addr("alice"), addr("bob"), Some(50), 2).unwrap();

        ledger.settle(49).unwrap();
        assert_eq!(ledger.get_weight(&addr("bob")), 20);

        ledger.settle(50).unwrap();
        assert_eq!(ledger.get_weight(&addr("bob")), 10);
        assert_eq!(ledger.get_weight(&addr("alice")), 10);
        assert!(ledger.get_delegation(&addr("alice")).is_none());
        assert!(matches!(
            ledger.events().last().map(|r| &r.event),
            Some(GovernanceEvent::Undelegated { reason: UndelegateReason::Expired, .. })
        ));
    }

    #[test]
    fn test_delegation_expiry_must_be_future() {
        let mut ledger = ledger();
        ledger.stake(addr("alice"), 100, 1).unwrap();
        ledger.stake(addr("bob"), 100, 1).unwrap();
        assert!(matches!(
            ledger.set_delegate(addr("alice"), addr("bob"), Some(5), 5),
            Err(GovernanceError::InvalidDelegate(_))
        ));
    }

    #[test]
    fn test_admin_operations_require_owner() {
        let mut ledger = ledger();
        assert_eq!(
            ledger.update_proposal_threshold(addr("alice"), 5, 1),
            Err(GovernanceError::NotOwner)
        );
        ledger.update_proposal_threshold(addr("owner"), 5, 1).unwrap();
        assert_eq!(ledger.params().proposal_stake_threshold, 5);

        assert!(matches!(
            ledger.update_quorum_percentage(addr("owner"), 0, 2),
            Err(GovernanceError::InvalidQuorum(_))
        ));
        ledger.update_quorum_percentage(addr("owner"), 20, 2).unwrap();
        assert_eq!(ledger.params().quorum, QuorumRule::Percent(20));
    }

    #[test]
    fn test_parameter_update_validates() {
        let mut ledger = ledger();
        let params = GovernanceParams {
            passing_threshold_percent: 0,
            ..GovernanceParams::default()
        };
        assert!(ledger
            .set_governance_parameters(addr("owner"), params, 1)
            .is_err());

        let params = GovernanceParams {
            max_delegation_depth: 2,
            ..GovernanceParams::default()
        };
        ledger
            .set_governance_parameters(addr("owner"), params, 1)
            .unwrap();
        assert_eq!(ledger.params().max_delegation_depth, 2);
    }

    #[test]
    fn test_fund_treasury() {
        let mut ledger = ledger();
        ledger.fund_treasury(addr("carol"), 250, 1).unwrap();
        assert_eq!(ledger.treasury_balance(), 250);
        assert_eq!(ledger.custody().balance_of(&addr("carol")), 750);
        assert!(matches!(
            ledger.fund_treasury(addr("carol"), 0, 2),
            Err(GovernanceError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_reputation_grows_with_delegation() {
        let mut ledger = ledger();
        ledger.stake(addr("alice"), 100, 1).unwrap();
        ledger.stake(addr("bob"), 100, 1).unwrap();
        ledger.set_delegate(addr("alice"), addr("bob"), None, 2).unwrap();

        assert_eq!(ledger.get_reputation(&addr("bob"), 2), Some(102));
        assert_eq!(ledger.get_reputation(&addr("alice"), 2), Some(101));
        assert_eq!(ledger.get_reputation(&addr("dave"), 2), None);
    }
}
