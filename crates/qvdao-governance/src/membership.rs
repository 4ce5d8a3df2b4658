//! Membership ledger: staked balances and the voting weight they derive.
//!
//! Changes are computed by `prepare_*` (which can fail and never writes)
//! and committed by [`MembershipLedger::apply`] (which cannot fail).

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{GovernanceError, Result};
use crate::voting::weight_for_stake;
use qvdao_types::{Address, Amount, Timestamp, Weight};

/// A participant of the DAO. Never removed once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub address: Address,
    /// Staked balance in the asset's smallest unit
    pub staked_amount: Amount,
    /// Always `floor(sqrt(staked_amount))`, whether delegated or not
    pub own_voting_weight: Weight,
    /// Own weight of the members currently delegating to this one
    pub delegated_in_weight: Weight,
    /// Outgoing delegation target, if any
    pub delegate: Option<Address>,
    pub joined_at: Timestamp,
    pub reputation_score: u64,
    pub last_reputation_update: Timestamp,
}

impl Member {
    fn new(address: Address, joined_at: Timestamp, reputation_baseline: u64) -> Self {
        Self {
            address,
            staked_amount: 0,
            own_voting_weight: 0,
            delegated_in_weight: 0,
            delegate: None,
            joined_at,
            reputation_score: reputation_baseline,
            last_reputation_update: joined_at,
        }
    }

    pub fn is_delegating(&self) -> bool {
        self.delegate.is_some()
    }

    /// Weight this member can vote with right now.
    ///
    /// A delegating member votes with nothing; their own weight is counted
    /// at the delegate.
    pub fn available_weight(&self) -> Weight {
        if self.is_delegating() {
            0
        } else {
            self.own_voting_weight.saturating_add(self.delegated_in_weight)
        }
    }
}

/// A validated stake or unstake, ready to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeChange {
    pub member: Address,
    pub old_stake: Amount,
    pub new_stake: Amount,
    pub old_weight: Weight,
    pub new_weight: Weight,
    /// Delegate whose incoming weight absorbs the weight change
    pub delegate: Option<Address>,
    pub is_new_member: bool,
}

impl StakeChange {
    pub fn amount(&self) -> Amount {
        self.new_stake.abs_diff(self.old_stake)
    }
}

/// All members, keyed by address.
#[derive(Debug, Clone, Default)]
pub struct MembershipLedger {
    members: BTreeMap<Address, Member>,
    total_staked: Amount,
    total_weight: Weight,
}

impl MembershipLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &Address) -> Option<&Member> {
        self.members.get(address)
    }

    pub(crate) fn get_mut(&mut self, address: &Address) -> Option<&mut Member> {
        self.members.get_mut(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.members.contains_key(address)
    }

    /// Members in address order.
    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn total_staked(&self) -> Amount {
        self.total_staked
    }

    /// Sum of `floor(sqrt(stake))` over all members.
    pub fn total_weight(&self) -> Weight {
        self.total_weight
    }

    /// Stake held by `address`, zero for unknown identities.
    pub fn stake_of(&self, address: &Address) -> Amount {
        self.members.get(address).map(|m| m.staked_amount).unwrap_or(0)
    }

    /// Voting weight usable by `address` right now.
    pub fn weight_of(&self, address: &Address) -> Weight {
        self.members.get(address).map(Member::available_weight).unwrap_or(0)
    }

    /// Validate a stake of `amount` by `address`.
    pub fn prepare_stake(&self, address: Address, amount: Amount) -> Result<StakeChange> {
        if amount == 0 {
            return Err(GovernanceError::InvalidAmount("stake must be positive".to_string()));
        }
        if address.is_zero() {
            return Err(GovernanceError::InvalidAmount(
                "cannot stake for the zero address".to_string(),
            ));
        }

        let member = self.members.get(&address);
        let old_stake = member.map(|m| m.staked_amount).unwrap_or(0);
        let new_stake = old_stake
            .checked_add(amount)
            .ok_or_else(|| GovernanceError::overflow("stake"))?;
        self.total_staked
            .checked_add(amount)
            .ok_or_else(|| GovernanceError::overflow("total stake"))?;

        Ok(StakeChange {
            member: address,
            old_stake,
            new_stake,
            old_weight: weight_for_stake(old_stake),
            new_weight: weight_for_stake(new_stake),
            delegate: member.and_then(|m| m.delegate),
            is_new_member: member.is_none(),
        })
    }

    /// Validate an unstake of `amount` by `address`.
    pub fn prepare_unstake(&self, address: Address, amount: Amount) -> Result<StakeChange> {
        if amount == 0 {
            return Err(GovernanceError::InvalidAmount("unstake must be positive".to_string()));
        }

        let have = self.stake_of(&address);
        if amount > have {
            return Err(GovernanceError::InsufficientStake { have, need: amount });
        }

        // `have > 0` here, so the member exists
        let delegate = self.members.get(&address).and_then(|m| m.delegate);
        let new_stake = have - amount;

        Ok(StakeChange {
            member: address,
            old_stake: have,
            new_stake,
            old_weight: weight_for_stake(have),
            new_weight: weight_for_stake(new_stake),
            delegate,
            is_new_member: false,
        })
    }

    /// Commit a prepared change.
    ///
    /// When the member is delegating, the weight difference moves with the
    /// delegation and lands on the delegate's incoming weight.
    pub fn apply(&mut self, change: &StakeChange, now: Timestamp, reputation_baseline: u64) {
        let member = self
            .members
            .entry(change.member)
            .or_insert_with(|| Member::new(change.member, now, reputation_baseline));
        member.staked_amount = change.new_stake;
        member.own_voting_weight = change.new_weight;

        if change.new_stake >= change.old_stake {
            self.total_staked += change.amount();
        } else {
            self.total_staked -= change.amount();
        }
        self.total_weight = self.total_weight - change.old_weight + change.new_weight;

        if let Some(delegate) = change.delegate {
            if let Some(target) = self.members.get_mut(&delegate) {
                target.delegated_in_weight =
                    target.delegated_in_weight - change.old_weight + change.new_weight;
            }
        }
    }

    /// Point `delegator` at `delegatee` and move its own weight across.
    /// Both must be members; the caller has already validated the edge.
    pub(crate) fn attach_delegate(&mut self, delegator: Address, delegatee: Address) -> Weight {
        let weight = match self.members.get_mut(&delegator) {
            Some(member) => {
                member.delegate = Some(delegatee);
                member.own_voting_weight
            }
            None => return 0,
        };
        if let Some(target) = self.members.get_mut(&delegatee) {
            target.delegated_in_weight = target.delegated_in_weight.saturating_add(weight);
        }
        weight
    }

    /// Clear `delegator`'s delegation and return its weight.
    pub(crate) fn detach_delegate(&mut self, delegator: Address) -> Weight {
        let (delegatee, weight) = match self.members.get_mut(&delegator) {
            Some(member) => match member.delegate.take() {
                Some(delegatee) => (delegatee, member.own_voting_weight),
                None => return 0,
            },
            None => return 0,
        };
        if let Some(target) = self.members.get_mut(&delegatee) {
            target.delegated_in_weight = target.delegated_in_weight.saturating_sub(weight);
        }
        weight
    }

    /// Check the weight conservation law:
    /// votable own weight plus all incoming weight equals total weight.
    pub fn weight_conserved(&self) -> bool {
        let votable_own: Weight = self
            .members
            .values()
            .filter(|m| !m.is_delegating())
            .map(|m| m.own_voting_weight)
            .sum();
        let delegated_in: Weight = self.members.values().map(|m| m.delegated_in_weight).sum();
        let expected: Weight = self
            .members
            .values()
            .map(|m| weight_for_stake(m.staked_amount))
            .sum();

        votable_own + delegated_in == expected && expected == self.total_weight
    }
}
