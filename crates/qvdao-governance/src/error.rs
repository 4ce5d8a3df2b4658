use qvdao_types::{Address, Amount, ProposalId, Weight};
use thiserror::Error;

use crate::proposal::ProposalState;

/// Errors that can occur in governance operations.
///
/// An operation that fails writes nothing of its own. Time-driven
/// housekeeping run at its start (expiring delegations, opening due
/// proposals) stays applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GovernanceError {
    // Input validation
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Description too long: {len} bytes, max {max}")]
    DescriptionTooLong { len: usize, max: usize },

    #[error("Invalid voting period {period}s: must be within [{min}, {max}]")]
    InvalidVotingPeriod { period: u64, min: u64, max: u64 },

    #[error("Invalid delegate: {0}")]
    InvalidDelegate(String),

    #[error("Invalid quorum: {0}")]
    InvalidQuorum(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // State conflicts
    #[error("Not a member: {0}")]
    NotMember(Address),

    #[error("Proposal not found: {0}")]
    ProposalNotFound(ProposalId),

    #[error("Already delegated to {0}")]
    AlreadyDelegated(Address),

    #[error("Delegation loop detected")]
    DelegationLoop,

    #[error("Delegation chain deeper than {max_depth}")]
    DelegationTooDeep { max_depth: usize },

    #[error("No active delegation")]
    NoActiveDelegation,

    #[error("Already voted")]
    AlreadyVoted,

    #[error("Voting has not started")]
    VotingNotStarted,

    #[error("Voting closed")]
    VotingClosed,

    #[error("Voting still open until {deadline}")]
    VotingStillOpen { deadline: u64 },

    #[error("Proposal already finalized ({0:?})")]
    AlreadyFinalized(ProposalState),

    #[error("Proposal already executed")]
    AlreadyExecuted,

    #[error("Proposal not finalized ({0:?})")]
    NotFinalized(ProposalState),

    #[error("Invalid proposal state: {0:?}")]
    InvalidState(ProposalState),

    #[error("Reentrant call rejected while {0} is in progress")]
    ReentrantCall(&'static str),

    // Authorization
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Caller is not the owner")]
    NotOwner,

    // Resources
    #[error("Insufficient stake: have {have}, need {need}")]
    InsufficientStake { have: Amount, need: Amount },

    #[error("Insufficient voting power: cost {cost} exceeds available {available}")]
    InsufficientVotingPower { cost: u128, available: Weight },

    #[error("Insufficient treasury: balance {balance}, requested {requested}")]
    InsufficientTreasury { balance: Amount, requested: Amount },

    #[error("Transfer failed: {0}")]
    TransferFailed(String),
}

/// Coarse classification of a [`GovernanceError`].
///
/// None of these are retryable as-is; the caller must change its input or
/// wait for the ledger state to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InputValidation,
    StateConflict,
    Authorization,
    Resource,
}

impl GovernanceError {
    pub fn kind(&self) -> ErrorKind {
        use GovernanceError::*;
        match self {
            InvalidAmount(_)
            | DescriptionTooLong { .. }
            | InvalidVotingPeriod { .. }
            | InvalidDelegate(_)
            | InvalidQuorum(_)
            | InvalidParameter(_) => ErrorKind::InputValidation,
            NotMember(_)
            | ProposalNotFound(_)
            | AlreadyDelegated(_)
            | DelegationLoop
            | DelegationTooDeep { .. }
            | NoActiveDelegation
            | AlreadyVoted
            | VotingNotStarted
            | VotingClosed
            | VotingStillOpen { .. }
            | AlreadyFinalized(_)
            | AlreadyExecuted
            | NotFinalized(_)
            | InvalidState(_)
            | ReentrantCall(_) => ErrorKind::StateConflict,
            NotAuthorized(_) | NotOwner => ErrorKind::Authorization,
            InsufficientStake { .. }
            | InsufficientVotingPower { .. }
            | InsufficientTreasury { .. }
            | TransferFailed(_) => ErrorKind::Resource,
        }
    }

    /// Shorthand for arithmetic overflow on amounts and weights.
    pub(crate) fn overflow(what: &str) -> Self {
        GovernanceError::InvalidAmount(format!("{} overflows", what))
    }
}

pub type Result<T> = std::result::Result<T, GovernanceError>;
