//! QVDAO Governance - quadratic-voting governance ledger.
//!
//! This crate provides:
//! - Stake-backed membership with `floor(sqrt(stake))` voting weight
//! - Single-hop delegation with bounded-depth cycle checks and expiry
//! - Proposal lifecycle with quadratic vote cost, quorum and threshold
//! - Treasury with reentrancy-safe, all-or-nothing execution
//! - Advisory reputation, two-step ownership and an append-only event log
//!
//! All state lives in one [`GovernanceLedger`]. Operations run one at a
//! time against an explicit `now`; each either commits fully or fails with
//! a [`GovernanceError`] and leaves state untouched.

pub mod auth;
pub mod custody;
pub mod delegation;
pub mod error;
pub mod events;
pub mod guard;
pub mod ledger;
pub mod lifecycle;
pub mod membership;
pub mod params;
pub mod proposal;
pub mod reputation;
pub mod treasury;
pub mod voting;

pub use custody::{AssetCustody, CustodyPayout, Disburser, TransferError, Vault};
pub use delegation::{Delegation, DelegationGraph};
pub use error::{ErrorKind, GovernanceError, Result};
pub use events::{EventObserver, EventRecord, GovernanceEvent, UndelegateReason};
pub use ledger::GovernanceLedger;
pub use lifecycle::ProposalDraft;
pub use membership::Member;
pub use params::{GovernanceParams, QuorumRule};
pub use proposal::{
    Proposal, ProposalOutcome, ProposalState, TreasuryTransfer, VoteRecord, VoteSupport,
};
pub use reputation::ReputationParams;
pub use treasury::{TransactionType, Treasury, TreasuryTransaction};
pub use voting::{integer_sqrt, weight_for_stake, VoteWeighting};
