//! Reentrancy protection for state-mutating entry points.
//!
//! The ledger hands a mutable handle to external collaborators during
//! treasury disbursement. While such a call is in flight every mutating
//! entry point must refuse to run.

use crate::error::{GovernanceError, Result};
use qvdao_types::ProposalId;

/// An entry point that performs an external call while holding the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    ExecuteProposal(ProposalId),
}

impl EntryPoint {
    pub fn name(&self) -> &'static str {
        match self {
            EntryPoint::ExecuteProposal(_) => "executeProposal",
        }
    }
}

/// Tracks the single external call the ledger may have in flight.
#[derive(Debug, Clone, Default)]
pub struct ReentrancyGuard {
    in_flight: Option<EntryPoint>,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail if any guarded call is in flight.
    pub fn check(&self) -> Result<()> {
        match self.in_flight {
            Some(entry) => Err(GovernanceError::ReentrantCall(entry.name())),
            None => Ok(()),
        }
    }

    /// Mark `entry` as in flight.
    ///
    /// # Errors
    /// Returns `ReentrantCall` if another call already holds the guard.
    pub fn enter(&mut self, entry: EntryPoint) -> Result<()> {
        self.check()?;
        self.in_flight = Some(entry);
        Ok(())
    }

    /// Release the guard. Returns the entry that held it.
    pub fn exit(&mut self) -> Option<EntryPoint> {
        self.in_flight.take()
    }

    pub fn is_locked(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn current(&self) -> Option<EntryPoint> {
        self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_enter_exit() {
        let mut guard = ReentrancyGuard::new();
        assert!(guard.check().is_ok());

        guard.enter(EntryPoint::ExecuteProposal(1)).unwrap();
        assert!(guard.is_locked());
        assert_eq!(guard.current(), Some(EntryPoint::ExecuteProposal(1)));

        assert_eq!(guard.exit(), Some(EntryPoint::ExecuteProposal(1)));
        assert!(!guard.is_locked());
        assert_eq!(guard.exit(), None);
    }

    #[test]
    fn test_reentrancy_protection() {
        let mut guard = ReentrancyGuard::new();
        guard.enter(EntryPoint::ExecuteProposal(1)).unwrap();

        let result = guard.enter(EntryPoint::ExecuteProposal(2));
        assert!(matches!(result, Err(GovernanceError::ReentrantCall("executeProposal"))));
        assert!(guard.check().is_err());

        // The original holder is untouched
        assert_eq!(guard.current(), Some(EntryPoint::ExecuteProposal(1)));
    }
}
