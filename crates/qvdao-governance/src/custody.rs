//! Asset collaborators.
//!
//! The ledger never holds tokens itself. [`AssetCustody`] moves the staking
//! asset in and out of custody, and a [`Disburser`] performs the outbound
//! transfer of an executed treasury proposal.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::error::GovernanceError;
use crate::ledger::GovernanceLedger;
use qvdao_types::{Address, Amount};

/// Failure reported by an asset collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransferError(pub String);

impl From<TransferError> for GovernanceError {
    fn from(e: TransferError) -> Self {
        GovernanceError::TransferFailed(e.0)
    }
}

/// Moves the staking asset between callers and ledger custody.
///
/// Either call moves exactly `amount` or fails without moving anything.
pub trait AssetCustody {
    /// Take `amount` from `from` into custody.
    fn pull(&mut self, from: &Address, amount: Amount) -> Result<(), TransferError>;

    /// Release `amount` from custody to `to`.
    fn push(&mut self, to: &Address, amount: Amount) -> Result<(), TransferError>;
}

/// Performs the external transfer of an executed treasury proposal.
///
/// Receives the ledger itself, so an implementation is free to call back
/// into it. Mutating calls made from here are rejected.
pub trait Disburser<C: AssetCustody> {
    fn disburse(
        &mut self,
        ledger: &mut GovernanceLedger<C>,
        recipient: Address,
        amount: Amount,
    ) -> Result<(), TransferError>;
}

/// Disburser that pays recipients out of the ledger's own custody.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustodyPayout;

impl<C: AssetCustody> Disburser<C> for CustodyPayout {
    fn disburse(
        &mut self,
        ledger: &mut GovernanceLedger<C>,
        recipient: Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        ledger.custody_mut().push(&recipient, amount)
    }
}

/// In-memory custody with per-address balances.
#[derive(Debug, Clone, Default)]
pub struct Vault {
    balances: BTreeMap<Address, Amount>,
    held: Amount,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `address` spendable funds outside custody.
    pub fn credit(&mut self, address: Address, amount: Amount) {
        let balance = self.balances.entry(address).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    pub fn with_balance(mut self, address: Address, amount: Amount) -> Self {
        self.credit(address, amount);
        self
    }

    pub fn balance_of(&self, address: &Address) -> Amount {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Total currently in custody.
    pub fn held(&self) -> Amount {
        self.held
    }

    pub fn balances(&self) -> &BTreeMap<Address, Amount> {
        &self.balances
    }
}

impl AssetCustody for Vault {
    fn pull(&mut self, from: &Address, amount: Amount) -> Result<(), TransferError> {
        let have = self.balance_of(from);
        if have < amount {
            return Err(TransferError(format!(
                "insufficient balance for {}: have {}, need {}",
                from.short(),
                have,
                amount
            )));
        }
        let held = self
            .held
            .checked_add(amount)
            .ok_or_else(|| TransferError("custody overflow".to_string()))?;

        self.balances.insert(*from, have - amount);
        self.held = held;
        Ok(())
    }

    fn push(&mut self, to: &Address, amount: Amount) -> Result<(), TransferError> {
        if self.held < amount {
            return Err(TransferError(format!(
                "custody holds {}, cannot release {}",
                self.held, amount
            )));
        }
        self.held -= amount;
        self.credit(*to, amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_and_push() {
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        let mut vault = Vault::new().with_balance(alice, 100);

        vault.pull(&alice, 70).unwrap();
        assert_eq!(vault.balance_of(&alice), 30);
        assert_eq!(vault.held(), 70);

        vault.push(&bob, 20).unwrap();
        assert_eq!(vault.balance_of(&bob), 20);
        assert_eq!(vault.held(), 50);
    }

    #[test]
    fn test_failed_moves_change_nothing() {
        let alice = Address::from_label("alice");
        let mut vault = Vault::new().with_balance(alice, 10);

        assert!(vault.pull(&alice, 11).is_err());
        assert_eq!(vault.balance_of(&alice), 10);
        assert_eq!(vault.held(), 0);

        assert!(vault.push(&alice, 1).is_err());
        assert_eq!(vault.balance_of(&alice), 10);
    }

    #[test]
    fn test_transfer_error_maps_to_governance_error() {
        let err: GovernanceError = TransferError("bounced".to_string()).into();
        assert_eq!(err, GovernanceError::TransferFailed("bounced".to_string()));
    }
}
