//! Treasury balance and history.
//!
//! The treasury is funded by deposits and forfeited proposal deposits and
//! drained only by executing succeeded transfer proposals.

use serde::Serialize;

use crate::error::{GovernanceError, Result};
use qvdao_types::{Address, Amount, ProposalId, Timestamp};

/// Type of treasury transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionType {
    /// Funds deposited by a member
    Deposit,
    /// Deposit of a defeated proposal
    ForfeitedDeposit,
    /// Funds sent to a proposal's recipient
    Disbursement,
}

/// Treasury transaction record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreasuryTransaction {
    pub tx_type: TransactionType,
    pub amount: Amount,
    /// Source (for deposits) or recipient (for disbursements)
    pub counterparty: Address,
    /// Proposal that caused the movement, if any
    pub proposal_id: Option<ProposalId>,
    pub at: Timestamp,
}

/// Point the treasury can be rolled back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreasuryCheckpoint {
    balance: Amount,
    history_len: usize,
}

/// Treasury balance and history.
#[derive(Debug, Clone, Default)]
pub struct Treasury {
    balance: Amount,
    history: Vec<TreasuryTransaction>,
}

impl Treasury {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    pub fn history(&self) -> &[TreasuryTransaction] {
        &self.history
    }

    /// Total disbursed across all executed proposals.
    pub fn total_disbursed(&self) -> Amount {
        self.history
            .iter()
            .filter(|tx| tx.tx_type == TransactionType::Disbursement)
            .map(|tx| tx.amount)
            .sum()
    }

    /// Validate an inflow without applying it.
    pub fn check_credit(&self, amount: Amount) -> Result<()> {
        self.balance
            .checked_add(amount)
            .map(|_| ())
            .ok_or_else(|| GovernanceError::overflow("treasury balance"))
    }

    /// Record an inflow. `check_credit` must have passed.
    pub fn credit(
        &mut self,
        tx_type: TransactionType,
        amount: Amount,
        source: Address,
        proposal_id: Option<ProposalId>,
        at: Timestamp,
    ) {
        self.balance += amount;
        self.history.push(TreasuryTransaction {
            tx_type,
            amount,
            counterparty: source,
            proposal_id,
            at,
        });
    }

    /// Check that `amount` can be disbursed.
    pub fn check_disburse(&self, amount: Amount) -> Result<()> {
        if amount > self.balance {
            return Err(GovernanceError::InsufficientTreasury {
                balance: self.balance,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Debit the treasury for a proposal's recipient.
    pub fn disburse(
        &mut self,
        recipient: Address,
        amount: Amount,
        proposal_id: ProposalId,
        at: Timestamp,
    ) -> Result<()> {
        self.check_disburse(amount)?;
        self.balance -= amount;
        self.history.push(TreasuryTransaction {
            tx_type: TransactionType::Disbursement,
            amount,
            counterparty: recipient,
            proposal_id: Some(proposal_id),
            at,
        });
        Ok(())
    }

    pub fn checkpoint(&self) -> TreasuryCheckpoint {
        TreasuryCheckpoint {
            balance: self.balance,
            history_len: self.history.len(),
        }
    }

    /// Undo everything recorded since `checkpoint`.
    pub fn restore(&mut self, checkpoint: TreasuryCheckpoint) {
        self.balance = checkpoint.balance;
        self.history.truncate(checkpoint.history_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_treasury_deposit() {
        let mut treasury = Treasury::new();
        treasury.check_credit(1_000).unwrap();
        treasury.credit(TransactionType::Deposit, 1_000, Address::ZERO, None, 100);

        assert_eq!(treasury.balance(), 1_000);
        assert_eq!(treasury.history().len(), 1);
    }

    #[test]
    fn test_disburse_requires_balance() {
        let mut treasury = Treasury::new();
        treasury.credit(TransactionType::Deposit, 100, Address::ZERO, None, 1);

        assert_eq!(
            treasury.disburse(Address::from_label("bob"), 101, 1, 2),
            Err(GovernanceError::InsufficientTreasury { balance: 100, requested: 101 })
        );
        treasury.disburse(Address::from_label("bob"), 60, 1, 2).unwrap();
        assert_eq!(treasury.balance(), 40);
        assert_eq!(treasury.total_disbursed(), 60);
    }

    #[test]
    fn test_checkpoint_restore() {
        let mut treasury = Treasury::new();
        treasury.credit(TransactionType::Deposit, 500, Address::ZERO, None, 1);

        let checkpoint = treasury.checkpoint();
        treasury.disburse(Address::from_label("bob"), 200, 3, 2).unwrap();
        treasury.credit(TransactionType::ForfeitedDeposit, 5, Address::ZERO, Some(4), 3);

        treasury.restore(checkpoint);
        assert_eq!(treasury.balance(), 500);
        assert_eq!(treasury.history().len(), 1);
        assert_eq!(treasury.total_disbursed(), 0);
    }

    #[test]
    fn test_credit_overflow() {
        let mut treasury = Treasury::new();
        treasury.credit(TransactionType::Deposit, Amount::MAX, Address::ZERO, None, 1);
        assert!(matches!(treasury.check_credit(1), Err(GovernanceError::InvalidAmount(_))));
    }
}
