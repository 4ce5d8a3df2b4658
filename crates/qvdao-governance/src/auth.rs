//! Administrative authorization with two-step ownership transfer.

use crate::error::{GovernanceError, Result};
use qvdao_types::Address;

/// Proof that the caller was the owner when it was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminCapability {
    pub owner: Address,
}

/// Single owner plus an optional pending successor.
///
/// The current owner stays authoritative until the pending owner accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    owner: Address,
    pending_owner: Option<Address>,
}

impl Ownership {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            pending_owner: None,
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn pending_owner(&self) -> Option<Address> {
        self.pending_owner
    }

    pub fn is_owner(&self, caller: &Address) -> bool {
        &self.owner == caller
    }

    /// Check `caller` against the owner.
    pub fn authorize(&self, caller: &Address) -> Result<AdminCapability> {
        if !self.is_owner(caller) {
            return Err(GovernanceError::NotOwner);
        }
        Ok(AdminCapability { owner: self.owner })
    }

    /// Nominate `new_owner`. Replaces any earlier nomination.
    pub fn begin_transfer(&mut self, caller: &Address, new_owner: Address) -> Result<()> {
        self.authorize(caller)?;
        if new_owner.is_zero() {
            return Err(GovernanceError::InvalidParameter(
                "new owner cannot be the zero address".to_string(),
            ));
        }
        self.pending_owner = Some(new_owner);
        Ok(())
    }

    /// Complete the handshake. Returns the previous owner.
    pub fn accept(&mut self, caller: &Address) -> Result<Address> {
        match self.pending_owner {
            Some(pending) if &pending == caller => {
                let previous = self.owner;
                self.owner = pending;
                self.pending_owner = None;
                Ok(previous)
            }
            _ => Err(GovernanceError::NotAuthorized(
                "caller is not the pending owner".to_string(),
            )),
        }
    }
}
