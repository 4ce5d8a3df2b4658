//! Domain events.
//!
//! Every committed operation appends one or more records to the
//! [`EventLog`]. Observers are told about each record after it is appended.
//! Nothing in the ledger reads events back.

use std::fmt;

use serde::Serialize;

use crate::params::QuorumRule;
use crate::proposal::{ProposalState, TreasuryTransfer, VoteSupport};
use qvdao_types::{Address, Amount, ProposalId, Timestamp, Weight};

/// Why a delegation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UndelegateReason {
    Revoked,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum GovernanceEvent {
    Staked {
        member: Address,
        amount: Amount,
        total_stake: Amount,
        weight: Weight,
    },
    Unstaked {
        member: Address,
        amount: Amount,
        total_stake: Amount,
        weight: Weight,
    },
    Delegated {
        delegator: Address,
        delegatee: Address,
        weight: Weight,
        expires_at: Option<Timestamp>,
    },
    Undelegated {
        delegator: Address,
        delegatee: Address,
        weight: Weight,
        reason: UndelegateReason,
    },
    ProposalCreated {
        id: ProposalId,
        proposer: Address,
        voting_deadline: Timestamp,
        deposit: Amount,
        transfer: Option<TreasuryTransfer>,
    },
    ProposalStateChanged {
        id: ProposalId,
        from: ProposalState,
        to: ProposalState,
    },
    Voted {
        id: ProposalId,
        voter: Address,
        support: VoteSupport,
        credits: u128,
        weight: Weight,
    },
    ProposalExecuted {
        id: ProposalId,
        executor: Address,
        transfer: Option<TreasuryTransfer>,
    },
    ThresholdUpdated {
        old: u64,
        new: u64,
    },
    QuorumUpdated {
        old: QuorumRule,
        new: QuorumRule,
    },
    ParametersUpdated {
        by: Address,
    },
    TreasuryFunded {
        from: Address,
        amount: Amount,
    },
    OwnershipTransferStarted {
        owner: Address,
        pending_owner: Address,
    },
    OwnershipTransferred {
        previous: Address,
        owner: Address,
    },
}

/// An event with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub seq: u64,
    pub at: Timestamp,
    pub event: GovernanceEvent,
}

/// Subscriber notified of every appended record.
pub trait EventObserver {
    fn on_event(&mut self, record: &EventRecord);
}

impl<F: FnMut(&EventRecord)> EventObserver for F {
    fn on_event(&mut self, record: &EventRecord) {
        self(record)
    }
}

/// Append-only event log.
#[derive(Default)]
pub struct EventLog {
    records: Vec<EventRecord>,
    observers: Vec<Box<dyn EventObserver>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn EventObserver>) {
        self.observers.push(observer);
    }

    pub fn emit(&mut self, at: Timestamp, event: GovernanceEvent) {
        let record = EventRecord {
            seq: self.records.len() as u64,
            at,
            event,
        };
        for observer in &mut self.observers {
            observer.on_event(&record);
        }
        self.records.push(record);
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records with `seq >= from`.
    pub fn since(&self, from: u64) -> &[EventRecord] {
        let start = (from as usize).min(self.records.len());
        &self.records[start..]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&GovernanceEvent> {
        self.records.last().map(|r| &r.event)
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("records", &self.records.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_sequence_numbers() {
        let mut log = EventLog::new();
        log.emit(1, GovernanceEvent::ThresholdUpdated { old: 1, new: 2 });
        log.emit(2, GovernanceEvent::ThresholdUpdated { old: 2, new: 3 });

        assert_eq!(log.len(), 2);
        assert_eq!(log.records()[1].seq, 1);
        assert_eq!(log.since(1).len(), 1);
        assert!(log.since(9).is_empty());
    }

    #[test]
    fn test_observer_sees_records() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let mut log = EventLog::new();
        log.subscribe(Box::new(move |record: &EventRecord| {
            sink.borrow_mut().push(record.seq);
        }));
        log.emit(5, GovernanceEvent::ParametersUpdated { by: Address::ZERO });
        log.emit(6, GovernanceEvent::ParametersUpdated { by: Address::ZERO });

        assert_eq!(*seen.borrow(), vec![0, 1]);
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = GovernanceEvent::ThresholdUpdated { old: 100, new: 150 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ThresholdUpdated");
        assert_eq!(json["new"], 150);
    }
}
