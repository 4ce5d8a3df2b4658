//! Delegation graph.
//!
//! Each member has at most one outgoing edge. New edges are checked with a
//! walk of at most `max_depth` hops starting at the delegatee, which keeps
//! the graph acyclic at O(depth) per insertion.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::error::{GovernanceError, Result};
use qvdao_types::{Address, Timestamp};

/// One outgoing edge: `delegator` lends its weight to `delegatee`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delegation {
    pub delegator: Address,
    pub delegatee: Address,
    /// When the delegation was created
    pub created_at: Timestamp,
    /// When the delegation lapses on its own, if ever
    pub expires_at: Option<Timestamp>,
}

impl Delegation {
    pub fn new(
        from: Address,
        to: Address,
        created_at: Timestamp,
        expires_at: Option<Timestamp>,
    ) -> Self {
        Self {
            delegator: from,
            delegatee: to,
            created_at,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

/// Live delegation edges plus a reverse index for "who lends to me".
#[derive(Debug, Clone)]
pub struct DelegationGraph {
    edges: HashMap<Address, Delegation>,
    incoming: HashMap<Address, BTreeSet<Address>>,
    walk_limit: usize,
}

impl DelegationGraph {
    pub fn new() -> Self {
        Self {
            edges: HashMap::new(),
            incoming: HashMap::new(),
            walk_limit: 16,
        }
    }

    /// Override the walk bound used for loop checks and resolution.
    pub fn with_max_depth(self, hops: usize) -> Self {
        Self {
            walk_limit: hops,
            ..self
        }
    }

    pub fn max_depth(&self) -> usize {
        self.walk_limit
    }

    pub(crate) fn set_max_depth(&mut self, hops: usize) {
        self.walk_limit = hops;
    }

    /// Validate a new edge `delegator -> delegatee` without inserting it.
    ///
    /// Membership of either side is checked by the caller.
    ///
    /// # Errors
    /// - `InvalidDelegate` for the zero address or a self-loop
    /// - `AlreadyDelegated` if `delegator` already has an edge
    /// - `DelegationLoop` if `delegator` is reachable from `delegatee`
    /// - `DelegationTooDeep` if the chain outruns the walk bound
    pub fn check_new_edge(&self, delegator: Address, delegatee: Address) -> Result<()> {
        if delegatee.is_zero() {
            return Err(GovernanceError::InvalidDelegate(
                "delegate cannot be the zero address".to_string(),
            ));
        }
        if delegator == delegatee {
            return Err(GovernanceError::InvalidDelegate(
                "cannot delegate to self".to_string(),
            ));
        }
        if let Some(existing) = self.edges.get(&delegator) {
            return Err(GovernanceError::AlreadyDelegated(existing.delegatee));
        }

        let mut cursor = delegatee;
        for _ in 0..self.walk_limit {
            let Some(next) = self.edges.get(&cursor).map(|e| e.delegatee) else {
                return Ok(());
            };
            if next == delegator {
                return Err(GovernanceError::DelegationLoop);
            }
            cursor = next;
        }

        Err(GovernanceError::DelegationTooDeep {
            max_depth: self.walk_limit,
        })
    }

    /// Insert a previously checked edge.
    pub(crate) fn insert(&mut self, delegation: Delegation) {
        self.incoming
            .entry(delegation.delegatee)
            .or_default()
            .insert(delegation.delegator);
        self.edges.insert(delegation.delegator, delegation);
    }

    /// Remove `delegator`'s edge.
    pub(crate) fn remove(&mut self, delegator: &Address) -> Result<Delegation> {
        let delegation = self
            .edges
            .remove(delegator)
            .ok_or(GovernanceError::NoActiveDelegation)?;

        if let Some(lenders) = self.incoming.get_mut(&delegation.delegatee) {
            lenders.remove(delegator);
            if lenders.is_empty() {
                self.incoming.remove(&delegation.delegatee);
            }
        }

        Ok(delegation)
    }

    /// Delegators whose edges have lapsed at `now`, in address order.
    pub fn expired(&self, now: Timestamp) -> Vec<Address> {
        let mut lapsed: Vec<Address> = self
            .edges
            .values()
            .filter(|d| d.is_expired(now))
            .map(|d| d.delegator)
            .collect();
        lapsed.sort();
        lapsed
    }

    pub fn get_delegation(&self, delegator: &Address) -> Option<&Delegation> {
        self.edges.get(delegator)
    }

    pub fn is_delegating(&self, member: &Address) -> bool {
        self.edges.contains_key(member)
    }

    /// Members with an edge pointing straight at `delegatee`, in address order.
    pub fn get_delegators(&self, delegatee: &Address) -> Vec<Address> {
        self.incoming
            .get(delegatee)
            .map(|lenders| lenders.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every member whose chain eventually reaches `delegatee`, sorted.
    pub fn get_all_delegators(&self, delegatee: &Address) -> Vec<Address> {
        let mut seen = HashSet::from([*delegatee]);
        let mut frontier = vec![*delegatee];
        let mut upstream = BTreeSet::new();

        while let Some(node) = frontier.pop() {
            for lender in self.incoming.get(&node).into_iter().flatten() {
                if seen.insert(*lender) {
                    upstream.insert(*lender);
                    frontier.push(*lender);
                }
            }
        }

        upstream.into_iter().collect()
    }

    /// Last member on the chain starting at `member`, within the walk bound.
    pub fn resolve_delegate(&self, member: Address) -> Address {
        let mut cursor = member;
        for _ in 0..self.walk_limit {
            match self.edges.get(&cursor) {
                Some(edge) => cursor = edge.delegatee,
                None => break,
            }
        }
        cursor
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All edges, in delegator order.
    pub fn edges(&self) -> Vec<&Delegation> {
        let mut edges: Vec<&Delegation> = self.edges.values().collect();
        edges.sort_by_key(|d| d.delegator);
        edges
    }
}

impl Default for DelegationGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    fn link(graph: &mut DelegationGraph, from: u8, to: u8) {
        graph.check_new_edge(member(from), member(to)).unwrap();
        graph.insert(Delegation::new(member(from), member(to), 100, None));
    }

    #[test]
    fn test_second_edge_rejected() {
        let mut graph = DelegationGraph::new();
        link(&mut graph, 1, 2);
        assert!(graph.is_delegating(&member(1)));

        assert_eq!(
            graph.check_new_edge(member(1), member(3)),
            Err(GovernanceError::AlreadyDelegated(member(2)))
        );
    }

    #[test]
    fn test_invalid_targets() {
        let graph = DelegationGraph::new();

        assert!(matches!(
            graph.check_new_edge(member(1), member(1)),
            Err(GovernanceError::InvalidDelegate(_))
        ));
        assert!(matches!(
            graph.check_new_edge(member(1), Address::ZERO),
            Err(GovernanceError::InvalidDelegate(_))
        ));
    }

    #[test]
    fn test_loops_rejected() {
        let mut graph = DelegationGraph::new();
        link(&mut graph, 1, 2);
        link(&mut graph, 2, 3);

        assert_eq!(graph.check_new_edge(member(3), member(1)), Err(GovernanceError::DelegationLoop));
        assert_eq!(graph.check_new_edge(member(3), member(2)), Err(GovernanceError::DelegationLoop));
    }

    #[test]
    fn test_depth_bound() {
        let mut graph = DelegationGraph::new().with_max_depth(3);
        for n in 1..4 {
            link(&mut graph, n, n + 1);
        }

        // 1 needs four hops to reach the tail at 4
        assert_eq!(
            graph.check_new_edge(member(9), member(1)),
            Err(GovernanceError::DelegationTooDeep { max_depth: 3 })
        );
        assert!(graph.check_new_edge(member(9), member(2)).is_ok());
    }

    #[test]
    fn test_chain_resolution() {
        let mut graph = DelegationGraph::new();
        link(&mut graph, 1, 2);
        link(&mut graph, 2, 3);

        for start in 1..=3 {
            assert_eq!(graph.resolve_delegate(member(start)), member(3));
        }
    }

    #[test]
    fn test_remove_clears_reverse_index() {
        let mut graph = DelegationGraph::new();
        link(&mut graph, 1, 2);

        let removed = graph.remove(&member(1)).unwrap();
        assert_eq!(removed.delegatee, member(2));
        assert!(!graph.is_delegating(&member(1)));
        assert!(graph.get_delegators(&member(2)).is_empty());
        assert_eq!(graph.remove(&member(1)), Err(GovernanceError::NoActiveDelegation));
    }

    #[test]
    fn test_upstream_delegators() {
        let mut graph = DelegationGraph::new();
        link(&mut graph, 3, 2);
        link(&mut graph, 1, 2);
        link(&mut graph, 2, 4);

        assert_eq!(graph.get_all_delegators(&member(4)), vec![member(1), member(2), member(3)]);
        assert_eq!(graph.get_delegators(&member(2)), vec![member(1), member(3)]);
        assert_eq!(graph.get_delegators(&member(4)), vec![member(2)]);
    }

    #[test]
    fn test_expired_edges() {
        let mut graph = DelegationGraph::new();
        graph.insert(Delegation::new(member(1), member(3), 0, Some(50)));
        graph.insert(Delegation::new(member(2), member(3), 0, None));

        assert!(graph.expired(49).is_empty());
        assert_eq!(graph.expired(50), vec![member(1)]);
    }
}
