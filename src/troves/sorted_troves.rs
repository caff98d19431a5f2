//! Sorted Troves - doubly linked list of open troves ordered by NICR
//!
//! Ascending order: `first()` is the riskiest trove. Id 0 is never used
//! and marks the end of the list.

use odra::prelude::*;
use odra::casper_types::U256;
use crate::errors::CdpError;

/// List node of one trove
#[odra::odra_type]
pub struct Node {
    /// NICR at insertion time
    pub nicr: U256,
    pub prev: u64,
    pub next: u64,
    /// Cleared on removal
    pub linked: bool,
}

/// Sorted trove index sub-module
#[odra::module]
pub struct SortedTroves {
    /// Lowest NICR, 0 when empty
    head: Var<u64>,
    /// Highest NICR, 0 when empty
    tail: Var<u64>,
    nodes: Mapping<u64, Node>,
    size: Var<u64>,
}

#[odra::module]
impl SortedTroves {
    /// Trove with the lowest NICR
    pub fn first(&self) -> Option<u64> {
        Self::as_option(self.head.get_or_default())
    }

    /// Trove with the highest NICR
    pub fn last(&self) -> Option<u64> {
        Self::as_option(self.tail.get_or_default())
    }

    /// Next trove in ascending order
    pub fn next(&self, id: u64) -> Option<u64> {
        self.node(id).and_then(|node| Self::as_option(node.next))
    }

    /// Previous trove in ascending order
    pub fn prev(&self, id: u64) -> Option<u64> {
        self.node(id).and_then(|node| Self::as_option(node.prev))
    }

    pub fn contains(&self, id: u64) -> bool {
        self.node(id).is_some()
    }

    pub fn size(&self) -> u64 {
        self.size.get_or_default()
    }
}

impl SortedTroves {
    /// Insert `id` keyed by `nicr`; the search starts at `hint` when it is
    /// a node with a NICR not above `nicr`
    pub fn insert(&mut self, id: u64, nicr: U256, hint: Option<u64>) -> Result<(), CdpError> {
        if id == 0 || self.contains(id) {
            return Err(CdpError::InvalidConfiguration);
        }
        let prev = self.find_prev(nicr, hint);
        let next = match prev {
            Some(prev_id) => self.raw_next(prev_id),
            None => self.head.get_or_default(),
        };

        self.nodes.set(&id, Node { nicr, prev: prev.unwrap_or(0), next, linked: true });
        match prev {
            Some(prev_id) => self.set_next(prev_id, id),
            None => self.head.set(id),
        }
        if next == 0 {
            self.tail.set(id);
        } else {
            self.set_prev(next, id);
        }
        self.size.set(self.size() + 1);
        Ok(())
    }

    pub fn remove(&mut self, id: u64) -> Result<(), CdpError> {
        let mut node = self.node(id).ok_or(CdpError::TroveNotFound)?;
        if node.prev == 0 {
            self.head.set(node.next);
        } else {
            self.set_next(node.prev, node.next);
        }
        if node.next == 0 {
            self.tail.set(node.prev);
        } else {
            self.set_prev(node.next, node.prev);
        }
        node.linked = false;
        self.nodes.set(&id, node);
        self.size.set(self.size().saturating_sub(1));
        Ok(())
    }

    /// Move `id` to the position of its new NICR
    pub fn reinsert(&mut self, id: u64, nicr: U256, hint: Option<u64>) -> Result<(), CdpError> {
        self.remove(id)?;
        let hint = hint.filter(|h| *h != id);
        self.insert(id, nicr, hint)
    }

    /// Last node whose NICR is not above `nicr`, or None for the head slot
    fn find_prev(&self, nicr: U256, hint: Option<u64>) -> Option<u64> {
        let start = hint
            .and_then(|h| self.node(h).map(|node| (h, node)))
            .filter(|(_, node)| node.nicr <= nicr)
            .map(|(h, _)| h)
            .or_else(|| {
                let head = self.head.get_or_default();
                self.node(head).filter(|node| node.nicr <= nicr).map(|_| head)
            })?;

        let mut current = start;
        loop {
            let next = self.raw_next(current);
            match self.node(next) {
                Some(node) if node.nicr <= nicr => current = next,
                _ => return Some(current),
            }
        }
    }

    fn node(&self, id: u64) -> Option<Node> {
        if id == 0 {
            return None;
        }
        self.nodes.get(&id).filter(|node| node.linked)
    }

    fn raw_next(&self, id: u64) -> u64 {
        self.node(id).map(|node| node.next).unwrap_or(0)
    }

    fn set_next(&mut self, id: u64, next: u64) {
        if let Some(mut node) = self.node(id) {
            node.next = next;
            self.nodes.set(&id, node);
        }
    }

    fn set_prev(&mut self, id: u64, prev: u64) {
        if let Some(mut node) = self.node(id) {
            node.prev = prev;
            self.nodes.set(&id, node);
        }
    }

    fn as_option(id: u64) -> Option<u64> {
        if id == 0 { None } else { Some(id) }
    }
}
