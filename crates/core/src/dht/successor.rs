//! Successor for the chord ring
use serde::Deserialize;
use serde::Serialize;

use crate::dht::Edge;

/// A sequence of successors for a node on the ring.
/// It's necessary to have multiple successors to prevent a single point of failure.
/// Index 0 is the authoritative successor. When every other node is unknown the
/// owner itself ends the list, which is the state of a ring of one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuccessorSeq {
    owner: Edge,
    max: usize,
    successors: Vec<Edge>,
}

impl SuccessorSeq {
    pub fn new(owner: Edge, max: usize) -> Self {
        Self {
            successors: vec![owner.clone()],
            owner,
            max: max.max(1),
        }
    }

    /// The authoritative successor.
    pub fn head(&self) -> Edge {
        self.successors
            .first()
            .cloned()
            .unwrap_or_else(|| self.owner.clone())
    }

    pub fn get(&self, index: usize) -> Option<&Edge> {
        self.successors.get(index)
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.successors.len() >= self.max
    }

    pub fn list(&self) -> Vec<Edge> {
        self.successors.clone()
    }

    pub fn contains(&self, edge: &Edge) -> bool {
        self.successors.contains(edge)
    }

    /// Point the whole sequence to the owner.
    pub fn reset(&mut self) {
        self.successors = vec![self.owner.clone()];
    }

    /// Make `edge` the new head, dropping a duplicate of it further down the list.
    pub fn push_front(&mut self, edge: Edge) {
        self.successors.retain(|e| *e != edge);
        self.successors.insert(0, edge);
        self.successors.truncate(self.max);
    }

    /// Drop the first `n` entries, the owner takes over when nothing is left.
    pub fn drop_prefix(&mut self, n: usize) {
        let n = n.min(self.successors.len());
        self.successors.drain(..n);
        if self.successors.is_empty() {
            self.reset();
        }
    }

    /// Remove `edge`, the owner takes over when nothing is left.
    pub fn remove(&mut self, edge: &Edge) {
        self.successors.retain(|e| e != edge);
        if self.successors.is_empty() {
            self.reset();
        }
    }

    /// Rebuild from the head `from` and the list it advertised.
    /// The copy ends at the owner, who closes the ring.
    pub fn copy_from(&mut self, from: Edge, list: &[Edge]) {
        let mut ret = Vec::with_capacity(self.max);
        for e in std::iter::once(&from).chain(list.iter()) {
            if ret.len() >= self.max {
                break;
            }
            if ret.contains(e) {
                continue;
            }
            ret.push(e.clone());
            if *e == self.owner {
                break;
            }
        }
        self.successors = ret;
    }
}
