#![warn(missing_docs)]
use std::ops::Index;

use serde::Deserialize;
use serde::Serialize;

use crate::consts::RING_BITS;
use crate::dht::Did;
use crate::dht::Edge;

/// Finger table of Chord DHT.
/// The i-th finger points to the first node succeeding `did + 2^i`.
/// Slots that are unset or were evicted hold the owner's own edge.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FingerTable {
    owner: Edge,
    finger: Vec<Edge>,
    pub(super) fix_finger_index: usize,
}

impl FingerTable {
    /// builder, every slot starts as the owner itself.
    pub fn new(owner: Edge) -> Self {
        Self {
            finger: vec![owner.clone(); RING_BITS],
            owner,
            fix_finger_index: 1,
        }
    }

    /// Start of the i-th finger interval.
    pub fn start(&self, index: usize) -> Did {
        self.owner.did + Did::pow2(index)
    }

    /// getter
    pub fn get(&self, index: usize) -> Option<&Edge> {
        self.finger.get(index)
    }

    /// setter
    pub fn set(&mut self, index: usize, edge: Edge) {
        if index >= self.finger.len() {
            tracing::error!("set finger index out of range, index: {}", index);
            return;
        }
        self.finger[index] = edge;
    }

    /// Point every slot to `edge`.
    pub fn fill(&mut self, edge: &Edge) {
        for f in self.finger.iter_mut() {
            *f = edge.clone();
        }
    }

    /// Return the slot to be refreshed and move the cursor to the next one.
    /// Slot 0 follows the successor list and is skipped.
    pub fn next_fix(&mut self) -> usize {
        let index = self.fix_finger_index.max(1);
        self.fix_finger_index = if index + 1 < self.finger.len() {
            index + 1
        } else {
            1
        };
        index
    }

    /// Reset every slot pointing to `addr` to the owner.
    pub fn evict(&mut self, addr: &str) {
        for f in self.finger.iter_mut().filter(|f| f.addr == addr) {
            *f = self.owner.clone();
        }
    }

    /// Whether a slot holds the self sentinel.
    pub fn is_sentinel(&self, index: usize) -> bool {
        self.finger
            .get(index)
            .map(|f| *f == self.owner)
            .unwrap_or(true)
    }

    /// Fingers strictly between the owner and `target`, farthest first.
    /// This is the candidate order of the closest preceding node search.
    /// When `target` is the owner itself, the whole ring precedes it.
    pub fn preceding(&self, target: Did) -> Vec<Edge> {
        let full_circle = target == self.owner.did;
        self.finger
            .iter()
            .rev()
            .filter(|f| **f != self.owner)
            .filter(|f| {
                f.did != target && (full_circle || f.did.in_range(self.owner.did, target))
            })
            .cloned()
            .collect()
    }

    /// Number of distinct remote nodes referenced.
    pub fn len(&self) -> usize {
        let mut addrs: Vec<&str> = self
            .finger
            .iter()
            .filter(|f| **f != self.owner)
            .map(|f| f.addr.as_str())
            .collect();
        addrs.sort_unstable();
        addrs.dedup();
        addrs.len()
    }

    /// is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// get finger list
    pub fn list(&self) -> &Vec<Edge> {
        &self.finger
    }
}

impl Index<usize> for FingerTable {
    type Output = Edge;
    fn index(&self, index: usize) -> &Self::Output {
        &self.finger[index]
    }
}
