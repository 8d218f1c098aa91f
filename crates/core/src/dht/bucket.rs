#![warn(missing_docs)]
//! Routing buckets of the XOR metric.
//!
//! Contact `c` of a node `o` lives in bucket `o.did.bucket_index(c.did)`, the bucket
//! of the highest differing bit. Each bucket keeps at most K contacts, least
//! recently seen first.

use serde::Deserialize;
use serde::Serialize;

use crate::consts::RING_BITS;
use crate::dht::Did;
use crate::dht::Edge;

/// Outcome of recording a contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Touch {
    /// Already known, moved to the tail of its bucket.
    Refreshed,
    /// Added to its bucket.
    Inserted,
    /// The bucket is full. The caller pings the returned oldest contact, then
    /// either refreshes it or replaces it.
    Full(Edge),
    /// The owner itself is never recorded.
    Ignored,
}

/// A bucket of at most `max` contacts, least recently seen first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KBucket {
    max: usize,
    entries: Vec<Edge>,
}

impl KBucket {
    /// Empty bucket holding at most `max` contacts.
    pub fn new(max: usize) -> Self {
        Self {
            max,
            entries: Vec::with_capacity(max),
        }
    }

    /// Record `edge` as just seen.
    pub fn touch(&mut self, edge: Edge) -> Touch {
        if let Some(pos) = self.entries.iter().position(|e| *e == edge) {
            let e = self.entries.remove(pos);
            self.entries.push(e);
            return Touch::Refreshed;
        }
        if self.entries.len() < self.max {
            self.entries.push(edge);
            return Touch::Inserted;
        }
        Touch::Full(self.entries[0].clone())
    }

    /// Drop `old` and append `new`.
    pub fn replace(&mut self, old: &Edge, new: Edge) {
        self.entries.retain(|e| e != old);
        if !self.entries.contains(&new) && self.entries.len() < self.max {
            self.entries.push(new);
        }
    }

    /// Remove the contact listening on `addr`.
    pub fn remove(&mut self, addr: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.addr != addr);
        before != self.entries.len()
    }

    /// Contacts, least recently seen first.
    pub fn list(&self) -> &[Edge] {
        &self.entries
    }

    /// len
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The [RING_BITS] buckets of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingBuckets {
    owner: Edge,
    buckets: Vec<KBucket>,
}

impl RoutingBuckets {
    /// Empty buckets of `owner`, each holding up to `bucket_size` contacts.
    pub fn new(owner: Edge, bucket_size: usize) -> Self {
        Self {
            owner,
            buckets: vec![KBucket::new(bucket_size); RING_BITS],
        }
    }

    fn bucket_mut(&mut self, did: Did) -> Option<&mut KBucket> {
        let index = self.owner.did.bucket_index(did)?;
        self.buckets.get_mut(index)
    }

    /// Record `edge` as just seen.
    pub fn touch(&mut self, edge: Edge) -> Touch {
        if edge == self.owner {
            return Touch::Ignored;
        }
        match self.bucket_mut(edge.did) {
            Some(bucket) => bucket.touch(edge),
            None => Touch::Ignored,
        }
    }

    /// Replace the stale `old` by `new` in their shared bucket.
    pub fn replace(&mut self, old: &Edge, new: Edge) {
        if let Some(bucket) = self.bucket_mut(new.did) {
            bucket.replace(old, new);
        }
    }

    /// Forget the contact listening on `addr`.
    pub fn remove(&mut self, addr: &str) -> bool {
        self.buckets.iter_mut().any(|b| b.remove(addr))
    }

    /// Up to `n` contacts closest to `target`, nearest first.
    pub fn closest(&self, target: Did, n: usize) -> Vec<Edge> {
        let mut ret = self.contacts();
        ret.sort_by_key(|e| e.did.xor(target));
        ret.truncate(n);
        ret
    }

    /// Every known contact.
    pub fn contacts(&self) -> Vec<Edge> {
        self.buckets
            .iter()
            .flat_map(|b| b.list().iter().cloned())
            .collect()
    }

    /// Non empty buckets with their index.
    pub fn occupied(&self) -> Vec<(usize, &KBucket)> {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.is_empty())
            .collect()
    }

    /// Number of known contacts.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }

    /// is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
