//! DHT types about `Edge` and the routing strategy `Dht`.
#![warn(missing_docs)]
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde::Serialize;

use super::did::Did;
use crate::error::Result;

/// A reference to a peer: its listening address and its position on the ring.
///
/// The address is the identity of a peer, the [Did] is derived from it, so two edges
/// are equal as soon as they point to the same address.
#[derive(Clone, Debug, Serialize, Deserialize, Eq)]
pub struct Edge {
    /// Listening address, `host:port`.
    pub addr: String,
    /// Ring position, sha1 of `addr`.
    pub did: Did,
}

impl Edge {
    /// Build an edge from an address, hashing it onto the ring.
    pub fn new(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        let did = Did::hash(&addr);
        Self { addr, did }
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}({})", self.addr, self.did)
    }
}

/// Dht is the local surface of a node taking part in a distributed hash table.
///
/// Chord is a distributed hash table (DHT) algorithm that is designed to efficiently
/// distribute data across peer-to-peer network nodes. You may want to browse its
/// [wiki](https://en.wikipedia.org/wiki/Chord_(peer-to-peer)) before you read this.
///
/// The trait only fixes how an embedding process drives a node. How a key is mapped
/// to its owner, and how ownership is replicated, is left to the implementation:
/// [ChordNode](super::ChordNode) routes over a ring, [KadNode](super::KadNode) over
/// XOR distance buckets, both on the same storage and transport.
///
/// Every method collapses failures into `false` or `None`, errors are logged by the
/// implementation. Use the inherent methods of an implementation to get a [Result].
/// Inherent methods shadow the trait ones on a concrete node, call through the trait
/// with `Dht::put(&*node, ..)` or from generic code.
#[async_trait]
pub trait Dht: Send + Sync {
    /// Start serving peers. Must be called before `create` or `join`.
    fn run(self: &Arc<Self>) -> BoxFuture<'_, Result<()>>;

    /// Listening address.
    fn addr(&self) -> &str;

    /// The node is serving peers.
    fn is_active(&self) -> bool;

    /// Form a new ring containing only this node.
    async fn create(&self);

    /// Join the ring known by the node listening on `addr`.
    async fn join(&self, addr: &str) -> bool;

    /// Leave the ring, handing stored data to the neighbours.
    async fn quit(&self);

    /// Stop immediately, as if the process crashed.
    async fn force_quit(&self);

    /// Check whether a node is listening on `addr`.
    async fn ping(&self, addr: &str) -> bool;

    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: &str) -> bool;

    /// Look up the value stored under `key`.
    async fn get(&self, key: &str) -> Option<String>;

    /// Remove `key`. Returns `false` when it was absent or the owner could not be reached.
    async fn delete(&self, key: &str) -> bool;
}
