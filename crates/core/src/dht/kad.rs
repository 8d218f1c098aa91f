//! Bucket routing node: iterative lookups over the XOR metric and K-fold replication.
#![warn(missing_docs)]
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::future::FutureExt;
use futures::pin_mut;
use futures::select;
use futures_timer::Delay;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::bucket::RoutingBuckets;
use super::bucket::Touch;
use super::did::Did;
use super::types::Dht;
use super::types::Edge;
use crate::config::KadConfig;
use crate::error::Error;
use crate::error::Result;
use crate::rpc::FoundValue;
use crate::rpc::KadService;
use crate::rpc::RemoteNode;
use crate::rpc::RpcServer;
use crate::storage::MemStorage;
use crate::transport;

fn next_unqueried(shortlist: &[Edge], queried: &HashSet<String>) -> Option<Edge> {
    shortlist
        .iter()
        .find(|e| !queried.contains(&e.addr))
        .cloned()
}

/// A node routing over XOR distance buckets.
///
/// A key is replicated at the `bucket_size` nodes closest to its hash. Lookups walk
/// iteratively towards the target, every node that answers is recorded in the
/// buckets and every unreachable one is forgotten. Replicas are republished
/// periodically, so a node entering the closest set of a key eventually holds it.
pub struct KadNode {
    /// Position of the node, sha1 of its address.
    pub did: Did,
    edge: Edge,
    config: KadConfig,
    buckets: Mutex<RoutingBuckets>,
    /// Replicas held by this node.
    pub storage: MemStorage,
    active: AtomicBool,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for KadNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KadNode")
            .field("edge", &self.edge)
            .field("active", &self.is_active())
            .finish()
    }
}

impl KadNode {
    /// Create a node that will listen on `addr`.
    pub fn new(addr: &str, config: KadConfig) -> Self {
        let edge = Edge::new(addr);
        Self {
            did: edge.did,
            buckets: Mutex::new(RoutingBuckets::new(edge.clone(), config.bucket_size)),
            edge,
            config,
            storage: MemStorage::new(),
            active: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Listening address.
    pub fn addr(&self) -> &str {
        &self.edge.addr
    }

    /// Edge pointing to this node.
    pub fn edge(&self) -> Edge {
        self.edge.clone()
    }

    /// Configuration the node was built with.
    pub fn config(&self) -> &KadConfig {
        &self.config
    }

    /// The node is serving peers.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Lock and return MutexGuard of the routing buckets.
    pub fn lock_buckets(&self) -> Result<MutexGuard<RoutingBuckets>> {
        self.buckets.lock().map_err(|_| Error::DHTSyncLockError)
    }

    /// Every known contact.
    pub fn contacts(&self) -> Result<Vec<Edge>> {
        Ok(self.lock_buckets()?.contacts())
    }

    fn ensure_active(&self) -> Result<()> {
        if !self.is_active() {
            return Err(Error::NodeInactive);
        }
        Ok(())
    }

    fn remote(&self, addr: &str) -> RemoteNode {
        RemoteNode::new(addr, self.config.transport)
    }

    /// Liveness check with the retry budget of this node.
    pub async fn ping(&self, addr: &str) -> bool {
        transport::ping(addr, &self.config.transport).await
    }

    /// Bind the listener, then spawn the rpc server and the republish loop.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.addr()).await?;
        self.active.store(true, Ordering::SeqCst);
        tracing::info!("kad node {} listening on {}", self.did, self.addr());

        let server = RpcServer::new(
            listener,
            KadService::new(self.clone()),
            self.shutdown.clone(),
        );
        tokio::spawn(server.serve());
        tokio::spawn(self.clone().republish_loop());
        Ok(())
    }

    async fn republish_loop(self: Arc<Self>) {
        while self.is_active() {
            let timeout = Delay::new(self.config.republish_interval).fuse();
            let stopped = self.shutdown.cancelled().fuse();
            pin_mut!(timeout, stopped);
            select! {
                _ = timeout => {
                    if let Err(e) = self.republish().await {
                        tracing::warn!("[republish] Failed on {}: {:?}", self.edge, e);
                    }
                }
                _ = stopped => break,
            }
        }
        tracing::debug!("REPUBLISH stopped for {}", self.addr());
    }

    /// A network of one needs no setup.
    pub fn create_network(&self) -> Result<()> {
        tracing::info!("kad node {} created a new network", self.edge);
        Ok(())
    }

    /// Join through `bootstrap`, then look our own identifier up so the nodes close
    /// to us learn about us.
    pub async fn join_network(&self, bootstrap: &str) -> Result<()> {
        let boot = Edge::new(bootstrap);
        if boot == self.edge {
            return Err(Error::UnexpectedResponse(format!(
                "{} is this node",
                bootstrap
            )));
        }
        self.remote(bootstrap)
            .find_node(self.did, self.edge())
            .await?;
        self.observe(boot).await?;
        let closest = self.lookup(self.did).await?;
        tracing::info!(
            "kad node {} joined through {}, {} nodes nearby",
            self.edge,
            bootstrap,
            closest.len() - 1
        );
        Ok(())
    }

    /// Record a contact that just answered us or sent us a request.
    /// A newly recorded contact receives the keys it is closer to than we are.
    pub async fn observe(&self, edge: Edge) -> Result<()> {
        let touched = self.lock_buckets()?.touch(edge.clone());
        let inserted = match touched {
            Touch::Inserted => true,
            Touch::Refreshed | Touch::Ignored => false,
            Touch::Full(oldest) => {
                if self.ping(&oldest.addr).await {
                    self.lock_buckets()?.touch(oldest);
                    false
                } else {
                    tracing::debug!("contact {} is unreachable, replaced by {}", oldest, edge);
                    self.lock_buckets()?.replace(&oldest, edge.clone());
                    true
                }
            }
        };
        if inserted {
            if let Err(e) = self.hand_over_closer(&edge).await {
                tracing::warn!("failed to hand keys over to {}: {}", edge, e);
            }
        }
        Ok(())
    }

    async fn hand_over_closer(&self, to: &Edge) -> Result<()> {
        let remote = self.remote(&to.addr);
        let mut moved = 0;
        for (key, value) in self.storage.snapshot()? {
            let did = Did::hash(&key);
            if did.xor(to.did) < did.xor(self.did) {
                remote.store(&key, &value, self.edge()).await?;
                moved += 1;
            }
        }
        if moved > 0 {
            tracing::debug!("node {}: handed {} keys to {}", self.edge, moved, to);
        }
        Ok(())
    }

    /// The `bucket_size` live nodes closest to `target`, this node included,
    /// nearest first.
    pub async fn lookup(&self, target: Did) -> Result<Vec<Edge>> {
        let mut ret = self.lookup_others(target).await?;
        ret.push(self.edge());
        ret.sort_by_key(|e| e.did.xor(target));
        ret.truncate(self.config.bucket_size);
        Ok(ret)
    }

    /// The `bucket_size` live nodes closest to `target` other than this one.
    async fn lookup_others(&self, target: Did) -> Result<Vec<Edge>> {
        let k = self.config.bucket_size;
        let mut shortlist = self.lock_buckets()?.closest(target, k);
        let mut queried = HashSet::new();
        let mut dead = HashSet::new();
        while let Some(next) = next_unqueried(&shortlist, &queried) {
            queried.insert(next.addr.clone());
            match self.remote(&next.addr).find_node(target, self.edge()).await {
                Ok(found) => {
                    self.observe(next).await?;
                    for e in found {
                        if e != self.edge && !dead.contains(&e.addr) && !shortlist.contains(&e) {
                            shortlist.push(e);
                        }
                    }
                    shortlist.sort_by_key(|e| e.did.xor(target));
                    shortlist.truncate(k);
                }
                Err(e) => {
                    tracing::debug!("contact {} is unreachable, forgotten: {}", next, e);
                    self.lock_buckets()?.remove(&next.addr);
                    dead.insert(next.addr.clone());
                    shortlist.retain(|x| *x != next);
                }
            }
        }
        Ok(shortlist)
    }

    /// Walk towards `key` until a node holding it answers.
    async fn lookup_value(&self, key: &str) -> Result<String> {
        let target = Did::hash(key);
        let k = self.config.bucket_size;
        let mut shortlist = self.lock_buckets()?.closest(target, k);
        let mut queried = HashSet::new();
        while let Some(next) = next_unqueried(&shortlist, &queried) {
            queried.insert(next.addr.clone());
            match self.remote(&next.addr).find_value(key, self.edge()).await {
                Ok(FoundValue::Value(v)) => {
                    self.observe(next).await?;
                    return Ok(v);
                }
                Ok(FoundValue::Closer(found)) => {
                    self.observe(next).await?;
                    for e in found {
                        if e != self.edge && !queried.contains(&e.addr) && !shortlist.contains(&e) {
                            shortlist.push(e);
                        }
                    }
                    shortlist.sort_by_key(|e| e.did.xor(target));
                    shortlist.truncate(k);
                }
                Err(e) => {
                    tracing::debug!("contact {} is unreachable, forgotten: {}", next, e);
                    self.lock_buckets()?.remove(&next.addr);
                    shortlist.retain(|x| *x != next);
                }
            }
        }
        Err(Error::KeyNotFound(key.to_string()))
    }

    /// Contacts closest to `target`, served to `from`.
    pub async fn find_node(&self, target: Did, from: Edge) -> Result<Vec<Edge>> {
        self.observe(from).await?;
        Ok(self.lock_buckets()?.closest(target, self.config.bucket_size))
    }

    /// The local replica of `key`, or the contacts closest to it.
    pub async fn find_value(&self, key: &str, from: Edge) -> Result<FoundValue> {
        self.observe(from).await?;
        if let Some(v) = self.storage.get(key)? {
            return Ok(FoundValue::Value(v));
        }
        let closest = self
            .lock_buckets()?
            .closest(Did::hash(key), self.config.bucket_size);
        Ok(FoundValue::Closer(closest))
    }

    /// Keep a replica sent by `from`.
    pub async fn store(&self, key: &str, value: &str, from: Edge) -> Result<()> {
        self.observe(from).await?;
        self.storage.put(key, value)
    }

    /// Drop the replica of `key`, as asked by `from`.
    pub async fn remove(&self, key: &str, from: Edge) -> Result<bool> {
        self.observe(from).await?;
        self.storage.remove(key)
    }

    async fn store_at(&self, targets: &[Edge], key: &str, value: &str) -> usize {
        let mut stored = 0;
        for t in targets {
            let ret = if *t == self.edge {
                self.storage.put(key, value)
            } else {
                self.remote(&t.addr).store(key, value, self.edge()).await
            };
            match ret {
                Ok(()) => stored += 1,
                Err(e) => tracing::warn!("failed to store {} at {}: {}", key, t, e),
            }
        }
        stored
    }

    /// Push every held replica to the closest nodes of its key.
    pub async fn republish(&self) -> Result<()> {
        let entries = self.storage.snapshot()?;
        for (key, value) in entries {
            let targets = self.lookup(Did::hash(&key)).await?;
            // dropped meanwhile
            if self.storage.get(&key)?.as_ref() != Some(&value) {
                continue;
            }
            let others: Vec<Edge> = targets.into_iter().filter(|t| *t != self.edge).collect();
            self.store_at(&others, &key, &value).await;
        }
        Ok(())
    }

    /// Store `value` at the nodes closest to `key`.
    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_active()?;
        let targets = self.lookup(Did::hash(key)).await?;
        if self.store_at(&targets, key, value).await == 0 {
            return Err(Error::NoReplicaAccepted(key.to_string()));
        }
        Ok(())
    }

    /// Read `key`, from the local replica when there is one.
    pub async fn get(&self, key: &str) -> Result<String> {
        self.ensure_active()?;
        if let Some(v) = self.storage.get(key)? {
            return Ok(v);
        }
        self.lookup_value(key).await
    }

    /// Remove every replica of `key` reachable from the closest nodes.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.ensure_active()?;
        let targets = self.lookup(Did::hash(key)).await?;
        let mut removed = self.storage.remove(key)?;
        for t in targets.iter().filter(|t| **t != self.edge) {
            match self.remote(&t.addr).remove(key, self.edge()).await {
                Ok(r) => removed |= r,
                Err(e) => tracing::warn!("failed to remove {} at {}: {}", key, t, e),
            }
        }
        if !removed {
            return Err(Error::KeyNotFound(key.to_string()));
        }
        Ok(())
    }

    /// Leave, pushing every held replica to the closest remaining nodes.
    pub async fn quit(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let ret = self.hand_off().await;
        if let Err(e) = &ret {
            tracing::error!("node {}: handoff failed: {}", self.edge, e);
        }
        self.stop();
        tracing::info!("kad node {} quit", self.edge);
        ret
    }

    async fn hand_off(&self) -> Result<()> {
        for (key, value) in self.storage.snapshot()? {
            let targets = self.lookup_others(Did::hash(&key)).await?;
            if self.store_at(&targets, &key, &value).await == 0 && !targets.is_empty() {
                tracing::warn!("node {}: no node took over {}", self.edge, key);
            }
        }
        Ok(())
    }

    /// Stop serving without any handoff.
    pub fn force_quit(&self) {
        self.stop();
        tracing::info!("kad node {} force quit", self.edge);
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
    }
}

#[async_trait]
impl Dht for KadNode {
    fn run(self: &Arc<Self>) -> BoxFuture<'_, Result<()>> {
        Box::pin(KadNode::run(self))
    }

    fn addr(&self) -> &str {
        KadNode::addr(self)
    }

    fn is_active(&self) -> bool {
        KadNode::is_active(self)
    }

    async fn create(&self) {
        if let Err(e) = self.create_network() {
            tracing::error!("failed to create network: {}", e);
        }
    }

    async fn join(&self, addr: &str) -> bool {
        match self.join_network(addr).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("failed to join network via {}: {}", addr, e);
                false
            }
        }
    }

    async fn quit(&self) {
        let _ = KadNode::quit(self).await;
    }

    async fn force_quit(&self) {
        KadNode::force_quit(self)
    }

    async fn ping(&self, addr: &str) -> bool {
        KadNode::ping(self, addr).await
    }

    async fn put(&self, key: &str, value: &str) -> bool {
        match KadNode::put(self, key, value).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("put {} failed: {}", key, e);
                false
            }
        }
    }

    async fn get(&self, key: &str) -> Option<String> {
        match KadNode::get(self, key).await {
            Ok(v) => Some(v),
            Err(Error::KeyNotFound(_)) => None,
            Err(e) => {
                tracing::warn!("get {} failed: {}", key, e);
                None
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        match KadNode::delete(self, key).await {
            Ok(()) => true,
            Err(Error::KeyNotFound(_)) => false,
            Err(e) => {
                tracing::warn!("delete {} failed: {}", key, e);
                false
            }
        }
    }
}
