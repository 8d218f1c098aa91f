//! Chord ring node: lookup, membership, stabilization and backup replication.
#![warn(missing_docs)]
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::did::Did;
use super::finger::FingerTable;
use super::stabilization::Stabilizer;
use super::successor::SuccessorSeq;
use super::types::Dht;
use super::types::Edge;
use crate::config::ChordConfig;
use crate::error::Error;
use crate::error::Result;
use crate::rpc::NodeService;
use crate::rpc::RemoteNode;
use crate::rpc::RpcServer;
use crate::storage::MemStorage;
use crate::transport;

/// Routing state of a node, always read and written under one lock.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    /// Undefined until a node notifies us, or after it was found dead.
    pub predecessor: Option<Edge>,
    /// Successor list, index 0 is authoritative.
    pub successors: SuccessorSeq,
    /// Finger table, finger 0 follows the head of the successor list.
    pub fingers: FingerTable,
}

impl RoutingTable {
    /// Routing table of a node knowing nobody but itself.
    pub fn new(owner: Edge, successor_list_len: usize) -> Self {
        Self {
            predecessor: None,
            successors: SuccessorSeq::new(owner.clone(), successor_list_len),
            fingers: FingerTable::new(owner),
        }
    }

    fn sync_first_finger(&mut self) {
        let head = self.successors.head();
        self.fingers.set(0, head);
    }
}

/// A node of the chord ring.
///
/// Keys are owned by the first node succeeding their hash on the ring. The owner keeps
/// them in its `primary` store and mirrors every mutation to its successor, which
/// keeps them in its `backup` store and adopts them once the owner disappears.
pub struct ChordNode {
    /// Position of the node, sha1 of its address.
    pub did: Did,
    edge: Edge,
    config: ChordConfig,
    routing: Mutex<RoutingTable>,
    /// Keys owned by this node.
    pub primary: MemStorage,
    /// Mirror of the predecessor's primary store.
    pub backup: MemStorage,
    active: AtomicBool,
    initialized: AtomicBool,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for ChordNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChordNode")
            .field("edge", &self.edge)
            .field("active", &self.is_active())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl ChordNode {
    /// Create a node that will listen on `addr`.
    pub fn new(addr: &str, config: ChordConfig) -> Self {
        let edge = Edge::new(addr);
        Self {
            did: edge.did,
            routing: Mutex::new(RoutingTable::new(
                edge.clone(),
                config.successor_list_len,
            )),
            edge,
            config,
            primary: MemStorage::new(),
            backup: MemStorage::new(),
            active: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
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
    pub fn config(&self) -> &ChordConfig {
        &self.config
    }

    /// The node is serving peers.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// The node is part of a ring and maintains it.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Lock and return MutexGuard of the routing table.
    pub fn lock_routing(&self) -> Result<MutexGuard<RoutingTable>> {
        self.routing.lock().map_err(|_| Error::DHTSyncLockError)
    }

    /// Head of the successor list.
    pub fn successor(&self) -> Result<Edge> {
        Ok(self.lock_routing()?.successors.head())
    }

    /// Current predecessor.
    pub fn predecessor(&self) -> Result<Option<Edge>> {
        Ok(self.lock_routing()?.predecessor.clone())
    }

    /// Current successor list.
    pub fn successor_list(&self) -> Result<Vec<Edge>> {
        Ok(self.lock_routing()?.successors.list())
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

    /// Bind the listener, then spawn the rpc server and the maintenance loop.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.addr()).await?;
        self.active.store(true, Ordering::SeqCst);
        tracing::info!("node {} listening on {}", self.did, self.addr());

        let server = RpcServer::new(
            listener,
            NodeService::new(self.clone()),
            self.shutdown.clone(),
        );
        tokio::spawn(server.serve());

        let stabilizer = Arc::new(Stabilizer::new(self.clone()));
        tokio::spawn(stabilizer.wait(self.config.stabilize_interval));
        Ok(())
    }

    /// Form a ring of one.
    pub fn create_network(&self) -> Result<()> {
        {
            let mut table = self.lock_routing()?;
            table.predecessor = Some(self.edge.clone());
            table.successors.reset();
            table.fingers.fill(&self.edge);
        }
        self.initialized.store(true, Ordering::SeqCst);
        tracing::info!("node {} created a new ring", self.edge);
        Ok(())
    }

    /// Join the ring known by `bootstrap`.
    ///
    /// The successor is resolved through the bootstrap node, the successor list is
    /// prefilled from the successor's one, fingers are resolved through the bootstrap,
    /// and finally the key range `(predecessor, self]` is pulled from the successor.
    /// Maintenance only starts once all of this succeeded.
    pub async fn join_network(&self, bootstrap: &str) -> Result<()> {
        let boot = self.remote(bootstrap);
        let succ = boot.find_successor(self.did).await?;
        if succ == self.edge {
            return Err(Error::UnexpectedResponse(format!(
                "{} already resolves to this node",
                bootstrap
            )));
        }
        tracing::info!("node {} joining ring at {}", self.edge, succ);

        let list = self
            .remote(&succ.addr)
            .get_successor_list()
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("failed to fetch successor list of {}: {}", succ, e);
                vec![]
            });
        {
            let mut table = self.lock_routing()?;
            table.predecessor = None;
            table.successors.copy_from(succ.clone(), &list);
            table.fingers.fill(&self.edge);
            table.sync_first_finger();
        }

        let fingers = self.resolve_fingers(&boot).await;
        {
            let mut table = self.lock_routing()?;
            for (i, f) in fingers.into_iter().enumerate().skip(1) {
                if let Some(f) = f {
                    table.fingers.set(i, f);
                }
            }
        }

        let moved = self
            .remote(&succ.addr)
            .move_range_to_predecessor(self.did)
            .await?;
        tracing::debug!("node {} took over {} keys", self.edge, moved.len());
        self.primary.extend(moved)?;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Resolve every finger through `boot`, one lookup per slot.
    async fn resolve_fingers(&self, boot: &RemoteNode) -> Vec<Option<Edge>> {
        let table = FingerTable::new(self.edge.clone());
        let mut ret = Vec::with_capacity(table.list().len());
        for i in 0..table.list().len() {
            match boot.find_successor(table.start(i)).await {
                Ok(f) => ret.push(Some(f)),
                Err(e) => {
                    tracing::debug!("failed to resolve finger {}: {}", i, e);
                    ret.push(None);
                }
            }
        }
        ret
    }

    /// Find the node responsible for `target`.
    pub async fn find_successor(&self, target: Did) -> Result<Edge> {
        let succ = self.fix_successor_list().await?;
        if succ == self.edge || target.in_range(self.did, succ.did) {
            return Ok(succ);
        }
        match self.closest_preceding_node(target).await? {
            Some(next) => self.remote(&next.addr).find_successor(target).await,
            None => Err(Error::UnableToFindSuccessor(target)),
        }
    }

    /// The live finger closest to `target` while still preceding it.
    /// Dead fingers are evicted on the way.
    pub async fn closest_preceding_node(&self, target: Did) -> Result<Option<Edge>> {
        let candidates = self.lock_routing()?.fingers.preceding(target);
        let mut dead = HashSet::new();
        for c in candidates {
            if dead.contains(&c.addr) {
                continue;
            }
            if self.ping(&c.addr).await {
                return Ok(Some(c));
            }
            tracing::debug!("finger {} is unreachable, evicted", c);
            self.lock_routing()?.fingers.evict(&c.addr);
            dead.insert(c.addr);
        }
        Ok(None)
    }

    /// Make the first live entry of the successor list its head.
    pub async fn fix_successor_list(&self) -> Result<Edge> {
        let list = self.successor_list()?;
        let mut live = None;
        for (i, e) in list.iter().enumerate() {
            if *e == self.edge || self.ping(&e.addr).await {
                live = Some(i);
                break;
            }
        }
        let Some(i) = live else {
            tracing::error!("node {}: every successor is unreachable", self.edge);
            return Err(Error::SuccessorListExhausted);
        };
        if i == 0 {
            return Ok(list[0].clone());
        }

        let dead = &list[..i];
        let head = {
            let mut table = self.lock_routing()?;
            if table.successors.list().starts_with(dead) {
                table.successors.drop_prefix(i);
            } else {
                for d in dead {
                    table.successors.remove(d);
                }
            }
            for d in dead {
                table.fingers.evict(&d.addr);
            }
            table.sync_first_finger();
            table.successors.head()
        };
        tracing::info!(
            "node {}: dropped {} dead successors, new successor {}",
            self.edge,
            i,
            head
        );

        if head != self.edge {
            let remote = self.remote(&head.addr);
            let me = self.edge.clone();
            let grace = self.config.notify_grace;
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                if let Err(e) = remote.notify(me).await {
                    tracing::warn!("failed to notify new successor {}: {}", remote.addr(), e);
                }
            });
        }
        Ok(head)
    }

    fn accepts_predecessor(&self, table: &RoutingTable, candidate: &Edge) -> bool {
        match &table.predecessor {
            None => true,
            Some(pred) => *pred != *candidate && candidate.did.owned_by(pred.did, self.did),
        }
    }

    /// `candidate` thinks it might be our predecessor.
    /// On acceptance its primary store becomes our backup.
    pub async fn notify(&self, candidate: Edge) -> Result<()> {
        let accept = {
            let table = self.lock_routing()?;
            self.accepts_predecessor(&table, &candidate)
        };
        if !accept {
            return Ok(());
        }
        let snapshot = if candidate == self.edge {
            self.primary.snapshot()?
        } else {
            self.remote(&candidate.addr).get_primary_snapshot().await?
        };

        let mut table = self.lock_routing()?;
        // predecessor may have moved while pulling
        if !self.accepts_predecessor(&table, &candidate) {
            return Ok(());
        }
        tracing::debug!("node {}: predecessor is now {}", self.edge, candidate);
        table.predecessor = Some(candidate);
        self.backup.replace(snapshot)?;
        Ok(())
    }

    /// Adopt the predecessor of our successor when it sits between us, then notify
    /// the successor.
    pub async fn stabilize(&self) -> Result<()> {
        let succ = self.fix_successor_list().await?;
        let x = if succ == self.edge {
            self.predecessor()?
        } else {
            self.remote(&succ.addr).get_predecessor().await?
        };
        if let Some(x) = x {
            let between = succ == self.edge || x.did.in_range(self.did, succ.did);
            if x != succ && x != self.edge && between && self.ping(&x.addr).await {
                tracing::debug!("node {}: successor {} replaced by {}", self.edge, succ, x);
                self.insert_successor(x).await?;
            }
        }

        let head = self.successor()?;
        if head == self.edge {
            let mut table = self.lock_routing()?;
            if table.predecessor.is_none() {
                table.predecessor = Some(self.edge.clone());
            }
            return Ok(());
        }
        self.remote(&head.addr).notify(self.edge.clone()).await
    }

    /// Put `edge` at the head of the successor list and warm its backup with our primary store.
    pub async fn insert_successor(&self, edge: Edge) -> Result<()> {
        if edge == self.edge {
            let mut table = self.lock_routing()?;
            table.successors.reset();
            table.sync_first_finger();
            return Ok(());
        }
        {
            let mut table = self.lock_routing()?;
            table.successors.push_front(edge.clone());
            table.sync_first_finger();
        }
        let snapshot = self.primary.snapshot()?;
        self.remote(&edge.addr).fill_backup_store(snapshot).await
    }

    /// Overwrite the predecessor, used by a leaving node to patch the ring.
    pub fn update_predecessor(&self, edge: Edge) -> Result<()> {
        let mut table = self.lock_routing()?;
        tracing::debug!("node {}: predecessor set to {}", self.edge, edge);
        table.predecessor = Some(edge);
        Ok(())
    }

    /// Ping the predecessor, adopt its range from the backup when it is gone.
    pub async fn check_predecessor(&self) -> Result<()> {
        let Some(pred) = self.predecessor()? else {
            return Ok(());
        };
        if pred == self.edge || self.ping(&pred.addr).await {
            return Ok(());
        }

        let adopted = {
            let mut table = self.lock_routing()?;
            if table.predecessor.as_ref() != Some(&pred) {
                return Ok(());
            }
            table.predecessor = None;
            self.backup.merge_into(&self.primary)?
        };
        tracing::info!(
            "node {}: predecessor {} is gone, adopted {} keys",
            self.edge,
            pred,
            adopted
        );
        self.push_backup_to_successor().await
    }

    /// Replace the backup of our successor with our primary store.
    async fn push_backup_to_successor(&self) -> Result<()> {
        let succ = self.successor()?;
        if succ == self.edge {
            return Ok(());
        }
        let snapshot = self.primary.snapshot()?;
        self.remote(&succ.addr).fill_backup_store(snapshot).await
    }

    /// Advertise our successor list to the predecessor.
    pub async fn maintain_successor_list(&self) -> Result<()> {
        let (pred, list) = {
            let table = self.lock_routing()?;
            (table.predecessor.clone(), table.successors.list())
        };
        match pred {
            Some(pred) if pred != self.edge => {
                self.remote(&pred.addr)
                    .copy_successor_list(self.edge.clone(), list)
                    .await
            }
            _ => Ok(()),
        }
    }

    /// Rebuild the successor list from the one advertised by our head.
    pub fn copy_successor_list(&self, from: Edge, list: Vec<Edge>) -> Result<()> {
        let mut table = self.lock_routing()?;
        if table.successors.head() != from {
            return Ok(());
        }
        table.successors.copy_from(from, &list);
        table.sync_first_finger();
        Ok(())
    }

    /// Refresh the next finger of the round-robin cursor.
    pub async fn fix_fingers(&self) -> Result<()> {
        let (index, start) = {
            let mut table = self.lock_routing()?;
            let index = table.fingers.next_fix();
            (index, table.fingers.start(index))
        };
        let edge = self.find_successor(start).await?;
        self.lock_routing()?.fingers.set(index, edge);
        Ok(())
    }

    /// Read a key of the primary store.
    pub fn query_inside(&self, key: &str) -> Result<String> {
        self.primary
            .get(key)?
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    /// Write a key of the primary store and mirror it to the successor.
    pub async fn insert_inside(&self, key: &str, value: &str) -> Result<()> {
        self.primary.put(key, value)?;
        let succ = self.successor()?;
        if succ != self.edge {
            if let Err(e) = self.remote(&succ.addr).insert_backup_entry(key, value).await {
                tracing::warn!("failed to mirror {} to {}: {}", key, succ, e);
            }
        }
        Ok(())
    }

    /// Remove a key of the primary store and mirror it to the successor.
    pub async fn erase_inside(&self, key: &str) -> Result<()> {
        if !self.primary.remove(key)? {
            return Err(Error::KeyNotFound(key.to_string()));
        }
        let succ = self.successor()?;
        if succ != self.edge {
            if let Err(e) = self.remote(&succ.addr).remove_backup_entry(key).await {
                tracing::warn!("failed to mirror removal of {} to {}: {}", key, succ, e);
            }
        }
        Ok(())
    }

    /// A node joins at `new_pred`: hand it every key outside `(new_pred, self]`.
    pub async fn move_range_to_predecessor(
        &self,
        new_pred: Did,
    ) -> Result<HashMap<String, String>> {
        let moved = self
            .primary
            .snapshot_and_clear(|k| !Did::hash(k).in_range(new_pred, self.did))?;
        // the joining node is about to become our predecessor
        self.backup.extend(moved.clone())?;
        tracing::debug!(
            "node {}: handed {} keys to joining node {}",
            self.edge,
            moved.len(),
            new_pred
        );
        if let Err(e) = self.push_backup_to_successor().await {
            tracing::warn!("failed to refresh backup of successor: {}", e);
        }
        Ok(moved)
    }

    /// The predecessor is leaving and hands its primary store over.
    pub async fn move_range_from_predecessor(&self, entries: HashMap<String, String>) -> Result<()> {
        tracing::debug!("node {}: ingesting {} keys", self.edge, entries.len());
        self.primary.extend(entries)?;
        if let Err(e) = self.push_backup_to_successor().await {
            tracing::warn!("failed to refresh backup of successor: {}", e);
        }
        Ok(())
    }

    /// Replace the backup store, sent by the predecessor.
    pub fn fill_backup_store(&self, entries: HashMap<String, String>) -> Result<()> {
        self.backup.replace(entries)
    }

    /// Store `value` at the owner of `key`.
    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_active()?;
        let owner = self.find_successor(Did::hash(key)).await?;
        if owner == self.edge {
            self.insert_inside(key, value).await
        } else {
            self.remote(&owner.addr).insert_inside(key, value).await
        }
    }

    /// Read `key` from its owner.
    pub async fn get(&self, key: &str) -> Result<String> {
        self.ensure_active()?;
        let owner = self.find_successor(Did::hash(key)).await?;
        if owner == self.edge {
            self.query_inside(key)
        } else {
            self.remote(&owner.addr).query_inside(key).await
        }
    }

    /// Remove `key` at its owner.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.ensure_active()?;
        let owner = self.find_successor(Did::hash(key)).await?;
        if owner == self.edge {
            self.erase_inside(key).await
        } else {
            self.remote(&owner.addr).erase_inside(key).await
        }
    }

    /// Leave the ring, handing primary and backup stores to the successor.
    pub async fn quit(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        self.initialized.store(false, Ordering::SeqCst);
        let ret = self.handoff().await;
        if let Err(e) = &ret {
            tracing::error!("node {}: handoff failed: {}", self.edge, e);
        }
        self.stop();
        tracing::info!("node {} quit", self.edge);
        ret
    }

    async fn handoff(&self) -> Result<()> {
        let succ = self.fix_successor_list().await?;
        if succ == self.edge {
            return Ok(());
        }
        let remote = self.remote(&succ.addr);
        remote
            .move_range_from_predecessor(self.primary.snapshot()?)
            .await?;
        remote.fill_backup_store(self.backup.snapshot()?).await?;
        if let Some(pred) = self.predecessor()? {
            if pred != self.edge {
                let patched = self.remote(&pred.addr).insert_successor(succ).await;
                // a dead predecessor is still handed over, the successor adopts its range
                remote.update_predecessor(pred).await?;
                patched?;
            }
        }
        Ok(())
    }

    /// Stop serving without any handoff.
    pub fn force_quit(&self) {
        self.stop();
        tracing::info!("node {} force quit", self.edge);
    }

    fn stop(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
    }
}

#[async_trait]
impl Dht for ChordNode {
    fn run(self: &Arc<Self>) -> BoxFuture<'_, Result<()>> {
        Box::pin(ChordNode::run(self))
    }

    fn addr(&self) -> &str {
        ChordNode::addr(self)
    }

    fn is_active(&self) -> bool {
        ChordNode::is_active(self)
    }

    async fn create(&self) {
        if let Err(e) = self.create_network() {
            tracing::error!("failed to create ring: {}", e);
        }
    }

    async fn join(&self, addr: &str) -> bool {
        match self.join_network(addr).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("failed to join ring via {}: {}", addr, e);
                false
            }
        }
    }

    async fn quit(&self) {
        let _ = ChordNode::quit(self).await;
    }

    async fn force_quit(&self) {
        ChordNode::force_quit(self)
    }

    async fn ping(&self, addr: &str) -> bool {
        ChordNode::ping(self, addr).await
    }

    async fn put(&self, key: &str, value: &str) -> bool {
        match ChordNode::put(self, key, value).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("put {} failed: {}", key, e);
                false
            }
        }
    }

    async fn get(&self, key: &str) -> Option<String> {
        match ChordNode::get(self, key).await {
            Ok(v) => Some(v),
            Err(Error::KeyNotFound(_)) => None,
            Err(e) => {
                tracing::warn!("get {} failed: {}", key, e);
                None
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        match ChordNode::delete(self, key).await {
            Ok(()) => true,
            Err(Error::KeyNotFound(_)) => false,
            Err(e) => {
                tracing::warn!("delete {} failed: {}", key, e);
                false
            }
        }
    }
}
