//! In-process cluster driver: boots a network on loopback, drives random client traffic
//! through random members, kills members gracefully or abruptly and verifies that every
//! acknowledged write is still readable afterwards. Members are driven through the
//! [Dht] surface, so either routing can be put under load.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chordring_core::config::ChordConfig;
use chordring_core::config::KadConfig;
use chordring_core::dht::ChordNode;
use chordring_core::dht::Dht;
use chordring_core::dht::KadNode;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rand::SeedableRng;
use serde::Serialize;

use crate::config::Routing;
use crate::error::Error;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Members of the ring.
    pub nodes: usize,
    /// Members leaving after the insertion phase, half of them without handoff on average.
    pub quits: usize,
    /// Puts issued by each worker.
    pub inserts: usize,
    /// Concurrent client workers.
    pub workers: usize,
    /// Distinct keys per worker, smaller than `inserts` to exercise overwrites.
    pub key_space: usize,
    /// Pause after every join and departure.
    pub settle: Duration,
    /// Highest tolerated share of failed checks.
    pub max_fail_rate: f64,
    pub seed: u64,
    pub routing: Routing,
    pub chord: ChordConfig,
    pub kad: KadConfig,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            nodes: 10,
            quits: 5,
            inserts: 200,
            workers: 4,
            key_space: 128,
            settle: Duration::from_millis(600),
            max_fail_rate: 0.0,
            seed: rand::random(),
            routing: Routing::default(),
            chord: ChordConfig::default(),
            kad: KadConfig::default(),
        }
    }
}

/// Counters of a stress run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub seed: u64,
    pub puts: usize,
    pub put_failures: usize,
    pub gets: usize,
    pub get_failures: usize,
    pub deletes: usize,
    pub delete_failures: usize,
    pub quits: usize,
    pub force_quits: usize,
}

impl Report {
    pub fn checks(&self) -> usize {
        self.puts + self.gets + self.deletes
    }

    pub fn failures(&self) -> usize {
        self.put_failures + self.get_failures + self.delete_failures
    }

    pub fn fail_rate(&self) -> f64 {
        if self.checks() == 0 {
            return 0.0;
        }
        self.failures() as f64 / self.checks() as f64
    }

    fn merge(&mut self, other: &Report) {
        self.puts += other.puts;
        self.put_failures += other.put_failures;
        self.gets += other.gets;
        self.get_failures += other.get_failures;
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seed {}: put {}/{} get {}/{} delete {}/{} quit {} force_quit {} fail rate {:.4}",
            self.seed,
            self.puts - self.put_failures,
            self.puts,
            self.gets - self.get_failures,
            self.gets,
            self.deletes - self.delete_failures,
            self.deletes,
            self.quits,
            self.force_quits,
            self.fail_rate()
        )
    }
}

/// A node the stress driver can boot.
pub trait Member: Dht + 'static {
    fn spawn(addr: &str, config: &StressConfig) -> Self;
}

impl Member for ChordNode {
    fn spawn(addr: &str, config: &StressConfig) -> Self {
        ChordNode::new(addr, config.chord)
    }
}

impl Member for KadNode {
    fn spawn(addr: &str, config: &StressConfig) -> Self {
        KadNode::new(addr, config.kad)
    }
}

/// Run a stress round with the routing named by `config`.
pub async fn run(config: StressConfig) -> Result<Report> {
    match config.routing {
        Routing::Chord => Stress::<ChordNode>::new(config).run().await,
        Routing::Kad => Stress::<KadNode>::new(config).run().await,
    }
}

/// Cluster under test with the ledger of acknowledged writes.
pub struct Stress<D> {
    config: StressConfig,
    nodes: Vec<Arc<D>>,
    ledger: Arc<DashMap<String, String>>,
    rng: StdRng,
    report: Report,
}

fn free_addr() -> Result<String> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")
        .map_err(|e| Error::InvalidAddress(e.to_string()))?;
    let addr = listener
        .local_addr()
        .map_err(|e| Error::InvalidAddress(e.to_string()))?;
    Ok(addr.to_string())
}

fn rand_str(rng: &mut impl Rng) -> String {
    (0..6).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

impl<D: Member> Stress<D> {
    pub fn new(config: StressConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        let report = Report {
            seed: config.seed,
            ..Default::default()
        };
        Self {
            config,
            nodes: vec![],
            ledger: Arc::new(DashMap::new()),
            rng,
            report,
        }
    }

    /// Run every phase and fail when the fail rate exceeds the configured bound.
    pub async fn run(mut self) -> Result<Report> {
        tracing::info!("stress {:?} seed {}", self.config.routing, self.config.seed);
        let ret = self.drive().await;
        for node in self.nodes.iter() {
            node.force_quit().await;
        }
        ret?;
        tracing::info!("{}", self.report);
        if self.report.fail_rate() > self.config.max_fail_rate {
            return Err(Error::StressFailed(self.report.to_string()));
        }
        Ok(self.report)
    }

    async fn drive(&mut self) -> Result<()> {
        self.boot().await?;
        self.insert().await?;
        self.depart().await;
        self.verify().await;
        self.erase().await;
        Ok(())
    }

    async fn boot(&mut self) -> Result<()> {
        for i in 0..self.config.nodes.max(1) {
            let node = Arc::new(D::spawn(&free_addr()?, &self.config));
            node.run().await.map_err(Error::StartNode)?;
            if i == 0 {
                node.create().await;
            } else {
                tracing::info!("joining node {}", i);
                let bootstrap = self.nodes[0].addr().to_string();
                if !node.join(&bootstrap).await {
                    return Err(Error::JoinFailed(bootstrap));
                }
            }
            self.nodes.push(node);
            tokio::time::sleep(self.config.settle).await;
        }
        tracing::info!("all {} nodes joined", self.nodes.len());
        Ok(())
    }

    fn live(&self) -> Vec<Arc<D>> {
        self.nodes
            .iter()
            .filter(|n| n.is_active())
            .cloned()
            .collect()
    }

    fn pick(&mut self) -> Option<Arc<D>> {
        self.live().choose(&mut self.rng).cloned()
    }

    /// Concurrent put-then-get traffic, every acknowledged put lands in the ledger.
    async fn insert(&mut self) -> Result<()> {
        let live = self.live();
        let mut handles = vec![];
        for w in 0..self.config.workers.max(1) {
            let live = live.clone();
            let ledger = self.ledger.clone();
            let inserts = self.config.inserts;
            let key_space = self.config.key_space.max(1);
            let mut rng = StdRng::seed_from_u64(self.rng.gen());
            handles.push(tokio::spawn(async move {
                let mut report = Report::default();
                for i in 0..inserts {
                    let key = format!("w{}-{}", w, rng.gen_range(0..key_space));
                    let value = rand_str(&mut rng);
                    let Some(node) = live.choose(&mut rng) else {
                        break;
                    };
                    report.puts += 1;
                    if !node.put(&key, &value).await {
                        report.put_failures += 1;
                        continue;
                    }
                    ledger.insert(key.clone(), value.clone());
                    let Some(node) = live.choose(&mut rng) else {
                        break;
                    };
                    report.gets += 1;
                    let ret = node.get(&key).await;
                    if ret.as_ref() != Some(&value) {
                        tracing::warn!("get {} after put: {:?}", key, ret);
                        report.get_failures += 1;
                    }
                    if (i + 1) % 100 == 0 {
                        tracing::info!("worker {} passed {} insertions", w, i + 1);
                    }
                }
                report
            }));
        }
        for handle in handles {
            let report = handle
                .await
                .map_err(|e| Error::StressFailed(e.to_string()))?;
            self.report.merge(&report);
        }
        Ok(())
    }

    /// Retire members one at a time, leaving at least one alive.
    async fn depart(&mut self) {
        for _ in 0..self.config.quits {
            if self.live().len() <= 1 {
                break;
            }
            let Some(node) = self.pick() else {
                break;
            };
            if self.rng.gen_bool(0.5) {
                tracing::info!("quitting node {}", node.addr());
                node.quit().await;
                self.report.quits += 1;
            } else {
                tracing::info!("force quitting node {}", node.addr());
                node.force_quit().await;
                self.report.force_quits += 1;
            }
            tokio::time::sleep(self.config.settle * 5).await;
        }
    }

    /// Every ledger entry must be readable from a random survivor.
    async fn verify(&mut self) {
        let entries: Vec<(String, String)> = self
            .ledger
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        for (key, value) in entries {
            let Some(node) = self.pick() else {
                return;
            };
            self.report.gets += 1;
            let ret = node.get(&key).await;
            if ret.as_ref() != Some(&value) {
                tracing::warn!("get {} expected {}: {:?}", key, value, ret);
                self.report.get_failures += 1;
            }
        }
    }

    /// Delete every ledger entry and check it is gone.
    async fn erase(&mut self) {
        let keys: Vec<String> = self.ledger.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            let Some(node) = self.pick() else {
                return;
            };
            self.report.deletes += 1;
            if !node.delete(&key).await {
                self.report.delete_failures += 1;
                continue;
            }
            self.ledger.remove(&key);
            let Some(node) = self.pick() else {
                return;
            };
            self.report.gets += 1;
            if let Some(v) = node.get(&key).await {
                tracing::warn!("deleted {} still readable as {}", key, v);
                self.report.get_failures += 1;
            }
        }
    }
}
