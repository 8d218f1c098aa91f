use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use crate::config::ChordConfig;
use crate::dht::ChordNode;
use crate::transport::TransportConfig;

mod test_kad;
mod test_quit;
mod test_replication;
mod test_ring;
mod test_storage;

/// A port nobody listens on right now.
pub fn free_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

pub fn test_config() -> ChordConfig {
    ChordConfig {
        successor_list_len: 5,
        stabilize_interval: Duration::from_millis(50),
        notify_grace: Duration::from_millis(100),
        transport: TransportConfig {
            dial_attempts: 3,
            dial_backoff: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(200),
            rpc_timeout: Duration::from_secs(3),
        },
    }
}

pub async fn spawn_node() -> Arc<ChordNode> {
    let node = Arc::new(ChordNode::new(&free_addr(), test_config()));
    node.run().await.unwrap();
    node
}

/// Create a ring with `n` nodes, all of them joining through the first one.
pub async fn build_ring(n: usize) -> Vec<Arc<ChordNode>> {
    let first = spawn_node().await;
    first.create_network().unwrap();
    let mut nodes = vec![first];
    for _ in 1..n {
        let node = spawn_node().await;
        node.join_network(nodes[0].addr()).await.unwrap();
        nodes.push(node);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(wait_stable(&nodes, Duration::from_secs(20)).await);
    nodes
}

/// Whether successor and predecessor pointers of the active nodes form a single ring
/// ordered by identifier.
pub fn is_stable(nodes: &[Arc<ChordNode>]) -> bool {
    let mut live: Vec<&Arc<ChordNode>> = nodes.iter().filter(|n| n.is_active()).collect();
    live.sort_by_key(|n| n.did);
    let n = live.len();
    if n == 0 {
        return true;
    }
    for (i, node) in live.iter().enumerate() {
        let next = live[(i + 1) % n];
        let prev = live[(i + n - 1) % n];
        let Ok(succ) = node.successor() else {
            return false;
        };
        let Ok(pred) = node.predecessor() else {
            return false;
        };
        if succ.addr != next.addr() {
            return false;
        }
        if pred.map(|p| p.addr) != Some(prev.addr().to_string()) {
            return false;
        }
    }
    true
}

pub async fn wait_stable(nodes: &[Arc<ChordNode>], timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if is_stable(nodes) {
            // let backups settle after the last notify
            tokio::time::sleep(Duration::from_millis(200)).await;
            return is_stable(nodes);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Walk successor pointers from `start`, returning the visited addresses.
pub fn walk(nodes: &[Arc<ChordNode>], start: &ChordNode) -> Vec<String> {
    let by_addr: HashMap<String, &Arc<ChordNode>> = nodes
        .iter()
        .map(|n| (n.addr().to_string(), n))
        .collect();
    let mut seen = HashSet::new();
    let mut ret = vec![];
    let mut cur = start.addr().to_string();
    while seen.insert(cur.clone()) {
        ret.push(cur.clone());
        let Some(node) = by_addr.get(&cur) else {
            break;
        };
        cur = node.successor().unwrap().addr;
    }
    ret
}

pub fn gen_kv(n: usize) -> Vec<(String, String)> {
    (0..n)
        .map(|i| (format!("key-{i}"), format!("value-{i}")))
        .collect()
}
