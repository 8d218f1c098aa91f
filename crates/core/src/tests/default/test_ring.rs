use std::sync::Arc;

use super::build_ring;
use super::spawn_node;
use super::walk;
use crate::dht::ChordNode;
use crate::dht::Did;
use crate::error::Result;
use crate::inspect::NodeInspect;
use crate::rpc::RemoteNode;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_node_ring() -> Result<()> {
    let node = spawn_node().await;
    node.create_network()?;

    assert_eq!(node.successor()?, node.edge());
    assert_eq!(node.predecessor()?, Some(node.edge()));
    // a ring of one owns every identifier
    for i in 0..16u32 {
        assert_eq!(node.find_successor(Did::from(i)).await?, node.edge());
    }
    assert_eq!(node.find_successor(node.did).await?, node.edge());

    let ins = NodeInspect::inspect(&node);
    assert!(ins.active && ins.initialized);
    assert_eq!(ins.dht.finger_table.len(), 1);
    assert_eq!(ins.dht.finger_table[0], (node.addr().to_string(), 0, 159));
    node.force_quit();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_nodes_close_the_ring() -> Result<()> {
    let nodes = build_ring(2).await;
    let (a, b) = (&nodes[0], &nodes[1]);
    assert_eq!(a.successor()?, b.edge());
    assert_eq!(b.successor()?, a.edge());
    assert_eq!(a.predecessor()?, Some(b.edge()));
    assert_eq!(b.predecessor()?, Some(a.edge()));
    for n in nodes {
        n.force_quit();
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ring_integrity_after_joins() -> Result<()> {
    let nodes = build_ring(5).await;

    for start in nodes.iter() {
        let visited = walk(&nodes, start);
        assert_eq!(visited.len(), 5);
        let next = nodes
            .iter()
            .find(|n| n.addr() == visited[4])
            .unwrap()
            .successor()?;
        assert_eq!(next.addr, start.addr());
    }

    let mut sorted: Vec<&Arc<ChordNode>> = nodes.iter().collect();
    sorted.sort_by_key(|n| n.did);
    for (i, node) in sorted.iter().enumerate() {
        let expect = sorted[(i + 1) % sorted.len()];
        assert_eq!(node.successor()?, expect.edge());
        // finger 0 always follows the successor
        assert_eq!(node.lock_routing()?.fingers[0], expect.edge());
    }
    for n in nodes {
        n.force_quit();
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lookup_from_every_node() -> Result<()> {
    let nodes = build_ring(5).await;
    let mut sorted: Vec<&Arc<ChordNode>> = nodes.iter().collect();
    sorted.sort_by_key(|n| n.did);

    for i in 0..20 {
        let target = Did::hash(&format!("lookup-{i}"));
        let owner = sorted
            .iter()
            .find(|n| n.did >= target)
            .unwrap_or(&sorted[0]);
        for node in nodes.iter() {
            assert_eq!(node.find_successor(target).await?, owner.edge());
        }
        // and over the wire
        let remote = RemoteNode::new(nodes[0].addr(), nodes[0].config().transport);
        assert_eq!(remote.find_successor(target).await?, owner.edge());
    }
    for n in nodes {
        n.force_quit();
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lookup_own_id() -> Result<()> {
    let nodes = build_ring(3).await;
    for node in nodes.iter() {
        assert_eq!(node.find_successor(node.did).await?, node.edge());
        for other in nodes.iter() {
            let remote = RemoteNode::new(other.addr(), other.config().transport);
            assert_eq!(remote.find_successor(node.did).await?, node.edge());
        }
    }
    for n in nodes {
        n.force_quit();
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_join_resolves_every_finger() -> Result<()> {
    let mut nodes = build_ring(4).await;
    let joiner = spawn_node().await;
    joiner.join_network(nodes[0].addr()).await?;
    nodes.push(joiner.clone());

    let mut sorted: Vec<&Arc<ChordNode>> = nodes.iter().collect();
    sorted.sort_by_key(|n| n.did);
    let table = joiner.lock_routing()?;
    for i in 1..crate::consts::RING_BITS {
        let start = table.fingers.start(i);
        let expect = sorted
            .iter()
            .find(|n| n.did >= start)
            .unwrap_or(&sorted[0]);
        // the ring only learns about the joiner after stabilization
        if expect.addr() == joiner.addr() {
            continue;
        }
        assert_eq!(table.fingers[i], expect.edge(), "finger {i} after join");
    }
    drop(table);
    for n in nodes {
        n.force_quit();
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fingers_are_repaired() -> Result<()> {
    let nodes = build_ring(4).await;
    // a full round of the cursor on every node, slot 0 excluded
    for node in nodes.iter() {
        for _ in 1..crate::consts::RING_BITS {
            node.fix_fingers().await?;
        }
    }

    let mut sorted: Vec<&Arc<ChordNode>> = nodes.iter().collect();
    sorted.sort_by_key(|n| n.did);
    for node in nodes.iter() {
        let table = node.lock_routing()?;
        for i in 1..crate::consts::RING_BITS {
            let start = table.fingers.start(i);
            let expect = sorted
                .iter()
                .find(|n| n.did >= start)
                .unwrap_or(&sorted[0]);
            assert_eq!(table.fingers[i], expect.edge(), "finger {i} of {}", node.addr());
        }
    }
    for n in nodes {
        n.force_quit();
    }
    Ok(())
}

#[tokio::test]
async fn test_join_unreachable_bootstrap() {
    let node = Arc::new(ChordNode::new(&super::free_addr(), super::test_config()));
    let ret = node.join_network(&super::free_addr()).await;
    assert!(matches!(ret, Err(crate::error::Error::DialFailure(_))));
    assert!(!node.is_initialized());
}
