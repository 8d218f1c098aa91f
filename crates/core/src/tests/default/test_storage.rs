use std::sync::Arc;

use rand::seq::SliceRandom;

use super::build_ring;
use super::gen_kv;
use super::spawn_node;
use crate::dht::ChordNode;
use crate::dht::Did;
use crate::dht::Dht;
use crate::error::Error;
use crate::error::Result;
use crate::rpc::RemoteNode;

fn owner_of<'a>(nodes: &'a [Arc<ChordNode>], key: &str) -> &'a Arc<ChordNode> {
    let did = Did::hash(key);
    let mut sorted: Vec<&Arc<ChordNode>> = nodes.iter().collect();
    sorted.sort_by_key(|n| n.did);
    sorted
        .iter()
        .find(|n| n.did >= did)
        .copied()
        .unwrap_or(sorted[0])
}

fn successor_of<'a>(nodes: &'a [Arc<ChordNode>], node: &ChordNode) -> &'a Arc<ChordNode> {
    let succ = node.successor().unwrap();
    nodes.iter().find(|n| n.addr() == succ.addr).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_storage_on_single_node() -> Result<()> {
    let node = spawn_node().await;
    node.create_network()?;

    ChordNode::put(&node, "k", "v1").await?;
    assert_eq!(ChordNode::get(&node, "k").await?, "v1");
    ChordNode::put(&node, "k", "v2").await?;
    assert_eq!(ChordNode::get(&node, "k").await?, "v2");
    ChordNode::delete(&node, "k").await?;
    assert!(matches!(
        ChordNode::get(&node, "k").await,
        Err(Error::KeyNotFound(_))
    ));
    assert!(matches!(
        ChordNode::delete(&node, "k").await,
        Err(Error::KeyNotFound(_))
    ));
    // nothing to mirror in a ring of one
    assert!(node.backup.is_empty()?);
    node.force_quit();
    assert!(matches!(
        ChordNode::put(&node, "k", "v3").await,
        Err(Error::NodeInactive)
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_force_quit_through_dht_surface() -> Result<()> {
    let node = Arc::new(ChordNode::new(&super::free_addr(), super::test_config()));
    Dht::run(&node).await?;
    Dht::create(&*node).await;
    assert!(Dht::put(&*node, "k", "v").await);
    assert!(Dht::is_active(&*node));

    Dht::force_quit(&*node).await;
    assert!(!node.is_active());
    assert!(!node.is_initialized());
    assert!(!Dht::put(&*node, "k", "v2").await);
    assert_eq!(Dht::get(&*node, "k").await, None);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(!node.ping(node.addr()).await);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_put_get_from_every_node() -> Result<()> {
    let nodes = build_ring(5).await;
    let kv = gen_kv(40);
    let mut rng = rand::thread_rng();

    for (k, v) in kv.iter() {
        let node = nodes.choose(&mut rng).unwrap();
        ChordNode::put(node, k, v).await?;
    }

    for (k, v) in kv.iter() {
        for node in nodes.iter() {
            assert_eq!(&ChordNode::get(node, k).await?, v);
        }
        // stored at its owner and mirrored at the owner's successor
        let owner = owner_of(&nodes, k);
        assert_eq!(owner.primary.get(k)?.as_ref(), Some(v));
        assert_eq!(successor_of(&nodes, owner).backup.get(k)?.as_ref(), Some(v));
    }

    let total: usize = nodes.iter().map(|n| n.primary.len().unwrap()).sum();
    assert_eq!(total, kv.len());
    for n in nodes {
        n.force_quit();
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_delete_and_overwrite() -> Result<()> {
    let nodes = build_ring(5).await;

    // the five node scenario through the Dht surface
    let a = &nodes[0];
    let c = &nodes[2];
    let e = &nodes[4];
    assert!(Dht::put(&**a, "k", "v").await);
    assert_eq!(Dht::get(&**c, "k").await, Some("v".to_string()));
    assert!(Dht::delete(&**e, "k").await);
    assert_eq!(Dht::get(&**a, "k").await, None);
    assert!(!Dht::delete(&**c, "k").await);
    assert!(!Dht::delete(&**c, "never-stored").await);

    // repeated put keeps the last value
    assert!(Dht::put(&**c, "k", "v1").await);
    assert!(Dht::put(&**e, "k", "v2").await);
    assert_eq!(Dht::get(&**a, "k").await, Some("v2".to_string()));

    // removal reaches the mirror too
    let owner = owner_of(&nodes, "k");
    assert!(Dht::delete(&**a, "k").await);
    assert_eq!(successor_of(&nodes, owner).backup.get("k")?, None);
    assert_eq!(owner.primary.get("k")?, None);

    for n in nodes {
        n.force_quit();
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_client_requests_over_the_wire() -> Result<()> {
    let nodes = build_ring(3).await;
    let remote = RemoteNode::new(nodes[1].addr(), nodes[1].config().transport);

    remote.put("wire", "value").await?;
    assert_eq!(remote.get("wire").await?, "value");
    assert_eq!(ChordNode::get(&nodes[2], "wire").await?, "value");
    remote.delete("wire").await?;
    assert!(matches!(remote.get("wire").await, Err(Error::KeyNotFound(_))));
    assert!(matches!(
        remote.delete("wire").await,
        Err(Error::KeyNotFound(_))
    ));

    let ins = remote.inspect().await?;
    assert_eq!(ins.addr, nodes[1].addr());
    assert_eq!(ins.dht.did, nodes[1].did.to_string());
    assert_eq!(ins.dht.successors[0], nodes[1].successor()?.addr);
    assert_eq!(remote.get_id().await?, nodes[1].did);

    for n in nodes {
        n.force_quit();
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_join_takes_over_key_range() -> Result<()> {
    let mut nodes = build_ring(3).await;
    let kv = gen_kv(40);
    for (k, v) in kv.iter() {
        ChordNode::put(&nodes[0], k, v).await?;
    }

    let newcomer = spawn_node().await;
    newcomer.join_network(nodes[1].addr()).await?;
    nodes.push(newcomer.clone());
    assert!(super::wait_stable(&nodes, std::time::Duration::from_secs(20)).await);

    for (k, v) in kv.iter() {
        let owner = owner_of(&nodes, k);
        assert_eq!(owner.primary.get(k)?.as_ref(), Some(v), "{k} not at owner");
        for node in nodes.iter().filter(|n| n.addr() != owner.addr()) {
            assert_eq!(node.primary.get(k)?, None, "{k} duplicated");
        }
        assert_eq!(&ChordNode::get(&newcomer, k).await?, v);
    }
    for n in nodes {
        n.force_quit();
    }
    Ok(())
}
