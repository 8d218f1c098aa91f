use std::sync::Arc;
use std::time::Duration;

use super::build_ring;
use super::free_addr;
use super::gen_kv;
use super::test_config;
use crate::config::KadConfig;
use crate::dht::Dht;
use crate::dht::KadNode;
use crate::error::Error;
use crate::error::Result;
use crate::rpc::FoundValue;
use crate::rpc::RemoteNode;

fn kad_config(bucket_size: usize, republish_interval: Duration) -> KadConfig {
    KadConfig {
        bucket_size,
        republish_interval,
        transport: test_config().transport,
    }
}

async fn build_kad(n: usize, config: KadConfig) -> Vec<Arc<KadNode>> {
    let mut nodes: Vec<Arc<KadNode>> = vec![];
    for _ in 0..n {
        let node = Arc::new(KadNode::new(&free_addr(), config));
        node.run().await.unwrap();
        match nodes.first() {
            None => node.create_network().unwrap(),
            Some(first) => node.join_network(first.addr()).await.unwrap(),
        }
        nodes.push(node);
    }
    nodes
}

/// Writes, overwrites and removals issued from every node through the [Dht] surface.
async fn exercise_dht<D: Dht>(nodes: &[Arc<D>]) {
    let kv = gen_kv(20);
    for (i, (k, v)) in kv.iter().enumerate() {
        assert!(nodes[i % nodes.len()].put(k, v).await, "put {k}");
    }
    for (k, v) in kv.iter() {
        for node in nodes.iter() {
            assert_eq!(node.get(k).await.as_ref(), Some(v), "get {k} at {}", node.addr());
        }
    }

    let last = &nodes[nodes.len() - 1];
    assert!(nodes[0].put("k", "v1").await);
    assert!(last.put("k", "v2").await);
    for node in nodes.iter() {
        assert_eq!(node.get("k").await, Some("v2".to_string()));
    }
    assert!(last.delete("k").await);
    for node in nodes.iter() {
        assert_eq!(node.get("k").await, None);
    }
    assert!(!nodes[0].delete("k").await);
    assert!(!nodes[0].delete("never-stored").await);

    for node in nodes.iter() {
        node.force_quit().await;
        assert!(!node.is_active());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_both_routings_share_the_dht_surface() {
    // republish is kept out of the way of removals
    let kad = build_kad(5, kad_config(20, Duration::from_secs(600))).await;
    exercise_dht(&kad).await;
    let chord = build_ring(5).await;
    exercise_dht(&chord).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_kad_single_node() -> Result<()> {
    let node = Arc::new(KadNode::new(&free_addr(), KadConfig::default()));
    Dht::run(&node).await?;
    node.create_network()?;
    node.put("k", "v").await?;
    assert_eq!(node.get("k").await?, "v");
    assert_eq!(node.lookup(crate::dht::Did::hash("k")).await?, vec![node.edge()]);
    node.delete("k").await?;
    assert!(matches!(node.get("k").await, Err(Error::KeyNotFound(_))));

    node.force_quit();
    assert!(matches!(node.put("k", "v").await, Err(Error::NodeInactive)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_kad_contacts_and_wire_requests() -> Result<()> {
    let nodes = build_kad(4, kad_config(20, Duration::from_secs(600))).await;
    // every lookup walks to the others, so everybody ends up known
    for node in nodes.iter() {
        node.lookup(node.did).await?;
    }
    for node in nodes.iter() {
        assert_eq!(node.contacts()?.len(), nodes.len() - 1, "{}", node.addr());
    }

    let remote = RemoteNode::new(nodes[1].addr(), nodes[1].config().transport);
    remote.put("wire", "value").await?;
    assert_eq!(remote.get("wire").await?, "value");
    assert_eq!(nodes[3].get("wire").await?, "value");
    assert_eq!(
        remote.find_value("wire", nodes[0].edge()).await?,
        FoundValue::Value("value".to_string())
    );
    match remote.find_value("absent", nodes[0].edge()).await? {
        FoundValue::Closer(list) => assert!(!list.is_empty()),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(remote.get_id().await?, nodes[1].did);

    // ring requests are refused
    assert!(matches!(
        remote.get_predecessor().await,
        Err(Error::RpcFailure(_))
    ));
    let ins = remote.inspect().await?;
    assert_eq!(ins.addr, nodes[1].addr());
    assert_eq!(ins.primary.keys, vec!["wire".to_string()]);
    assert!(!ins.dht.buckets.is_empty());

    remote.delete("wire").await?;
    assert!(matches!(remote.get("wire").await, Err(Error::KeyNotFound(_))));
    for n in nodes {
        n.force_quit();
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_kad_survives_force_quit() -> Result<()> {
    let nodes = build_kad(5, kad_config(20, Duration::from_secs(600))).await;
    let kv = gen_kv(30);
    for (i, (k, v)) in kv.iter().enumerate() {
        nodes[i % nodes.len()].put(k, v).await?;
    }

    nodes[1].force_quit();
    nodes[3].force_quit();
    let survivors: Vec<Arc<KadNode>> = [0, 2, 4].iter().map(|i| nodes[*i].clone()).collect();
    for (k, v) in kv.iter() {
        for node in survivors.iter() {
            assert_eq!(&node.get(k).await?, v);
        }
    }
    // dead contacts are forgotten by the next writes
    for (i, node) in survivors.iter().enumerate() {
        node.put(&format!("after-crash-{i}"), "v").await?;
    }
    for node in survivors.iter() {
        for dead in [&nodes[1], &nodes[3]] {
            assert!(!node.contacts()?.contains(&dead.edge()));
        }
        assert_eq!(node.get("after-crash-0").await?, "v");
    }
    for n in survivors {
        n.force_quit();
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_kad_quit_keeps_replication_factor() -> Result<()> {
    let k = 2;
    let nodes = build_kad(4, kad_config(k, Duration::from_secs(600))).await;
    let kv = gen_kv(20);
    for (key, v) in kv.iter() {
        nodes[0].put(key, v).await?;
    }

    let leaving = nodes[2].clone();
    let held = leaving.storage.len()?;
    leaving.quit().await?;
    assert!(!leaving.is_active());
    assert!(matches!(leaving.get("key-0").await, Err(Error::NodeInactive)));

    let survivors: Vec<Arc<KadNode>> = nodes
        .iter()
        .filter(|n| n.addr() != leaving.addr())
        .cloned()
        .collect();
    for (key, v) in kv.iter() {
        let replicas = survivors
            .iter()
            .filter(|n| n.storage.get(key).unwrap().as_ref() == Some(v))
            .count();
        assert!(replicas >= k, "{key} has {replicas} replicas, {held} were handed off");
        assert_eq!(&survivors[0].get(key).await?, v);
    }
    for n in survivors {
        n.force_quit();
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_kad_republish_reaches_newcomer() -> Result<()> {
    let config = kad_config(20, Duration::from_millis(200));
    let mut nodes = build_kad(3, config).await;
    let kv = gen_kv(20);
    for (k, v) in kv.iter() {
        nodes[1].put(k, v).await?;
    }

    let newcomer = Arc::new(KadNode::new(&free_addr(), config));
    newcomer.run().await?;
    newcomer.join_network(nodes[2].addr()).await?;
    nodes.push(newcomer.clone());

    // every node is among the closest of every key
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(newcomer.storage.len()?, kv.len());
    for (k, v) in kv.iter() {
        assert_eq!(newcomer.storage.get(k)?.as_ref(), Some(v));
    }
    for n in nodes {
        n.force_quit();
    }
    Ok(())
}

#[tokio::test]
async fn test_kad_join_unreachable_bootstrap() {
    let node = KadNode::new(&free_addr(), KadConfig::default());
    let ret = node.join_network(&free_addr()).await;
    assert!(matches!(ret, Err(Error::DialFailure(_))));
    assert!(node.contacts().unwrap().is_empty());
}
