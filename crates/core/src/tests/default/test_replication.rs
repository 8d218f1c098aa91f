use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::build_ring;
use super::gen_kv;
use super::spawn_node;
use super::wait_stable;
use crate::dht::ChordNode;
use crate::dht::Did;
use crate::error::Result;
use crate::rpc::RemoteNode;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_force_quit_recovery() -> Result<()> {
    let nodes = build_ring(5).await;
    let kv = gen_kv(50);
    for (i, (k, v)) in kv.iter().enumerate() {
        ChordNode::put(&nodes[i % nodes.len()], k, v).await?;
    }

    // kill the node holding most keys, it must not be the entry point
    let victim = nodes[1..]
        .iter()
        .max_by_key(|n| n.primary.len().unwrap())
        .unwrap()
        .clone();
    let owned: Vec<String> = victim.primary.snapshot()?.into_keys().collect();
    assert!(!owned.is_empty());
    victim.force_quit();

    let survivors: Vec<Arc<ChordNode>> = nodes
        .iter()
        .filter(|n| n.addr() != victim.addr())
        .cloned()
        .collect();
    assert!(wait_stable(&survivors, Duration::from_secs(20)).await);

    for (k, v) in kv.iter() {
        for node in survivors.iter() {
            assert_eq!(&ChordNode::get(node, k).await?, v, "{k} lost");
        }
    }
    // the range of the victim now lives at its former successor
    let mut sorted = survivors.clone();
    sorted.sort_by_key(|n| n.did);
    let heir = sorted
        .iter()
        .find(|n| n.did > victim.did)
        .unwrap_or(&sorted[0]);
    for k in owned.iter() {
        assert!(heir.primary.get(k)?.is_some());
        assert_eq!(
            ChordNode::find_successor(&survivors[0], Did::hash(k)).await?,
            heir.edge()
        );
    }
    for n in survivors {
        n.force_quit();
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_backup_follows_new_predecessor() -> Result<()> {
    let nodes = build_ring(3).await;
    for (k, v) in gen_kv(30).iter() {
        ChordNode::put(&nodes[0], k, v).await?;
    }
    for node in nodes.iter() {
        let pred = node.predecessor()?.unwrap();
        let pred = nodes.iter().find(|n| n.addr() == pred.addr).unwrap();
        assert_eq!(node.backup.snapshot()?, pred.primary.snapshot()?);
    }
    for n in nodes {
        n.force_quit();
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fill_backup_store_replaces() -> Result<()> {
    // not part of a ring, nothing but the requests below touches the backup
    let node = spawn_node().await;
    node.fill_backup_store(HashMap::from([
        ("stale".to_string(), "old".to_string()),
        ("kept".to_string(), "old".to_string()),
    ]))?;

    let remote = RemoteNode::new(node.addr(), node.config().transport);
    let incoming = HashMap::from([
        ("kept".to_string(), "new".to_string()),
        ("fresh".to_string(), "v".to_string()),
    ]);
    remote.fill_backup_store(incoming.clone()).await?;
    assert_eq!(node.backup.snapshot()?, incoming);

    remote.fill_backup_store(HashMap::new()).await?;
    assert!(node.backup.snapshot()?.is_empty());
    node.force_quit();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_successive_failures() -> Result<()> {
    let nodes = build_ring(6).await;
    let kv = gen_kv(30);
    for (k, v) in kv.iter() {
        ChordNode::put(&nodes[0], k, v).await?;
    }

    let mut survivors = nodes.clone();
    for _ in 0..2 {
        let victim = survivors.pop().unwrap();
        victim.force_quit();
        assert!(wait_stable(&survivors, Duration::from_secs(20)).await);
    }

    for (k, v) in kv.iter() {
        assert_eq!(&ChordNode::get(&survivors[0], k).await?, v);
    }
    for n in survivors {
        n.force_quit();
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_adjacent_simultaneous_failures() -> Result<()> {
    let nodes = build_ring(7).await;
    let k = nodes[0].config().successor_list_len;
    let kv = gen_kv(40);
    for (key, v) in kv.iter() {
        ChordNode::put(&nodes[0], key, v).await?;
    }

    // K - 1 neighbours on the ring crash at once
    let mut sorted = nodes.clone();
    sorted.sort_by_key(|n| n.did);
    let victims: Vec<Arc<ChordNode>> = sorted.drain(1..k).collect();
    let kept: Vec<(String, String)> = kv
        .iter()
        .filter(|(key, _)| {
            sorted
                .iter()
                .any(|n| n.primary.get(key).ok().flatten().is_some())
        })
        .cloned()
        .collect();
    for v in victims.iter() {
        v.force_quit();
    }

    let survivors = sorted;
    assert_eq!(survivors.len(), nodes.len() + 1 - k);
    assert!(wait_stable(&survivors, Duration::from_secs(30)).await);
    for start in survivors.iter() {
        assert_eq!(super::walk(&survivors, start).len(), survivors.len());
    }

    for (i, node) in survivors.iter().enumerate() {
        let key = format!("after-crash-{i}");
        ChordNode::put(node, &key, "v").await?;
        for other in survivors.iter() {
            assert_eq!(ChordNode::get(other, &key).await?, "v");
        }
    }
    // keys owned by a survivor before the crash are untouched
    for (key, v) in kept.iter() {
        for node in survivors.iter() {
            assert_eq!(&ChordNode::get(node, key).await?, v, "{key} lost");
        }
    }
    for n in survivors {
        n.force_quit();
    }
    Ok(())
}
