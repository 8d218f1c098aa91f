use std::sync::Arc;
use std::time::Duration;

use super::build_ring;
use super::gen_kv;
use super::wait_stable;
use crate::dht::ChordNode;
use crate::dht::Dht;
use crate::error::Result;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_quit_hands_data_off() -> Result<()> {
    let nodes = build_ring(5).await;
    let kv = gen_kv(50);
    for (k, v) in kv.iter() {
        ChordNode::put(&nodes[0], k, v).await?;
    }

    let mut survivors: Vec<Arc<ChordNode>> = nodes.clone();
    for _ in 0..2 {
        let leaving = survivors.pop().unwrap();
        let pred = leaving.predecessor()?.unwrap();
        let succ = leaving.successor()?;
        ChordNode::quit(&leaving).await?;
        assert!(!leaving.is_active());

        // the ring is patched around the leaving node right away
        let pred = survivors.iter().find(|n| n.addr() == pred.addr).unwrap();
        let succ = survivors.iter().find(|n| n.addr() == succ.addr).unwrap();
        assert_eq!(pred.successor()?, succ.edge());
        assert_eq!(succ.predecessor()?, Some(pred.edge()));

        assert!(wait_stable(&survivors, Duration::from_secs(20)).await);
    }

    for (k, v) in kv.iter() {
        for node in survivors.iter() {
            assert_eq!(&ChordNode::get(node, k).await?, v);
        }
    }
    let total: usize = survivors.iter().map(|n| n.primary.len().unwrap()).sum();
    assert_eq!(total, kv.len());
    for n in survivors {
        n.force_quit();
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_quit_down_to_one_node() -> Result<()> {
    let nodes = build_ring(3).await;
    for (k, v) in gen_kv(20).iter() {
        assert!(Dht::put(&*nodes[1], k, v).await);
    }
    Dht::quit(&*nodes[2]).await;
    assert!(wait_stable(&nodes, Duration::from_secs(20)).await);
    Dht::quit(&*nodes[1]).await;

    let last = &nodes[0];
    assert!(wait_stable(&nodes, Duration::from_secs(20)).await);
    assert_eq!(last.successor()?, last.edge());
    for (k, v) in gen_kv(20).iter() {
        assert_eq!(Dht::get(&**last, k).await, Some(v.clone()));
    }
    assert_eq!(last.primary.len()?, 20);

    // a ring of one quits without anybody to hand off to
    Dht::quit(&**last).await;
    assert!(!last.is_active());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!Dht::ping(&**last, last.addr()).await);
    Ok(())
}
