//! Serializable view of a node, for the `inspect` command, tests and logs.
use serde::Deserialize;
use serde::Serialize;

use crate::dht::ChordNode;
use crate::dht::KadNode;
use crate::storage::MemStorage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInspect {
    pub addr: String,
    pub active: bool,
    pub initialized: bool,
    pub dht: DHTInspect,
    pub primary: StorageInspect,
    pub backup: StorageInspect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DHTInspect {
    pub did: String,
    pub successors: Vec<String>,
    #[serde(default)]
    pub predecessor: Option<String>,
    /// Runs of identical fingers as `(addr, first index, last index)`.
    pub finger_table: Vec<(String, u64, u64)>,
    /// Non empty routing buckets as `(index, contacts)`, bucket routing only.
    #[serde(default)]
    pub buckets: Vec<(u64, Vec<String>)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInspect {
    pub len: usize,
    pub keys: Vec<String>,
}

impl NodeInspect {
    pub fn inspect(node: &ChordNode) -> Self {
        Self {
            addr: node.addr().to_string(),
            active: node.is_active(),
            initialized: node.is_initialized(),
            dht: DHTInspect::inspect(node),
            primary: StorageInspect::inspect(&node.primary),
            backup: StorageInspect::inspect(&node.backup),
        }
    }

    /// A bucket routing node keeps one store, reported as primary.
    pub fn inspect_kad(node: &KadNode) -> Self {
        Self {
            addr: node.addr().to_string(),
            active: node.is_active(),
            initialized: node.is_active(),
            dht: DHTInspect::inspect_kad(node),
            primary: StorageInspect::inspect(&node.storage),
            backup: StorageInspect::default(),
        }
    }
}

impl DHTInspect {
    pub fn inspect(node: &ChordNode) -> Self {
        let did = node.did.to_string();
        let Ok(table) = node.lock_routing() else {
            return Self {
                did,
                successors: vec![],
                predecessor: None,
                finger_table: vec![],
                buckets: vec![],
            };
        };
        let successors = table
            .successors
            .list()
            .into_iter()
            .map(|s| s.addr)
            .collect();
        let predecessor = table.predecessor.as_ref().map(|p| p.addr.clone());
        let finger_table = compress_iter(table.fingers.list().iter().map(|f| f.addr.clone()));

        Self {
            did,
            successors,
            predecessor,
            finger_table,
            buckets: vec![],
        }
    }

    pub fn inspect_kad(node: &KadNode) -> Self {
        let buckets = node
            .lock_buckets()
            .map(|table| {
                let ret: Vec<(u64, Vec<String>)> = table
                    .occupied()
                    .into_iter()
                    .map(|(i, b)| (i as u64, b.list().iter().map(|e| e.addr.clone()).collect()))
                    .collect();
                ret
            })
            .unwrap_or_default();
        Self {
            did: node.did.to_string(),
            successors: vec![],
            predecessor: None,
            finger_table: vec![],
            buckets,
        }
    }
}

impl StorageInspect {
    pub fn inspect(storage: &MemStorage) -> Self {
        let mut keys: Vec<String> = storage
            .snapshot()
            .unwrap_or_default()
            .into_keys()
            .collect();
        keys.sort();
        Self {
            len: keys.len(),
            keys,
        }
    }
}

pub fn compress_iter<T>(iter: impl Iterator<Item = T>) -> Vec<(T, u64, u64)>
where T: PartialEq {
    let mut result = vec![];
    let mut start = 0u64;
    let mut count = 0u64;
    let mut prev: Option<T> = None;

    for (i, x) in iter.enumerate() {
        match prev {
            Some(p) if p == x => {
                count += 1;
                prev = Some(p);
                continue;
            }
            Some(p) => {
                result.push((p, start, start + count - 1));
            }
            None => {}
        }
        start = i as u64;
        count = 1;
        prev = Some(x);
    }

    if let Some(p) = prev {
        result.push((p, start, start + count - 1));
    }

    result
}
