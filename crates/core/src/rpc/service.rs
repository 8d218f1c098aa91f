//! Adapts peer requests onto a [ChordNode] or a [KadNode].
use std::sync::Arc;

use async_trait::async_trait;

use crate::dht::ChordNode;
use crate::dht::KadNode;
use crate::error::Error;
use crate::error::Result;
use crate::inspect::NodeInspect;
use crate::rpc::client::FoundValue;
use crate::rpc::server::RequestHandler;
use crate::rpc::types::Request;
use crate::rpc::types::Response;

/// Request handler of a chord node.
#[derive(Clone, Debug)]
pub struct NodeService {
    node: Arc<ChordNode>,
}

impl NodeService {
    pub fn new(node: Arc<ChordNode>) -> Self {
        Self { node }
    }
}

fn respond<T>(ret: Result<T>, f: impl FnOnce(T) -> Response) -> Response {
    match ret {
        Ok(v) => f(v),
        Err(Error::KeyNotFound(_)) => Response::NotFound,
        Err(e) => Response::Failure(e.to_string()),
    }
}

fn ack(ret: Result<()>) -> Response {
    respond(ret, |_| Response::Ack)
}

fn not_served(req: &Request, by: &str) -> Response {
    Response::Failure(format!("{} is not served by a {} node", req.method(), by))
}

#[async_trait]
impl RequestHandler for NodeService {
    async fn handle(&self, req: Request) -> Response {
        let node = &self.node;
        match req {
            Request::GetId => Response::Id(node.did),
            Request::FindSuccessor(did) => respond(node.find_successor(did).await, Response::Edge),
            Request::GetPredecessor => respond(node.predecessor(), Response::OptionEdge),
            Request::Notify(candidate) => ack(node.notify(candidate).await),
            Request::QueryInside(key) => respond(node.query_inside(&key), Response::Value),
            Request::InsertInside(key, value) => ack(node.insert_inside(&key, &value).await),
            Request::EraseInside(key) => ack(node.erase_inside(&key).await),
            Request::MoveRangeToPredecessor(did) => {
                respond(node.move_range_to_predecessor(did).await, Response::Map)
            }
            Request::MoveRangeFromPredecessor(entries) => {
                ack(node.move_range_from_predecessor(entries).await)
            }
            Request::InsertBackupEntry(key, value) => ack(node.backup.put(&key, &value)),
            Request::RemoveBackupEntry(key) => ack(node.backup.remove(&key).map(|_| ())),
            Request::FillBackupStore(entries) => ack(node.fill_backup_store(entries)),
            Request::InsertSuccessor(edge) => ack(node.insert_successor(edge).await),
            Request::UpdatePredecessor(edge) => ack(node.update_predecessor(edge)),
            Request::CopySuccessorList { from, list } => {
                ack(node.copy_successor_list(from, list))
            }
            Request::GetPrimarySnapshot => respond(node.primary.snapshot(), Response::Map),
            Request::GetSuccessorList => respond(node.successor_list(), Response::Edges),
            Request::Put(key, value) => ack(node.put(&key, &value).await),
            Request::Get(key) => respond(node.get(&key).await, Response::Value),
            Request::Delete(key) => ack(node.delete(&key).await),
            Request::Inspect => Response::Inspect(Box::new(NodeInspect::inspect(node))),
            Request::FindNode { .. }
            | Request::FindValue { .. }
            | Request::Store { .. }
            | Request::Remove { .. } => not_served(&req, "chord"),
        }
    }
}

/// Request handler of a bucket routing node.
#[derive(Clone, Debug)]
pub struct KadService {
    node: Arc<KadNode>,
}

impl KadService {
    pub fn new(node: Arc<KadNode>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl RequestHandler for KadService {
    async fn handle(&self, req: Request) -> Response {
        let node = &self.node;
        match req {
            Request::GetId => Response::Id(node.did),
            Request::FindNode { target, from } => {
                respond(node.find_node(target, from).await, Response::Edges)
            }
            Request::FindValue { key, from } => {
                respond(node.find_value(&key, from).await, |found| match found {
                    FoundValue::Value(v) => Response::Value(v),
                    FoundValue::Closer(list) => Response::Edges(list),
                })
            }
            Request::Store { key, value, from } => ack(node.store(&key, &value, from).await),
            Request::Remove { key, from } => match node.remove(&key, from).await {
                Ok(true) => Response::Ack,
                Ok(false) => Response::NotFound,
                Err(e) => Response::Failure(e.to_string()),
            },
            Request::Put(key, value) => ack(node.put(&key, &value).await),
            Request::Get(key) => respond(node.get(&key).await, Response::Value),
            Request::Delete(key) => ack(node.delete(&key).await),
            Request::Inspect => Response::Inspect(Box::new(NodeInspect::inspect_kad(node))),
            other => not_served(&other, "bucket routing"),
        }
    }
}
