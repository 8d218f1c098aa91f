//! Typed client of a remote peer.
use std::collections::HashMap;

use crate::dht::Did;
use crate::dht::Edge;
use crate::error::Error;
use crate::error::Result;
use crate::inspect::NodeInspect;
use crate::rpc::types::Request;
use crate::rpc::types::Response;
use crate::transport::dial;
use crate::transport::TransportConfig;

/// Answer of a [Request::FindValue].
#[derive(Debug, Clone, PartialEq)]
pub enum FoundValue {
    /// The receiver holds the key.
    Value(String),
    /// The receiver lacks the key, these contacts are closer to it.
    Closer(Vec<Edge>),
}

/// Handle of a peer listening on `addr`.
/// Each call dials a new connection, sends one [Request] and closes it.
#[derive(Debug, Clone)]
pub struct RemoteNode {
    addr: String,
    config: TransportConfig,
}

fn unexpected(addr: &str, method: &str, resp: Response) -> Error {
    match resp {
        Response::Failure(reason) => Error::RpcFailure(format!("{addr} {method}: {reason}")),
        other => Error::UnexpectedResponse(format!("{addr} {method}: {other:?}")),
    }
}

impl RemoteNode {
    pub fn new(addr: impl Into<String>, config: TransportConfig) -> Self {
        Self {
            addr: addr.into(),
            config,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send a raw request.
    pub async fn call(&self, req: Request) -> Result<Response> {
        tracing::trace!("call {} on {}", req.method(), self.addr);
        let mut conn = dial(&self.addr, &self.config).await?;
        conn.call(&req).await
    }

    async fn ack(&self, req: Request) -> Result<()> {
        let method = req.method();
        match self.call(req).await? {
            Response::Ack => Ok(()),
            resp => Err(unexpected(&self.addr, method, resp)),
        }
    }

    async fn map(&self, req: Request) -> Result<HashMap<String, String>> {
        let method = req.method();
        match self.call(req).await? {
            Response::Map(m) => Ok(m),
            resp => Err(unexpected(&self.addr, method, resp)),
        }
    }

    async fn value(&self, key: &str, req: Request) -> Result<String> {
        let method = req.method();
        match self.call(req).await? {
            Response::Value(v) => Ok(v),
            Response::NotFound => Err(Error::KeyNotFound(key.to_string())),
            resp => Err(unexpected(&self.addr, method, resp)),
        }
    }

    pub async fn get_id(&self) -> Result<Did> {
        match self.call(Request::GetId).await? {
            Response::Id(did) => Ok(did),
            resp => Err(unexpected(&self.addr, "GetId", resp)),
        }
    }

    pub async fn find_successor(&self, did: Did) -> Result<Edge> {
        match self.call(Request::FindSuccessor(did)).await? {
            Response::Edge(e) => Ok(e),
            resp => Err(unexpected(&self.addr, "FindSuccessor", resp)),
        }
    }

    pub async fn get_predecessor(&self) -> Result<Option<Edge>> {
        match self.call(Request::GetPredecessor).await? {
            Response::OptionEdge(e) => Ok(e),
            resp => Err(unexpected(&self.addr, "GetPredecessor", resp)),
        }
    }

    pub async fn get_successor_list(&self) -> Result<Vec<Edge>> {
        match self.call(Request::GetSuccessorList).await? {
            Response::Edges(list) => Ok(list),
            resp => Err(unexpected(&self.addr, "GetSuccessorList", resp)),
        }
    }

    pub async fn notify(&self, candidate: Edge) -> Result<()> {
        self.ack(Request::Notify(candidate)).await
    }

    pub async fn query_inside(&self, key: &str) -> Result<String> {
        self.value(key, Request::QueryInside(key.to_string()))
            .await
    }

    pub async fn insert_inside(&self, key: &str, value: &str) -> Result<()> {
        self.ack(Request::InsertInside(key.to_string(), value.to_string()))
            .await
    }

    pub async fn erase_inside(&self, key: &str) -> Result<()> {
        match self.call(Request::EraseInside(key.to_string())).await? {
            Response::Ack => Ok(()),
            Response::NotFound => Err(Error::KeyNotFound(key.to_string())),
            resp => Err(unexpected(&self.addr, "EraseInside", resp)),
        }
    }

    pub async fn move_range_to_predecessor(&self, did: Did) -> Result<HashMap<String, String>> {
        self.map(Request::MoveRangeToPredecessor(did)).await
    }

    pub async fn move_range_from_predecessor(&self, entries: HashMap<String, String>) -> Result<()> {
        self.ack(Request::MoveRangeFromPredecessor(entries)).await
    }

    pub async fn insert_backup_entry(&self, key: &str, value: &str) -> Result<()> {
        self.ack(Request::InsertBackupEntry(
            key.to_string(),
            value.to_string(),
        ))
        .await
    }

    pub async fn remove_backup_entry(&self, key: &str) -> Result<()> {
        self.ack(Request::RemoveBackupEntry(key.to_string())).await
    }

    pub async fn fill_backup_store(&self, entries: HashMap<String, String>) -> Result<()> {
        self.ack(Request::FillBackupStore(entries)).await
    }

    pub async fn insert_successor(&self, edge: Edge) -> Result<()> {
        self.ack(Request::InsertSuccessor(edge)).await
    }

    pub async fn update_predecessor(&self, edge: Edge) -> Result<()> {
        self.ack(Request::UpdatePredecessor(edge)).await
    }

    pub async fn copy_successor_list(&self, from: Edge, list: Vec<Edge>) -> Result<()> {
        self.ack(Request::CopySuccessorList { from, list }).await
    }

    pub async fn get_primary_snapshot(&self) -> Result<HashMap<String, String>> {
        self.map(Request::GetPrimarySnapshot).await
    }

    /// Routed write, the receiver finds the owner.
    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.ack(Request::Put(key.to_string(), value.to_string()))
            .await
    }

    /// Routed read, the receiver finds the owner.
    pub async fn get(&self, key: &str) -> Result<String> {
        self.value(key, Request::Get(key.to_string())).await
    }

    /// Routed removal, the receiver finds the owner.
    pub async fn delete(&self, key: &str) -> Result<()> {
        match self.call(Request::Delete(key.to_string())).await? {
            Response::Ack => Ok(()),
            Response::NotFound => Err(Error::KeyNotFound(key.to_string())),
            resp => Err(unexpected(&self.addr, "Delete", resp)),
        }
    }

    pub async fn inspect(&self) -> Result<NodeInspect> {
        match self.call(Request::Inspect).await? {
            Response::Inspect(ins) => Ok(*ins),
            resp => Err(unexpected(&self.addr, "Inspect", resp)),
        }
    }

    pub async fn find_node(&self, target: Did, from: Edge) -> Result<Vec<Edge>> {
        match self.call(Request::FindNode { target, from }).await? {
            Response::Edges(list) => Ok(list),
            resp => Err(unexpected(&self.addr, "FindNode", resp)),
        }
    }

    pub async fn find_value(&self, key: &str, from: Edge) -> Result<FoundValue> {
        let req = Request::FindValue {
            key: key.to_string(),
            from,
        };
        match self.call(req).await? {
            Response::Value(v) => Ok(FoundValue::Value(v)),
            Response::Edges(list) => Ok(FoundValue::Closer(list)),
            resp => Err(unexpected(&self.addr, "FindValue", resp)),
        }
    }

    pub async fn store(&self, key: &str, value: &str, from: Edge) -> Result<()> {
        self.ack(Request::Store {
            key: key.to_string(),
            value: value.to_string(),
            from,
        })
        .await
    }

    /// Whether the receiver held a replica of `key`.
    pub async fn remove(&self, key: &str, from: Edge) -> Result<bool> {
        let req = Request::Remove {
            key: key.to_string(),
            from,
        };
        match self.call(req).await? {
            Response::Ack => Ok(true),
            Response::NotFound => Ok(false),
            resp => Err(unexpected(&self.addr, "Remove", resp)),
        }
    }
}
