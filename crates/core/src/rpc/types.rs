//! Wire messages exchanged between peers.
#![warn(missing_docs)]
use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use crate::dht::Did;
use crate::dht::Edge;
use crate::inspect::NodeInspect;

/// Requests a peer can serve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Request {
    /// Ask for the identifier of the peer.
    GetId,
    /// Resolve the node responsible for an identifier.
    FindSuccessor(Did),
    /// Ask for the current predecessor, if any.
    GetPredecessor,
    /// Tell the peer that the sender may be its predecessor.
    Notify(Edge),
    /// Read a key from the primary store, without routing.
    QueryInside(String),
    /// Write a key to the primary store, without routing.
    InsertInside(String, String),
    /// Remove a key from the primary store, without routing.
    EraseInside(String),
    /// A node joining at the given identifier takes over its range.
    MoveRangeToPredecessor(Did),
    /// A leaving predecessor hands its primary store over.
    MoveRangeFromPredecessor(HashMap<String, String>),
    /// Mirror a write of the predecessor.
    InsertBackupEntry(String, String),
    /// Mirror a removal of the predecessor.
    RemoveBackupEntry(String),
    /// Replace the backup store with the primary store of the predecessor.
    FillBackupStore(HashMap<String, String>),
    /// Put an edge at the head of the successor list.
    InsertSuccessor(Edge),
    /// Replace the predecessor.
    UpdatePredecessor(Edge),
    /// The head of the receiver's successor list advertises its own list.
    CopySuccessorList {
        /// Sender, expected to be the receiver's successor.
        from: Edge,
        /// Successor list of the sender.
        list: Vec<Edge>,
    },
    /// Copy of the whole primary store.
    GetPrimarySnapshot,
    /// Current successor list.
    GetSuccessorList,
    /// Client write, routed by the receiver.
    Put(String, String),
    /// Client read, routed by the receiver.
    Get(String),
    /// Client removal, routed by the receiver.
    Delete(String),
    /// Routing state and store sizes.
    Inspect,
    /// Contacts of the receiver closest to `target` by XOR distance.
    FindNode {
        /// Identifier looked up.
        target: Did,
        /// Sender, recorded in the receiver's buckets.
        from: Edge,
    },
    /// The value of `key`, or the receiver's closest contacts when it lacks it.
    FindValue {
        /// Key looked up.
        key: String,
        /// Sender, recorded in the receiver's buckets.
        from: Edge,
    },
    /// Keep a replica, without routing.
    Store {
        /// Key of the replica.
        key: String,
        /// Value of the replica.
        value: String,
        /// Sender, recorded in the receiver's buckets.
        from: Edge,
    },
    /// Drop a replica, without routing.
    Remove {
        /// Key of the replica.
        key: String,
        /// Sender, recorded in the receiver's buckets.
        from: Edge,
    },
}

/// Responses of [Request].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Response {
    /// Done, nothing to return.
    Ack,
    /// An identifier.
    Id(Did),
    /// A node.
    Edge(Edge),
    /// A node, or none.
    OptionEdge(Option<Edge>),
    /// A stored value.
    Value(String),
    /// A set of entries.
    Map(HashMap<String, String>),
    /// A list of nodes.
    Edges(Vec<Edge>),
    /// The key is absent at the owner.
    NotFound,
    /// The request was understood but could not be served.
    Failure(String),
    /// Routing state of a node.
    Inspect(Box<NodeInspect>),
}

impl Request {
    /// Short name for logging.
    pub fn method(&self) -> &'static str {
        match self {
            Request::GetId => "GetId",
            Request::FindSuccessor(_) => "FindSuccessor",
            Request::GetPredecessor => "GetPredecessor",
            Request::Notify(_) => "Notify",
            Request::QueryInside(_) => "QueryInside",
            Request::InsertInside(..) => "InsertInside",
            Request::EraseInside(_) => "EraseInside",
            Request::MoveRangeToPredecessor(_) => "MoveRangeToPredecessor",
            Request::MoveRangeFromPredecessor(_) => "MoveRangeFromPredecessor",
            Request::InsertBackupEntry(..) => "InsertBackupEntry",
            Request::RemoveBackupEntry(_) => "RemoveBackupEntry",
            Request::FillBackupStore(_) => "FillBackupStore",
            Request::InsertSuccessor(_) => "InsertSuccessor",
            Request::UpdatePredecessor(_) => "UpdatePredecessor",
            Request::CopySuccessorList { .. } => "CopySuccessorList",
            Request::GetPrimarySnapshot => "GetPrimarySnapshot",
            Request::GetSuccessorList => "GetSuccessorList",
            Request::Put(..) => "Put",
            Request::Get(_) => "Get",
            Request::Delete(_) => "Delete",
            Request::Inspect => "Inspect",
            Request::FindNode { .. } => "FindNode",
            Request::FindValue { .. } => "FindValue",
            Request::Store { .. } => "Store",
            Request::Remove { .. } => "Remove",
        }
    }
}
