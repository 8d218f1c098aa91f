//! Peer RPC of chordring.
//!
//! A [RemoteNode] sends one [Request] per connection, the [RpcServer] accepts
//! connections and hands every request to a [RequestHandler], which for a chord
//! node is the [NodeService] and for a bucket routing node the [KadService].

pub mod client;
pub mod server;
pub mod service;
pub mod types;

pub use client::FoundValue;
pub use client::RemoteNode;
pub use server::RequestHandler;
pub use server::RpcServer;
pub use service::KadService;
pub use service::NodeService;
pub use types::Request;
pub use types::Response;
