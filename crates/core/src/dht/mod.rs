#![warn(missing_docs)]
//! Implementation of chordring's DHT
//! which is based on CHORD, ref: <https://pdos.csail.mit.edu/papers/ton:chord/paper-ton.pdf>
//! With high probability, the number of nodes that must be contacted to find a successor in an N-node network is O(log N).
//!
//! A second routing, [KadNode], walks XOR distance buckets instead of a ring and
//! shares storage and transport with the chord node.

pub mod bucket;
mod chord;
pub mod did;
/// Finger table of a chord node
pub mod finger;
mod kad;
mod stabilization;
#[allow(missing_docs)]
pub mod successor;
pub mod types;

pub use bucket::KBucket;
pub use bucket::RoutingBuckets;
pub use chord::ChordNode;
pub use chord::RoutingTable;
pub use did::Did;
pub use finger::FingerTable;
pub use kad::KadNode;
pub use stabilization::Stabilizer;
pub use successor::SuccessorSeq;
pub use types::Dht;
pub use types::Edge;
