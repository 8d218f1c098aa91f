//! A prelude is provided which imports all the important data types and traits of chordring.
/// Use this when you want to quickly bootstrap a new project.
pub use chordring_core;

pub use self::chordring_core::config::ChordConfig;
pub use self::chordring_core::config::KadConfig;
pub use self::chordring_core::dht::ChordNode;
pub use self::chordring_core::dht::Did;
pub use self::chordring_core::dht::Dht;
pub use self::chordring_core::dht::Edge;
pub use self::chordring_core::dht::KadNode;
pub use self::chordring_core::inspect::NodeInspect;
pub use self::chordring_core::rpc::RemoteNode;
pub use self::chordring_core::transport::TransportConfig;
