//! Module of MemStorage, the in-memory key/value maps of a node.
//!
//! Every node holds two of them: the primary store with the keys it owns, and the
//! backup store mirroring the primary store of its predecessor.

pub mod memory;

pub use crate::storage::memory::MemStorage;
