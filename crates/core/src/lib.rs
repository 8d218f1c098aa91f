//! chordring: a Chord ring over TCP with a replicated key/value store.
//! --------------
//! - [Did](crate::dht::Did) is a point of the 160 bit identifier ring, nodes and keys are
//!   placed on it with SHA-1.
//! - [ChordNode](crate::dht::ChordNode) routes lookups over its finger table, keeps a
//!   successor list for fault tolerance and mirrors its data to its successor.
//! - [Transport](crate::transport) dials peers with retry and exchanges one
//!   length delimited bincode frame per direction.
//! - [RPC](crate::rpc) exposes a node to its peers.
//!
//! # Ring maintenance
//!
//! Every node runs a [Stabilizer](crate::dht::Stabilizer) which periodically
//!
//! 1. checks its predecessor, adopting the predecessor's keys from the backup store when it
//!    is gone,
//! 2. asks its successor for the successor's predecessor and notifies the successor,
//! 3. advertises its successor list to its predecessor,
//! 4. refreshes one finger.
//!
//! # Replication
//!
//! The owner of a key stores it in its primary store. Every write and removal is mirrored
//! into the backup store of the owner's successor, and a node accepting a new predecessor
//! pulls the full primary store of that predecessor as its backup.
#![doc = include_str!("../README.md")]
pub mod config;
pub mod consts;
pub mod dht;
pub mod error;
pub mod inspect;
pub mod rpc;
pub mod storage;
pub mod transport;
