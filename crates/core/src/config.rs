//! Tunables of the chord and bucket routing nodes.
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::consts::DEFAULT_KAD_BUCKET_SIZE;
use crate::consts::DEFAULT_KAD_REPUBLISH_INTERVAL_MS;
use crate::consts::DEFAULT_NOTIFY_GRACE_MS;
use crate::consts::DEFAULT_STABILIZE_INTERVAL_MS;
use crate::consts::DEFAULT_SUCCESSOR_LIST_LEN;
use crate::transport::TransportConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordConfig {
    /// Length of the successor list, K.
    pub successor_list_len: usize,
    /// Period of the maintenance loop.
    pub stabilize_interval: Duration,
    /// Delay before a successor promoted by list repair is notified.
    pub notify_grace: Duration,
    pub transport: TransportConfig,
}

impl Default for ChordConfig {
    fn default() -> Self {
        Self {
            successor_list_len: DEFAULT_SUCCESSOR_LIST_LEN,
            stabilize_interval: Duration::from_millis(DEFAULT_STABILIZE_INTERVAL_MS),
            notify_grace: Duration::from_millis(DEFAULT_NOTIFY_GRACE_MS),
            transport: TransportConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KadConfig {
    /// Capacity of a bucket and number of replicas of a key.
    pub bucket_size: usize,
    /// Period of the republish loop.
    pub republish_interval: Duration,
    pub transport: TransportConfig,
}

impl Default for KadConfig {
    fn default() -> Self {
        Self {
            bucket_size: DEFAULT_KAD_BUCKET_SIZE,
            republish_interval: Duration::from_millis(DEFAULT_KAD_REPUBLISH_INTERVAL_MS),
            transport: TransportConfig::default(),
        }
    }
}
