//! YAML configuration of a chordring node.
use std::fs;
use std::io;
use std::time::Duration;

use chordring_core::config::ChordConfig;
use chordring_core::config::KadConfig;
use chordring_core::consts::DEFAULT_CONNECT_TIMEOUT_MS;
use chordring_core::consts::DEFAULT_DIAL_ATTEMPTS;
use chordring_core::consts::DEFAULT_DIAL_BACKOFF_MS;
use chordring_core::consts::DEFAULT_KAD_BUCKET_SIZE;
use chordring_core::consts::DEFAULT_KAD_REPUBLISH_INTERVAL_MS;
use chordring_core::consts::DEFAULT_NOTIFY_GRACE_MS;
use chordring_core::consts::DEFAULT_RPC_TIMEOUT_MS;
use chordring_core::consts::DEFAULT_STABILIZE_INTERVAL_MS;
use chordring_core::consts::DEFAULT_SUCCESSOR_LIST_LEN;
use chordring_core::transport::TransportConfig;
use clap::ValueEnum;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::util::ensure_parent_dir;
use crate::util::expand_home;

pub const DEFAULT_CONFIG_PATH: &str = "~/.chordring/config.yaml";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:50000";

/// How a node maps keys to their holders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Routing {
    /// Successor of the key on the identifier ring.
    #[default]
    Chord,
    /// Closest nodes by XOR distance.
    Kad,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Address the node listens on, it also names the node on the ring.
    pub listen_addr: String,
    /// Existing member to join through. A new ring is created when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<String>,
    pub routing: Routing,
    pub successor_list_len: usize,
    pub stabilize_interval: u64,
    pub notify_grace: u64,
    pub dial_attempts: u32,
    pub dial_backoff: u64,
    pub connect_timeout: u64,
    pub rpc_timeout: u64,
    pub bucket_size: usize,
    pub republish_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            bootstrap: None,
            routing: Routing::default(),
            successor_list_len: DEFAULT_SUCCESSOR_LIST_LEN,
            stabilize_interval: DEFAULT_STABILIZE_INTERVAL_MS,
            notify_grace: DEFAULT_NOTIFY_GRACE_MS,
            dial_attempts: DEFAULT_DIAL_ATTEMPTS,
            dial_backoff: DEFAULT_DIAL_BACKOFF_MS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_MS,
            rpc_timeout: DEFAULT_RPC_TIMEOUT_MS,
            bucket_size: DEFAULT_KAD_BUCKET_SIZE,
            republish_interval: DEFAULT_KAD_REPUBLISH_INTERVAL_MS,
        }
    }
}

impl From<&Config> for TransportConfig {
    fn from(config: &Config) -> Self {
        Self {
            dial_attempts: config.dial_attempts,
            dial_backoff: Duration::from_millis(config.dial_backoff),
            connect_timeout: Duration::from_millis(config.connect_timeout),
            rpc_timeout: Duration::from_millis(config.rpc_timeout),
        }
    }
}

impl From<&Config> for ChordConfig {
    fn from(config: &Config) -> Self {
        Self {
            successor_list_len: config.successor_list_len,
            stabilize_interval: Duration::from_millis(config.stabilize_interval),
            notify_grace: Duration::from_millis(config.notify_grace),
            transport: config.into(),
        }
    }
}

impl From<&Config> for KadConfig {
    fn from(config: &Config) -> Self {
        Self {
            bucket_size: config.bucket_size,
            republish_interval: Duration::from_millis(config.republish_interval),
            transport: config.into(),
        }
    }
}

impl Config {
    pub fn new(listen_addr: &str) -> Self {
        Self {
            listen_addr: listen_addr.to_string(),
            ..Default::default()
        }
    }

    pub fn write_fs<P>(&self, path: P) -> Result<String>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path)?;
        ensure_parent_dir(&path)?;
        let f =
            fs::File::create(path.as_path()).map_err(|e| Error::CreateFileError(e.to_string()))?;
        let f_writer = io::BufWriter::new(f);
        serde_yaml::to_writer(f_writer, self)?;
        Ok(path.to_string_lossy().to_string())
    }

    pub fn read_fs<P>(path: P) -> Result<Config>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path)?;
        tracing::debug!("Read config from: {:?}", path);
        let f = fs::File::open(path).map_err(|e| Error::OpenFileError(e.to_string()))?;
        let f_rdr = io::BufReader::new(f);
        Ok(serde_yaml::from_reader(f_rdr)?)
    }
}
