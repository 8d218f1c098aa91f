//! Error of chordring_core

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors collections in chordring-core.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Failed to dial {0} after exhausting retries")]
    DialFailure(String),

    #[error("Remote call failed: {0}")]
    RpcFailure(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Unable to find successor of {0}")]
    UnableToFindSuccessor(crate::dht::Did),

    #[error("Every entry of successor list failed liveness check")]
    SuccessorListExhausted,

    #[error("Invalid hexadecimal identifier")]
    BadCHexInCache,

    #[error("Bincode serialization error")]
    BincodeSerialize(#[source] bincode::Error),

    #[error("Bincode deserialization error")]
    BincodeDeserialize(#[source] bincode::Error),

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Unexpected response from {0}")]
    UnexpectedResponse(String),

    #[error("Failed to get dht from a sync lock")]
    DHTSyncLockError,

    #[error("Failed to lock storage table")]
    StorageLockError,

    #[error("Node is not active")]
    NodeInactive,

    #[error("No node accepted a replica of {0}")]
    NoReplicaAccepted(String),
}

impl Error {
    /// Transport level failures are retried by the next maintenance tick.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::DialFailure(_) | Error::RpcFailure(_))
    }
}
