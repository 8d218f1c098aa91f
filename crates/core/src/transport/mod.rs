//! Transport of chordring: dialing with retry, liveness check and a framed connection
//! carrying one request and one response.
//!
//! Every remote call opens a fresh connection. A frame is a length delimited bincode
//! payload, see [FRAME_MAX_SIZE].

use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::codec::LengthDelimitedCodec;

use crate::consts::DEFAULT_CONNECT_TIMEOUT_MS;
use crate::consts::DEFAULT_DIAL_ATTEMPTS;
use crate::consts::DEFAULT_DIAL_BACKOFF_MS;
use crate::consts::DEFAULT_RPC_TIMEOUT_MS;
use crate::consts::FRAME_MAX_SIZE;
use crate::error::Error;
use crate::error::Result;

/// Retry and timeout budget of outgoing connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    pub dial_attempts: u32,
    pub dial_backoff: Duration,
    pub connect_timeout: Duration,
    pub rpc_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            dial_attempts: DEFAULT_DIAL_ATTEMPTS,
            dial_backoff: Duration::from_millis(DEFAULT_DIAL_BACKOFF_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            rpc_timeout: Duration::from_millis(DEFAULT_RPC_TIMEOUT_MS),
        }
    }
}

/// Build the codec shared by both ends of a connection.
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(FRAME_MAX_SIZE)
        .new_codec()
}

/// Encode a message to a frame payload.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    bincode::serialize(msg).map_err(Error::BincodeSerialize)
}

/// Decode a frame payload.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    bincode::deserialize(data).map_err(Error::BincodeDeserialize)
}

/// A connection to a peer.
pub struct Connection {
    addr: String,
    framed: Framed<TcpStream, LengthDelimitedCodec>,
    rpc_timeout: Duration,
}

impl Connection {
    /// Remote address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one request and wait for its response.
    pub async fn call<Req, Resp>(&mut self, req: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = Bytes::from(encode(req)?);
        let addr = self.addr.as_str();
        let framed = &mut self.framed;
        let exchange = async move {
            framed
                .send(payload)
                .await
                .map_err(|e| Error::RpcFailure(format!("{}: {}", addr, e)))?;
            match framed.next().await {
                Some(Ok(frame)) => Ok(frame),
                Some(Err(e)) => Err(Error::RpcFailure(format!("{}: {}", addr, e))),
                None => Err(Error::RpcFailure(format!("{}: connection closed", addr))),
            }
        };
        let frame = tokio::time::timeout(self.rpc_timeout, exchange)
            .await
            .map_err(|_| Error::RpcFailure(format!("{}: timeout", addr)))??;
        decode(&frame).map_err(|e| Error::RpcFailure(format!("{}: {}", addr, e)))
    }
}

/// Connect to `addr`, retrying within the budget of `config`.
pub async fn dial(addr: &str, config: &TransportConfig) -> Result<Connection> {
    let attempts = config.dial_attempts.max(1);
    for attempt in 1..=attempts {
        match tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                return Ok(Connection {
                    addr: addr.to_string(),
                    framed: Framed::new(stream, codec()),
                    rpc_timeout: config.rpc_timeout,
                });
            }
            Ok(Err(e)) => {
                tracing::trace!("dial {} attempt {} failed: {}", addr, attempt, e);
            }
            Err(_) => {
                tracing::trace!("dial {} attempt {} timed out", addr, attempt);
            }
        }
        if attempt < attempts {
            tokio::time::sleep(config.dial_backoff).await;
        }
    }
    tracing::debug!("dial {} failed after {} attempts", addr, attempts);
    Err(Error::DialFailure(addr.to_string()))
}

/// A node is alive if it accepts a connection.
pub async fn ping(addr: &str, config: &TransportConfig) -> bool {
    dial(addr, config).await.is_ok()
}
