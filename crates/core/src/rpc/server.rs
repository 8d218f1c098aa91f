//! Accept loop of the peer RPC.
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::rpc::types::Request;
use crate::rpc::types::Response;
use crate::transport::codec;
use crate::transport::decode;
use crate::transport::encode;

/// Serve a decoded request.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Build the response of `req`. Failures are carried as [Response::Failure].
    async fn handle(&self, req: Request) -> Response;
}

/// Accepts connections until the shutdown token is cancelled.
pub struct RpcServer<H> {
    listener: TcpListener,
    handler: Arc<H>,
    shutdown: CancellationToken,
}

impl<H> RpcServer<H>
where H: RequestHandler + 'static
{
    pub fn new(listener: TcpListener, handler: H, shutdown: CancellationToken) -> Self {
        Self {
            listener,
            handler: Arc::new(handler),
            shutdown,
        }
    }

    /// Accept loop, one task per connection. The listener is closed on return.
    pub async fn serve(self) {
        let local = self
            .listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handler = self.handler.clone();
                        let shutdown = self.shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, handler, shutdown).await {
                                tracing::debug!("connection from {} closed: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!("{}: failed to accept connection: {}", local, e);
                    }
                },
                _ = self.shutdown.cancelled() => {
                    tracing::info!("{}: stopped accepting new peer connections", local);
                    break;
                }
            }
        }
    }
}

async fn serve_connection<H>(
    stream: TcpStream,
    handler: Arc<H>,
    shutdown: CancellationToken,
) -> Result<()>
where
    H: RequestHandler,
{
    let mut framed = Framed::new(stream, codec());
    loop {
        let frame = tokio::select! {
            frame = framed.next() => frame,
            _ = shutdown.cancelled() => return Ok(()),
        };
        let Some(frame) = frame else {
            return Ok(());
        };
        let resp = match decode::<Request>(&frame?) {
            Ok(req) => {
                tracing::trace!("handle {}", req.method());
                handler.handle(req).await
            }
            Err(e) => Response::Failure(e.to_string()),
        };
        framed.send(Bytes::from(encode(&resp)?)).await?;
    }
}
