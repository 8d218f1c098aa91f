//! Stabilization run daemons to maintain dht.

use std::sync::Arc;
use std::time::Duration;

use futures::future::FutureExt;
use futures::pin_mut;
use futures::select;
use futures_timer::Delay;

use crate::dht::ChordNode;
use crate::error::Error;
use crate::error::Result;

fn report(step: &str, e: Error) {
    if e.is_transport() {
        tracing::warn!("[stabilize] Failed on {} {:?}", step, e);
    } else {
        tracing::error!("[stabilize] Failed on {} {:?}", step, e);
    }
}

/// The stabilization runner.
#[derive(Clone, Debug)]
pub struct Stabilizer {
    node: Arc<ChordNode>,
}

impl Stabilizer {
    /// Create a new stabilization runner.
    pub fn new(node: Arc<ChordNode>) -> Self {
        Self { node }
    }

    /// Run stabilization once.
    /// Every step is attempted, failures are logged and left to the next round.
    pub async fn stabilize(&self) -> Result<()> {
        if !self.node.is_initialized() {
            return Ok(());
        }
        tracing::trace!("STABILIZATION check_predecessor start");
        if let Err(e) = self.node.check_predecessor().await {
            report("check predecessor", e);
        }
        tracing::trace!("STABILIZATION stabilize start");
        if let Err(e) = self.node.stabilize().await {
            report("stabilize", e);
        }
        tracing::trace!("STABILIZATION maintain_successor_list start");
        if let Err(e) = self.node.maintain_successor_list().await {
            report("maintain successor list", e);
        }
        tracing::trace!("STABILIZATION fix_fingers start");
        if let Err(e) = self.node.fix_fingers().await {
            report("fix_finger", e);
        }
        tracing::trace!("STABILIZATION end");
        Ok(())
    }

    /// Run stabilization in a loop until the node stops.
    pub async fn wait(self: Arc<Self>, interval: Duration) {
        while self.node.is_active() {
            let timeout = Delay::new(interval).fuse();
            pin_mut!(timeout);
            select! {
                _ = timeout => self
                    .stabilize()
                    .await
                    .unwrap_or_else(|e| tracing::error!("failed to stabilize {:?}", e)),
            }
        }
        tracing::debug!("STABILIZATION stopped for {}", self.node.addr());
    }
}
