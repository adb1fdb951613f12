//! Command gateway — the view's request path into the capture/transport
//! service.
//!
//! Requests run on spawned tasks so the view's event loop never blocks on
//! the backend; outcomes that matter come back through the reply channel,
//! drained by the view alongside the pushed events. Stop and disconnect are
//! fire-and-forget and assumed to succeed.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::service::CaptureTransport;

/// Completion of an earlier gateway request. Failures are already flattened
/// to human-readable text; nothing structured crosses this boundary.
#[derive(Debug)]
pub enum GatewayReply {
    SharingStarted(String),
    StartFailed(String),
    ConnectFailed(String),
}

pub struct CommandGateway {
    service: Arc<dyn CaptureTransport>,
    reply_tx: mpsc::UnboundedSender<GatewayReply>,
}

impl CommandGateway {
    pub fn new(
        service: Arc<dyn CaptureTransport>,
    ) -> (Self, mpsc::UnboundedReceiver<GatewayReply>) {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        (Self { service, reply_tx }, reply_rx)
    }

    /// Idempotent; the service caches the answer at startup.
    pub fn local_address(&self) -> String {
        self.service.local_ip()
    }

    /// Ask the service to bind and start capturing. The outcome arrives as a
    /// `SharingStarted` or `StartFailed` reply.
    pub fn start_sharing(&self, port: u16, fps: u32) {
        let service = Arc::clone(&self.service);
        let reply_tx = self.reply_tx.clone();
        tokio::spawn(async move {
            let reply = match service.start_sharing(port, fps).await {
                Ok(address) => GatewayReply::SharingStarted(address),
                Err(e) => GatewayReply::StartFailed(e.to_string()),
            };
            let _ = reply_tx.send(reply);
        });
    }

    /// Fire-and-forget; assumed to always succeed.
    pub fn stop_sharing(&self) {
        let service = Arc::clone(&self.service);
        tokio::spawn(async move {
            service.stop_sharing().await;
        });
    }

    /// Fire-and-forget in the success case: the request completing does not
    /// mean the connection is up. Only a rejected request replies
    /// (`ConnectFailed`); success is reported by the connection-status event.
    pub fn connect(&self, address: String) {
        let service = Arc::clone(&self.service);
        let reply_tx = self.reply_tx.clone();
        tokio::spawn(async move {
            debug!(%address, "connect requested");
            if let Err(e) = service.connect(address).await {
                let _ = reply_tx.send(GatewayReply::ConnectFailed(e.to_string()));
            }
        });
    }

    /// Fire-and-forget; assumed to always succeed.
    pub fn disconnect(&self) {
        let service = Arc::clone(&self.service);
        tokio::spawn(async move {
            service.disconnect().await;
        });
    }
}
