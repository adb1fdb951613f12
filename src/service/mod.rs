//! The capture/transport service: screen capture, the presenter's WebSocket
//! server, and the viewer's connection.
//!
//! The view only ever sees the `CaptureTransport` trait and the event bus;
//! everything about sockets, capture threads, and fan-out stays behind it.
//!
//! Each start-sharing and each connect gets its own generation flag. The
//! loops of a generation watch only their own flag, so stopping and starting
//! again within a poll window can never revive loops from the previous
//! generation.

mod client;
mod server;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::events::EventBus;

/// How often the service's long-poll loops wake up to re-check their
/// generation flag.
const FLAG_POLL: Duration = Duration::from_millis(250);

/// Request failures surfaced to the view. They become status text and
/// nothing else; no caller branches on the variant.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("could not start sharing: {0}")]
    Start(String),
    #[error("could not connect to {address}: {reason}")]
    Connect { address: String, reason: String },
}

/// The service interface the view consumes. Push events (frames, connection
/// status, joins, stop) travel separately over the event bus.
#[async_trait]
pub trait CaptureTransport: Send + Sync {
    /// Local address for display; queried once at startup, stable after.
    fn local_ip(&self) -> String;

    /// Bind the sharing server and start capturing. Returns the address
    /// viewers should connect to.
    async fn start_sharing(&self, port: u16, fps: u32) -> Result<String, ServiceError>;

    /// Wind down the sharing server. Always succeeds.
    async fn stop_sharing(&self);

    /// Dial a presenter. A successful return only means the request was
    /// accepted; the connection-status event reports actual connectivity.
    async fn connect(&self, address: String) -> Result<(), ServiceError>;

    /// Drop the viewer connection. Always succeeds.
    async fn disconnect(&self);
}

/// LAN implementation: one WebSocket server for presenting, one WebSocket
/// client for viewing, frames as MessagePack binary messages.
pub struct LanService {
    events: EventBus,
    /// Current sharing generation. Doubles as the already-sharing guard:
    /// a new start is allowed only while the current flag is down.
    share_alive: Mutex<Arc<AtomicBool>>,
    /// Current viewer-connection generation, same scheme.
    conn_alive: Mutex<Arc<AtomicBool>>,
    local_ip: String,
}

impl LanService {
    pub fn new(events: EventBus) -> Self {
        let local_ip = local_ip_address::local_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|_| "127.0.0.1".to_string());
        Self {
            events,
            share_alive: Mutex::new(Arc::new(AtomicBool::new(false))),
            conn_alive: Mutex::new(Arc::new(AtomicBool::new(false))),
            local_ip,
        }
    }

    /// Install a fresh generation flag, or None while the current generation
    /// is still live. The replaced flag stays with the old generation's
    /// loops, which wind down on their own.
    fn begin_generation(slot: &Mutex<Arc<AtomicBool>>) -> Option<Arc<AtomicBool>> {
        let mut current = slot.lock().unwrap();
        if current.load(Ordering::SeqCst) {
            return None;
        }
        let alive = Arc::new(AtomicBool::new(true));
        *current = alive.clone();
        Some(alive)
    }
}

#[async_trait]
impl CaptureTransport for LanService {
    fn local_ip(&self) -> String {
        self.local_ip.clone()
    }

    async fn start_sharing(&self, port: u16, fps: u32) -> Result<String, ServiceError> {
        let Some(alive) = Self::begin_generation(&self.share_alive) else {
            return Err(ServiceError::Start("already sharing".to_string()));
        };
        match server::start(port, fps, alive.clone(), self.events.clone()).await {
            Ok(()) => {
                info!(port, fps, "sharing started");
                Ok(format!("{}:{}", self.local_ip, port))
            }
            Err(reason) => {
                alive.store(false, Ordering::SeqCst);
                Err(ServiceError::Start(reason))
            }
        }
    }

    async fn stop_sharing(&self) {
        self.share_alive.lock().unwrap().store(false, Ordering::SeqCst);
        info!("sharing stop requested");
    }

    async fn connect(&self, address: String) -> Result<(), ServiceError> {
        let Some(alive) = Self::begin_generation(&self.conn_alive) else {
            return Err(ServiceError::Connect {
                address,
                reason: "already connected".to_string(),
            });
        };
        match client::connect(&address, alive.clone(), self.events.clone()).await {
            Ok(()) => {
                info!(%address, "connected to presenter");
                Ok(())
            }
            Err(reason) => {
                alive.store(false, Ordering::SeqCst);
                Err(ServiceError::Connect { address, reason })
            }
        }
    }

    async fn disconnect(&self) {
        self.conn_alive.lock().unwrap().store(false, Ordering::SeqCst);
        info!("disconnect requested");
    }
}
