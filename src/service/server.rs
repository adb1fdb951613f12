//! Presenter side: capture the screen and fan frames out to every connected
//! viewer over WebSocket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::FLAG_POLL;
use crate::events::EventBus;
use crate::screen::capture::ScreenCapture;
use crate::screen::ScreenFrame;

/// Bind the listener and spawn the capture and accept loops. Returns once
/// the listener is bound; everything else runs until this generation's
/// `alive` flag drops.
pub(super) async fn start(
    port: u16,
    fps: u32,
    alive: Arc<AtomicBool>,
    events: EventBus,
) -> Result<(), String> {
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| format!("bind {} failed: {}", bind_addr, e))?;

    let mut capture = ScreenCapture::start(fps).map_err(|e| e.to_string())?;
    let frame_rx = capture
        .take_frame_rx()
        .ok_or_else(|| "capture produced no frame channel".to_string())?;

    // Fan-out bus: every viewer task holds a subscription
    let (frame_tx, _) = broadcast::channel::<Vec<u8>>(16);

    let forward_alive = alive.clone();
    let forward_tx = frame_tx.clone();
    let forward_events = events.clone();
    tokio::spawn(async move {
        forward_frames(frame_rx, forward_tx, forward_alive, forward_events).await;
        capture.stop();
    });
    tokio::spawn(accept_viewers(listener, frame_tx, alive, events));

    Ok(())
}

/// Pull captured frames, encode for the wire, and broadcast. A loop whose
/// capture side dies while the generation is still live reports the stop;
/// after an explicit stop (flag already down) it winds down silently, since
/// the session was updated on the request path.
async fn forward_frames(
    mut frame_rx: mpsc::Receiver<ScreenFrame>,
    frame_tx: broadcast::Sender<Vec<u8>>,
    alive: Arc<AtomicBool>,
    events: EventBus,
) {
    loop {
        if !alive.load(Ordering::SeqCst) {
            break;
        }
        match timeout(FLAG_POLL, frame_rx.recv()).await {
            Ok(Some(frame)) => match rmp_serde::to_vec(&frame) {
                // No subscribers is fine — nobody has connected yet
                Ok(encoded) => {
                    let _ = frame_tx.send(encoded);
                }
                Err(e) => warn!("frame serialization failed: {}", e),
            },
            Ok(None) => {
                warn!("capture channel closed unexpectedly");
                break;
            }
            Err(_) => continue, // timeout: re-check this generation's flag
        }
    }
    // The swap is true only when the generation terminated on its own
    if alive.swap(false, Ordering::SeqCst) {
        events.emit_sharing_stopped();
    }
    info!("sharing wound down");
}

/// Accept viewer connections while this generation is live, reporting each
/// join.
async fn accept_viewers(
    listener: TcpListener,
    frame_tx: broadcast::Sender<Vec<u8>>,
    alive: Arc<AtomicBool>,
    events: EventBus,
) {
    loop {
        if !alive.load(Ordering::SeqCst) {
            break;
        }
        match timeout(FLAG_POLL, listener.accept()).await {
            Ok(Ok((stream, addr))) => {
                info!(%addr, "viewer connected");
                events.emit_client_joined(addr.to_string());
                tokio::spawn(serve_viewer(stream, frame_tx.subscribe(), alive.clone()));
            }
            Ok(Err(e)) => warn!("accept failed: {}", e),
            Err(_) => continue, // timeout: re-check this generation's flag
        }
    }
    // Listener drops here, freeing the port for a later restart
    debug!("listener closed");
}

/// Push broadcast frames down one viewer's WebSocket until they leave or
/// the generation winds down.
async fn serve_viewer(
    stream: TcpStream,
    mut frame_rx: broadcast::Receiver<Vec<u8>>,
    alive: Arc<AtomicBool>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("websocket handshake failed: {}", e);
            return;
        }
    };
    let (mut write, _) = ws.split();

    loop {
        if !alive.load(Ordering::SeqCst) {
            break;
        }
        match timeout(FLAG_POLL, frame_rx.recv()).await {
            Ok(Ok(encoded)) => {
                if write.send(Message::Binary(encoded)).await.is_err() {
                    debug!("viewer went away");
                    break;
                }
            }
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                // Slow viewer: the bus already dropped the oldest frames
                debug!(skipped, "viewer lagging");
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => break,
            Err(_) => continue, // timeout: re-check this generation's flag
        }
    }
    let _ = write.send(Message::Close(None)).await;
}
