//! Viewer side: one WebSocket to the presenter, frames off the wire and
//! onto the event bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::FLAG_POLL;
use crate::events::EventBus;
use crate::screen::ScreenFrame;
use crate::session::CONNECTED;

/// Dial the presenter and spawn the frame reader. The connected event is
/// emitted here; the not-connected event when the reader winds down.
pub(super) async fn connect(
    address: &str,
    alive: Arc<AtomicBool>,
    events: EventBus,
) -> Result<(), String> {
    let url = format!("ws://{}", address);
    let (ws, _) = connect_async(&url).await.map_err(|e| e.to_string())?;
    info!(%address, "websocket established");

    events.emit_connection_status(CONNECTED);

    tokio::spawn(async move {
        let (_, read) = ws.split();
        pump_frames(read, alive, events).await;
    });
    Ok(())
}

/// Read frame messages until the stream ends or this connection generation
/// is shut down. The read is wrapped in a timeout so an explicit disconnect
/// is noticed within one poll interval even on a silent socket. Only a
/// generation that terminated on its own reports not-connected; a reader
/// whose flag was already down (explicit disconnect, or replaced by a later
/// connect) exits silently and can never touch the new connection's state.
async fn pump_frames<S>(mut read: S, alive: Arc<AtomicBool>, events: EventBus)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        if !alive.load(Ordering::SeqCst) {
            break;
        }
        match timeout(FLAG_POLL, read.next()).await {
            Ok(Some(Ok(Message::Binary(data)))) => {
                if !alive.load(Ordering::SeqCst) {
                    break;
                }
                match rmp_serde::from_slice::<ScreenFrame>(&data) {
                    Ok(frame) => events.emit_frame(frame),
                    Err(e) => warn!("undecodable frame message: {}", e),
                }
            }
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                debug!("presenter closed the stream");
                break;
            }
            Ok(Some(Ok(_))) => {} // ping/pong/text — nothing to do
            Ok(Some(Err(e))) => {
                warn!("websocket read failed: {}", e);
                break;
            }
            Err(_) => continue, // timeout: re-check this generation's flag
        }
    }

    // The swap is true only when the generation terminated on its own
    if alive.swap(false, Ordering::SeqCst) {
        events.emit_connection_status("disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{FramePipeline, Renderer};
    use crate::session::Session;
    use async_trait::async_trait;
    use futures_util::stream;

    struct NullRenderer;

    #[async_trait]
    impl Renderer for NullRenderer {
        async fn render(&self, _frame: ScreenFrame) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn connected_viewer_session() -> Session {
        let mut s = Session::new("127.0.0.1".to_string(), 9000, 10);
        s.choose_viewer();
        s.apply_connection_status(CONNECTED);
        s
    }

    fn frame_msg(seq: u64) -> Result<Message, WsError> {
        let frame = ScreenFrame {
            width: 4,
            height: 2,
            jpeg_data: vec![1, 2, 3],
            seq,
        };
        Ok(Message::Binary(rmp_serde::to_vec(&frame).unwrap()))
    }

    #[tokio::test]
    async fn stream_end_reports_not_connected() {
        let (bus, mut subscriber) = EventBus::channel();
        let alive = Arc::new(AtomicBool::new(true));

        pump_frames(stream::iter(vec![frame_msg(1)]), alive.clone(), bus).await;
        assert!(!alive.load(Ordering::SeqCst));

        let mut session = connected_viewer_session();
        let pipeline = FramePipeline::new(Arc::new(NullRenderer));
        subscriber.dispatch(&mut session, &pipeline);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn shut_down_reader_exits_silently() {
        let (bus, mut subscriber) = EventBus::channel();
        // Generation already shut down: an explicit disconnect, or a reader
        // left over after a later connect replaced it
        let alive = Arc::new(AtomicBool::new(false));

        pump_frames(
            stream::pending::<Result<Message, WsError>>(),
            alive,
            bus,
        )
        .await;

        let mut session = connected_viewer_session();
        let pipeline = FramePipeline::new(Arc::new(NullRenderer));
        subscriber.dispatch(&mut session, &pipeline);
        // No frames, no status change: a later connection's state survives
        assert!(session.is_connected());
    }
}
