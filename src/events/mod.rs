//! Typed push-event channels from the service to the view.
//!
//! The service used to be reachable only through stringly-typed emit/listen
//! callbacks; here each event class gets its own channel and the subscriber
//! does the typed dispatch. All four subscriptions come up together when the
//! view starts and go away together when it is dropped.

use tokio::sync::mpsc;
use tracing::trace;

use crate::pipeline::FramePipeline;
use crate::screen::ScreenFrame;
use crate::session::Session;

/// Sender half, cloned into the service tasks.
#[derive(Clone)]
pub struct EventBus {
    frames: mpsc::UnboundedSender<ScreenFrame>,
    connection: mpsc::UnboundedSender<String>,
    joined: mpsc::UnboundedSender<String>,
    stopped: mpsc::UnboundedSender<()>,
}

impl EventBus {
    /// Create the bus and its matching subscriber.
    pub fn channel() -> (EventBus, Subscriber) {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (connection_tx, connection_rx) = mpsc::unbounded_channel();
        let (joined_tx, joined_rx) = mpsc::unbounded_channel();
        let (stopped_tx, stopped_rx) = mpsc::unbounded_channel();
        (
            EventBus {
                frames: frames_tx,
                connection: connection_tx,
                joined: joined_tx,
                stopped: stopped_tx,
            },
            Subscriber {
                frames: frames_rx,
                connection: connection_rx,
                joined: joined_rx,
                stopped: stopped_rx,
            },
        )
    }

    pub fn emit_frame(&self, frame: ScreenFrame) {
        let _ = self.frames.send(frame);
    }

    pub fn emit_connection_status(&self, status: &str) {
        let _ = self.connection.send(status.to_string());
    }

    pub fn emit_client_joined(&self, id: String) {
        let _ = self.joined.send(id);
    }

    pub fn emit_sharing_stopped(&self) {
        let _ = self.stopped.send(());
    }
}

/// Receiver half, owned by the view for its lifetime.
pub struct Subscriber {
    frames: mpsc::UnboundedReceiver<ScreenFrame>,
    connection: mpsc::UnboundedReceiver<String>,
    joined: mpsc::UnboundedReceiver<String>,
    stopped: mpsc::UnboundedReceiver<()>,
}

impl Subscriber {
    /// Drain everything queued, routing frames to the pipeline and the rest
    /// to the session. Events are applied regardless of the current mode: a
    /// presenter event arriving in viewer mode still mutates state, it just
    /// isn't displayed.
    pub fn dispatch(&mut self, session: &mut Session, pipeline: &FramePipeline) {
        while let Ok(frame) = self.frames.try_recv() {
            trace!(seq = frame.seq, "frame event");
            pipeline.submit(frame);
        }
        while let Ok(status) = self.connection.try_recv() {
            session.apply_connection_status(&status);
        }
        while let Ok(id) = self.joined.try_recv() {
            session.viewer_joined(id);
        }
        while self.stopped.try_recv().is_ok() {
            session.apply_sharing_stopped();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Renderer;
    use crate::session::CONNECTED;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingRenderer {
        seqs: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl Renderer for RecordingRenderer {
        async fn render(&self, frame: ScreenFrame) -> anyhow::Result<()> {
            self.seqs.lock().unwrap().push(frame.seq);
            Ok(())
        }
    }

    fn frame(seq: u64) -> ScreenFrame {
        ScreenFrame {
            width: 4,
            height: 2,
            jpeg_data: vec![1, 2, 3],
            seq,
        }
    }

    #[tokio::test]
    async fn each_event_class_routes_to_its_target() {
        let (bus, mut subscriber) = EventBus::channel();
        let mut session = Session::new("127.0.0.1".to_string(), 9000, 10);
        session.choose_presenter();
        let renderer = Arc::new(RecordingRenderer::default());
        let pipeline = FramePipeline::new(renderer.clone());

        bus.emit_frame(frame(7));
        bus.emit_connection_status(CONNECTED);
        bus.emit_client_joined("10.0.0.7:51000".to_string());
        bus.emit_sharing_stopped();

        subscriber.dispatch(&mut session, &pipeline);

        assert!(session.is_connected());
        assert_eq!(session.roster(), ["10.0.0.7:51000"]);
        assert!(!session.is_sharing()); // stop applied even though never started

        // The frame reaches the renderer via the pipeline's spawned task
        for _ in 0..100 {
            if !renderer.seqs.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(*renderer.seqs.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn events_apply_in_any_mode() {
        let (bus, mut subscriber) = EventBus::channel();
        let mut session = Session::new("127.0.0.1".to_string(), 9000, 10);
        // Still in Select: viewer-role and presenter-role events both land
        let pipeline = FramePipeline::new(Arc::new(RecordingRenderer::default()));

        bus.emit_connection_status(CONNECTED);
        bus.emit_client_joined("10.0.0.9:4242".to_string());
        subscriber.dispatch(&mut session, &pipeline);

        assert!(session.is_connected());
        assert_eq!(session.roster().len(), 1);
    }
}
