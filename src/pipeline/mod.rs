//! Frame delivery and rendering pipeline.
//!
//! Keeps exactly one render in flight and at most one pending frame. The
//! single-capacity slot is the only hand-off point: every submitted frame
//! lands there first, displacing anything older, and a render only ever
//! starts from whatever is freshest in the slot at that instant. That keeps
//! rendered frames in arrival order even when a submission races a
//! completing render. Decode failures are logged and count as completed
//! renders; they never stop the pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{trace, warn};

use crate::screen::ScreenFrame;

/// The decode-and-draw half of the pipeline. The production implementation
/// blits onto the display surface; tests inject an instrumented one.
#[async_trait]
pub trait Renderer: Send + Sync + 'static {
    /// Decode one frame and draw it. An error is a decode failure; the
    /// pipeline logs it and moves on to whatever frame is pending.
    async fn render(&self, frame: ScreenFrame) -> anyhow::Result<()>;
}

/// Single-capacity buffer holding the newest undisplayed frame.
///
/// Shared between the submitting task and the in-flight render task, so its
/// contents are only ever exchanged, never inspected in place.
pub struct PendingFrameSlot(Mutex<Option<ScreenFrame>>);

impl PendingFrameSlot {
    fn new() -> Self {
        Self(Mutex::new(None))
    }

    /// Store `frame`, dropping whatever the slot held.
    fn replace(&self, frame: ScreenFrame) -> Option<ScreenFrame> {
        self.0.lock().unwrap().replace(frame)
    }

    fn take(&self) -> Option<ScreenFrame> {
        self.0.lock().unwrap().take()
    }

    fn is_occupied(&self) -> bool {
        self.0.lock().unwrap().is_some()
    }
}

/// The slot plus the render-in-flight flag, shared with the render task.
struct PipelineShared {
    pending: PendingFrameSlot,
    in_flight: AtomicBool,
}

impl PipelineShared {
    /// Deposit a frame (newest wins) and try to claim the slot's contents
    /// for rendering. Returns the frame this caller should render, if any.
    fn deposit(&self, frame: ScreenFrame) -> Option<ScreenFrame> {
        if let Some(stale) = self.pending.replace(frame) {
            trace!(seq = stale.seq, "frame superseded before render");
        }
        self.claim()
    }

    /// A render just finished. Called only by the flag holder: hand out the
    /// next pending frame, or release the flag.
    fn complete(&self) -> Option<ScreenFrame> {
        if let Some(next) = self.pending.take() {
            return Some(next);
        }
        self.in_flight.store(false, Ordering::Release);
        // A frame may have landed between the take above and the release;
        // claim it rather than strand it.
        self.claim()
    }

    /// Become the flag holder and take the pending frame. Frames are handed
    /// out exclusively here, under the flag, so renders serialize in slot
    /// order and always start from the freshest frame.
    fn claim(&self) -> Option<ScreenFrame> {
        while self.pending.is_occupied() {
            if !self.try_acquire() {
                // The current holder re-checks the slot at completion
                return None;
            }
            if let Some(frame) = self.pending.take() {
                return Some(frame);
            }
            // The slot was drained before the acquire; release and look
            // again in case yet another frame landed in between
            self.in_flight.store(false, Ordering::Release);
        }
        None
    }

    fn try_acquire(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Drives renders one at a time, always against the freshest frame.
pub struct FramePipeline {
    renderer: Arc<dyn Renderer>,
    shared: Arc<PipelineShared>,
}

impl FramePipeline {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self {
            renderer,
            shared: Arc::new(PipelineShared {
                pending: PendingFrameSlot::new(),
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    /// Hand a frame to the pipeline. Never blocks and may be called while a
    /// render is outstanding: the frame goes through the pending slot, and a
    /// render starts only if nothing is in flight.
    pub fn submit(&self, frame: ScreenFrame) {
        if let Some(frame) = self.shared.deposit(frame) {
            self.spawn_render(frame);
        }
    }

    /// True when no render is in flight and nothing is pending.
    pub fn is_idle(&self) -> bool {
        !self.shared.in_flight.load(Ordering::Acquire) && !self.shared.pending.is_occupied()
    }

    fn spawn_render(&self, frame: ScreenFrame) {
        let renderer = Arc::clone(&self.renderer);
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            let mut frame = frame;
            loop {
                let seq = frame.seq;
                if let Err(e) = renderer.render(frame).await {
                    warn!(seq, "frame decode failed: {:#}", e);
                }
                match shared.complete() {
                    Some(next) => frame = next,
                    None => break,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn frame(seq: u64) -> ScreenFrame {
        ScreenFrame {
            width: 100,
            height: 50,
            jpeg_data: vec![0xff, 0xd8],
            seq,
        }
    }

    /// Renderer that records sequence numbers and completes each render only
    /// when the test releases it.
    #[derive(Default)]
    struct SteppedRenderer {
        rendered: Mutex<Vec<u64>>,
        started: Notify,
        release: Notify,
        fail_all: bool,
    }

    #[async_trait]
    impl Renderer for SteppedRenderer {
        async fn render(&self, frame: ScreenFrame) -> anyhow::Result<()> {
            self.started.notify_one();
            self.release.notified().await;
            self.rendered.lock().unwrap().push(frame.seq);
            if self.fail_all {
                anyhow::bail!("decode failed")
            }
            Ok(())
        }
    }

    /// Renderer that completes immediately, recording what it drew.
    #[derive(Default)]
    struct InstantRenderer {
        rendered: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl Renderer for InstantRenderer {
        async fn render(&self, frame: ScreenFrame) -> anyhow::Result<()> {
            self.rendered.lock().unwrap().push(frame.seq);
            Ok(())
        }
    }

    async fn wait_idle(pipeline: &FramePipeline) {
        for _ in 0..500 {
            if pipeline.is_idle() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("pipeline never went idle");
    }

    #[tokio::test]
    async fn renders_freshest_and_skips_intermediate() {
        let renderer = Arc::new(SteppedRenderer::default());
        let pipeline = FramePipeline::new(renderer.clone());

        // F1 starts rendering immediately
        pipeline.submit(frame(1));
        renderer.started.notified().await;

        // F2 and F3 arrive while F1 is in flight; F3 displaces F2
        pipeline.submit(frame(2));
        pipeline.submit(frame(3));

        // F1 completes, F3 starts
        renderer.release.notify_one();
        renderer.started.notified().await;
        renderer.release.notify_one();

        wait_idle(&pipeline).await;
        assert_eq!(*renderer.rendered.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn rendered_frames_stay_in_arrival_order() {
        let renderer = Arc::new(SteppedRenderer::default());
        let pipeline = FramePipeline::new(renderer.clone());

        pipeline.submit(frame(0));
        renderer.started.notified().await;

        // Burst a few frames between each completion
        let mut seq = 1;
        for _ in 0..5 {
            pipeline.submit(frame(seq));
            pipeline.submit(frame(seq + 1));
            seq += 2;
            renderer.release.notify_one();
            renderer.started.notified().await;
        }
        renderer.release.notify_one();
        wait_idle(&pipeline).await;

        let rendered = renderer.rendered.lock().unwrap().clone();
        assert!(!rendered.is_empty());
        // Never out of order, never the same frame twice in a row
        for pair in rendered.windows(2) {
            assert!(pair[0] < pair[1], "out of order: {:?}", rendered);
        }
    }

    // Paired back-to-back submissions racing instant render completions on a
    // multi-thread runtime: a submission landing exactly between a completing
    // render's slot check and its flag release must not let an older frame
    // render after a newer one.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn burst_submissions_never_render_out_of_order() {
        let renderer = Arc::new(InstantRenderer::default());
        let pipeline = FramePipeline::new(renderer.clone());

        let mut seq: u64 = 0;
        for burst in 0..50_000u64 {
            pipeline.submit(frame(seq));
            pipeline.submit(frame(seq + 1));
            seq += 2;
            // Vary the gap so submissions land at different points of the
            // in-flight render's completion path
            for _ in 0..(burst % 7) {
                std::hint::spin_loop();
            }
            if burst % 64 == 0 {
                tokio::task::yield_now().await;
            }
        }
        wait_idle(&pipeline).await;

        let rendered = renderer.rendered.lock().unwrap().clone();
        assert!(!rendered.is_empty());
        for pair in rendered.windows(2) {
            assert!(
                pair[0] < pair[1],
                "out-of-order render: {} then {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[tokio::test]
    async fn decode_failure_does_not_halt_the_pipeline() {
        let renderer = Arc::new(SteppedRenderer {
            fail_all: true,
            ..Default::default()
        });
        let pipeline = FramePipeline::new(renderer.clone());

        pipeline.submit(frame(1));
        renderer.started.notified().await;
        pipeline.submit(frame(2));

        // F1 fails; the pending F2 must still be picked up
        renderer.release.notify_one();
        renderer.started.notified().await;
        renderer.release.notify_one();

        wait_idle(&pipeline).await;
        assert_eq!(*renderer.rendered.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn idle_pipeline_renders_each_frame() {
        let renderer = Arc::new(InstantRenderer::default());
        let pipeline = FramePipeline::new(renderer.clone());

        pipeline.submit(frame(1));
        wait_idle(&pipeline).await;
        pipeline.submit(frame(2));
        wait_idle(&pipeline).await;

        assert_eq!(*renderer.rendered.lock().unwrap(), vec![1, 2]);
    }
}
