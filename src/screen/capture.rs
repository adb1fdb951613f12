//! Screen capture loop.
//!
//! Captures the primary display on a dedicated thread at the requested frame
//! rate, downscales to MAX_CAPTURE_WIDTH, JPEG-compresses, and pushes frames
//! into a bounded channel. If the consumer falls behind, frames are dropped
//! at the channel rather than queued.

use anyhow::Result;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use scrap::{Capturer, Display};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ScreenFrame, JPEG_QUALITY, MAX_CAPTURE_WIDTH};

/// Handle to a running capture thread. Dropping it stops the capture.
pub struct ScreenCapture {
    running: Arc<AtomicBool>,
    frame_rx: Option<mpsc::Receiver<ScreenFrame>>,
}

impl ScreenCapture {
    /// Start capturing the primary display at `fps` frames per second.
    pub fn start(fps: u32) -> Result<Self> {
        // Verify a display exists before spawning the thread
        let display =
            Display::primary().map_err(|e| anyhow::anyhow!("no display found: {}", e))?;
        drop(display); // Capturer is not Send on X11; recreate inside the thread

        let fps = fps.max(1);
        let running = Arc::new(AtomicBool::new(true));
        // Bounded channel (cap 2): a slow consumer sheds frames here
        let (frame_tx, frame_rx) = mpsc::channel::<ScreenFrame>(2);

        let running_clone = running.clone();
        std::thread::spawn(move || {
            let display = match Display::primary() {
                Ok(d) => d,
                Err(e) => {
                    warn!("screen capture: no display: {}", e);
                    return;
                }
            };
            let w = display.width();
            let h = display.height();
            let capturer = match Capturer::new(display) {
                Ok(c) => c,
                Err(e) => {
                    warn!("screen capture: failed to start: {}", e);
                    return;
                }
            };
            debug!("screen capture started: {}x{} @ {} fps", w, h, fps);
            capture_loop(capturer, w, h, fps, frame_tx, running_clone);
        });

        Ok(Self {
            running,
            frame_rx: Some(frame_rx),
        })
    }

    /// Take the frame receiver (can only be called once)
    pub fn take_frame_rx(&mut self) -> Option<mpsc::Receiver<ScreenFrame>> {
        self.frame_rx.take()
    }

    /// Stop capturing
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl Drop for ScreenCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    mut capturer: Capturer,
    src_w: usize,
    src_h: usize,
    fps: u32,
    tx: mpsc::Sender<ScreenFrame>,
    running: Arc<AtomicBool>,
) {
    let frame_interval = Duration::from_millis(1000 / fps as u64);
    let mut seq: u64 = 0;

    // Output dimensions: downscale to MAX_CAPTURE_WIDTH, preserve aspect ratio
    let (out_w, out_h) = if src_w as u32 > MAX_CAPTURE_WIDTH {
        let scale = MAX_CAPTURE_WIDTH as f64 / src_w as f64;
        (MAX_CAPTURE_WIDTH, (src_h as f64 * scale) as u32)
    } else {
        (src_w as u32, src_h as u32)
    };

    while running.load(Ordering::Relaxed) {
        let tick_start = Instant::now();

        match capturer.frame() {
            Ok(raw) => {
                // scrap hands out BGRA with possible row padding
                let stride = raw.len() / src_h;
                let rgb = scale_to_rgb(&raw, (src_w, src_h), stride, (out_w, out_h));

                match encode_jpeg(&rgb) {
                    Ok(jpeg_data) => {
                        let frame = ScreenFrame {
                            width: out_w,
                            height: out_h,
                            jpeg_data,
                            seq,
                        };
                        seq += 1;

                        match tx.try_send(frame) {
                            Ok(_) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                // Consumer behind — shed this frame
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        }
                    }
                    Err(e) => warn!("frame encode failed: {}", e),
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // Frame not ready yet
                std::thread::sleep(Duration::from_millis(5));
                continue;
            }
            Err(e) => {
                warn!("capture error, retrying: {}", e);
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
        }

        let elapsed = tick_start.elapsed();
        if elapsed < frame_interval {
            std::thread::sleep(frame_interval - elapsed);
        }
    }
    debug!("screen capture stopped");
}

/// Sample a padded BGRA capture buffer into a packed RGB image,
/// nearest-neighbor, swapping the channel order as it goes. Out-of-bounds
/// samples (stride rounding on the last row) come out black.
fn scale_to_rgb(bgra: &[u8], src: (usize, usize), stride: usize, dst: (u32, u32)) -> RgbImage {
    let (src_w, src_h) = src;
    let (dst_w, dst_h) = dst;
    let mut out = RgbImage::new(dst_w, dst_h);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let sx = (x as usize * src_w) / dst_w as usize;
        let sy = (y as usize * src_h) / dst_h as usize;
        let i = sy * stride + sx * 4;
        *pixel = if i + 2 < bgra.len() {
            image::Rgb([bgra[i + 2], bgra[i + 1], bgra[i]])
        } else {
            image::Rgb([0, 0, 0])
        };
    }
    out
}

fn encode_jpeg(img: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two BGRA pixels wide, one tall, with four bytes of row padding
    fn bgra_row() -> Vec<u8> {
        let mut row = vec![
            255, 0, 0, 0, // blue
            0, 0, 255, 0, // red
        ];
        row.extend_from_slice(&[9, 9, 9, 9]);
        row
    }

    #[test]
    fn scaling_swaps_bgra_to_rgb() {
        let rgb = scale_to_rgb(&bgra_row(), (2, 1), 12, (2, 1));
        assert_eq!(rgb.get_pixel(0, 0), &image::Rgb([0, 0, 255]));
        assert_eq!(rgb.get_pixel(1, 0), &image::Rgb([255, 0, 0]));
    }

    #[test]
    fn downscale_keeps_declared_dimensions() {
        let src = vec![128u8; 8 * 4 * 4];
        let rgb = scale_to_rgb(&src, (8, 4), 8 * 4, (4, 2));
        assert_eq!(rgb.dimensions(), (4, 2));
    }

    #[test]
    fn encoded_frames_carry_a_jpeg_header() {
        let img = RgbImage::from_pixel(16, 8, image::Rgb([40, 80, 120]));
        let jpeg = encode_jpeg(&img).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
    }
}
