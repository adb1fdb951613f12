pub mod capture;
pub mod viewer;

use serde::{Deserialize, Serialize};

/// One compressed screen snapshot plus its declared pixel dimensions.
/// Produced once per capture tick, rendered at most once, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenFrame {
    pub width: u32,
    pub height: u32,
    /// JPEG-compressed pixels
    pub jpeg_data: Vec<u8>,
    /// Capture sequence number (for drop diagnostics in logs)
    pub seq: u64,
}

/// Max width for captured frames. Wider sources are downscaled to this,
/// preserving aspect ratio, before JPEG encoding.
pub const MAX_CAPTURE_WIDTH: u32 = 1920;
/// JPEG quality (1-100). Higher = sharper, more bandwidth per frame.
pub const JPEG_QUALITY: u8 = 80;
