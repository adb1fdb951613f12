//! Frame decoding and the display surface.
//!
//! Rendering goes through ratatui-image, which picks the best terminal
//! graphics protocol available:
//! - Sixel (Windows Terminal, xterm, foot, WezTerm, etc.)
//! - Kitty graphics protocol (Kitty, WezTerm, Ghostty)
//! - iTerm2 inline images (iTerm2, WezTerm)
//! - Halfblocks fallback (any terminal with 24-bit color)

use async_trait::async_trait;
use image::codecs::jpeg::JpegDecoder;
use image::{DynamicImage, ImageDecoder, RgbImage};
use ratatui_image::picker::{Picker, ProtocolType};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;

use super::ScreenFrame;
use crate::pipeline::Renderer;

/// A frame payload that could not be turned into pixels.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("JPEG decode failed: {0}")]
    Jpeg(#[from] image::ImageError),
    #[error("decoded pixel data does not match its dimensions")]
    BadDimensions,
    #[error("decode task aborted")]
    Aborted,
}

/// Create a Picker by querying terminal capabilities.
///
/// A recognized `force_protocol` name skips detection entirely; anything
/// else goes through stdio query first, then env-var heuristics, then the
/// halfblocks fallback.
///
/// Must be called BEFORE entering raw mode / alternate screen.
pub fn create_picker(force_protocol: Option<&str>) -> Picker {
    let forced = force_protocol.and_then(|name| {
        let proto = parse_protocol_name(name);
        if proto.is_none() {
            eprintln!("⚠️  Unknown graphics protocol '{}', using auto-detect", name);
        }
        proto
    });
    match forced {
        Some(proto) => {
            info!("graphics: forced {:?}", proto);
            picker_for(proto)
        }
        None => auto_detect_picker(),
    }
}

fn parse_protocol_name(name: &str) -> Option<ProtocolType> {
    match name.to_lowercase().as_str() {
        "sixel" => Some(ProtocolType::Sixel),
        "kitty" => Some(ProtocolType::Kitty),
        "iterm2" | "iterm" => Some(ProtocolType::Iterm2),
        "halfblocks" | "half" | "text" => Some(ProtocolType::Halfblocks),
        _ => None,
    }
}

fn auto_detect_picker() -> Picker {
    if let Ok(picker) = Picker::from_query_stdio() {
        info!("graphics: detected {:?}", picker.protocol_type());
        return picker;
    }
    // Query failed; guess from the environment before settling for text
    let picker = picker_for(protocol_from_env().unwrap_or(ProtocolType::Halfblocks));
    info!("graphics: {:?} (env heuristic)", picker.protocol_type());
    picker
}

/// WezTerm, Kitty, Ghostty, iTerm2 and Windows Terminal all identify
/// themselves through the environment.
fn protocol_from_env() -> Option<ProtocolType> {
    let term_program = std::env::var("TERM_PROGRAM").unwrap_or_default();
    let term = std::env::var("TERM").unwrap_or_default();

    if term_program.contains("WezTerm") {
        Some(ProtocolType::Sixel)
    } else if term_program.contains("iTerm") {
        Some(ProtocolType::Iterm2)
    } else if term.contains("xterm-kitty")
        || term_program.to_lowercase().contains("kitty")
        || term_program.to_lowercase().contains("ghostty")
    {
        Some(ProtocolType::Kitty)
    } else if std::env::var("WT_SESSION").is_ok_and(|s| !s.is_empty()) {
        Some(ProtocolType::Sixel)
    } else {
        None
    }
}

fn picker_for(proto: ProtocolType) -> Picker {
    let mut picker = Picker::halfblocks();
    if proto != ProtocolType::Halfblocks {
        picker.set_protocol_type(proto);
    }
    picker
}

/// Decode a frame's JPEG payload into an RGB image.
pub fn decode_frame(frame: &ScreenFrame) -> Result<RgbImage, DecodeError> {
    let cursor = Cursor::new(&frame.jpeg_data);
    let decoder = JpegDecoder::new(cursor)?;

    let (w, h) = decoder.dimensions();
    let mut rgb = vec![0u8; decoder.total_bytes() as usize];
    decoder.read_image(&mut rgb)?;

    image::ImageBuffer::from_raw(w, h, rgb).ok_or(DecodeError::BadDimensions)
}

/// The decoded-frame drawing target.
///
/// Its pixel buffer is reallocated only when an incoming frame's dimensions
/// differ from the current ones; same-size frames are copied in place.
pub struct DisplaySurface {
    pixels: Option<RgbImage>,
    generation: u64,
}

impl DisplaySurface {
    pub fn new() -> Self {
        Self {
            pixels: None,
            generation: 0,
        }
    }

    /// Draw a decoded frame onto the surface.
    pub fn blit(&mut self, decoded: &RgbImage) {
        let (w, h) = decoded.dimensions();
        let resize = match self.pixels {
            Some(ref p) => p.dimensions() != (w, h),
            None => true,
        };
        if resize {
            self.pixels = Some(RgbImage::new(w, h));
        }
        if let Some(ref mut pixels) = self.pixels {
            let dst: &mut [u8] = pixels;
            dst.copy_from_slice(decoded.as_raw());
        }
        self.generation += 1;
    }

    /// Surface dimensions, if anything has been drawn yet.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.pixels.as_ref().map(|p| p.dimensions())
    }

    /// Bumped on every blit; lets the view rebuild its image protocol only
    /// when there is a new frame to show.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Clone the current contents for handing to ratatui-image.
    pub fn snapshot(&self) -> Option<DynamicImage> {
        self.pixels
            .as_ref()
            .map(|p| DynamicImage::ImageRgb8(p.clone()))
    }
}

impl Default for DisplaySurface {
    fn default() -> Self {
        Self::new()
    }
}

/// Production renderer: decodes on the blocking pool and blits onto the
/// shared display surface. The decode await is the pipeline's one suspension
/// point; frame submissions arriving during it only touch the pending slot.
pub struct SurfaceRenderer {
    surface: Arc<Mutex<DisplaySurface>>,
}

impl SurfaceRenderer {
    pub fn new(surface: Arc<Mutex<DisplaySurface>>) -> Self {
        Self { surface }
    }
}

#[async_trait]
impl Renderer for SurfaceRenderer {
    async fn render(&self, frame: ScreenFrame) -> anyhow::Result<()> {
        let decoded = tokio::task::spawn_blocking(move || decode_frame(&frame))
            .await
            .map_err(|_| DecodeError::Aborted)??;
        self.surface.lock().unwrap().blit(&decoded);
        // `decoded` dropped here; nothing transient outlives the draw
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;

    fn jpeg_frame(w: u32, h: u32, seq: u64) -> ScreenFrame {
        let img = RgbImage::from_pixel(w, h, image::Rgb([10, 200, 30]));
        let mut buf = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut buf, 90);
        DynamicImage::ImageRgb8(img)
            .write_with_encoder(encoder)
            .unwrap();
        ScreenFrame {
            width: w,
            height: h,
            jpeg_data: buf.into_inner(),
            seq,
        }
    }

    #[test]
    fn decode_roundtrips_dimensions() {
        let frame = jpeg_frame(8, 4, 0);
        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.dimensions(), (8, 4));
    }

    #[test]
    fn decode_rejects_empty_payload() {
        let frame = ScreenFrame {
            width: 100,
            height: 50,
            jpeg_data: Vec::new(),
            seq: 0,
        };
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn surface_resizes_only_on_dimension_change() {
        let mut surface = DisplaySurface::new();
        assert_eq!(surface.dimensions(), None);

        surface.blit(&decode_frame(&jpeg_frame(8, 4, 0)).unwrap());
        assert_eq!(surface.dimensions(), Some((8, 4)));
        assert_eq!(surface.generation(), 1);

        // Same dimensions: drawn in place, generation still advances
        surface.blit(&decode_frame(&jpeg_frame(8, 4, 1)).unwrap());
        assert_eq!(surface.dimensions(), Some((8, 4)));
        assert_eq!(surface.generation(), 2);

        // New dimensions: surface follows the frame
        surface.blit(&decode_frame(&jpeg_frame(4, 2, 2)).unwrap());
        assert_eq!(surface.dimensions(), Some((4, 2)));
    }
}
