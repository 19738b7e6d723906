//! Screenshot source abstraction.
//!
//! The browser engine lives outside this crate; anything that can produce a PNG
//! implements [`CaptureBackend`]. [`MockFramebuffer`] is an in-memory page used by
//! tests, benches and the demo runner.

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{ImageBuffer, RgbImage};
use std::io::Cursor;

use super::types::{EvidenceError, EvidenceResult};

/// Options forwarded to a screenshot call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreenshotOptions {
    /// Capture the whole scrollable page instead of the visible viewport
    pub full_page: bool,
}

impl ScreenshotOptions {
    pub fn full_page() -> Self {
        Self { full_page: true }
    }
}

/// Result of a capture operation
#[derive(Debug, Clone)]
pub struct CaptureResult {
    /// PNG-encoded image data
    pub image_data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Trait for screenshot sources
///
/// Implementations wrap whatever drives the UI under test (a browser page, an
/// element handle, a virtual display).
pub trait CaptureBackend: Send {
    /// Perform a capture and return the result
    fn capture(&mut self, options: &ScreenshotOptions) -> EvidenceResult<CaptureResult>;

    /// Get the source type identifier (e.g., "page", "mock")
    fn source_type(&self) -> &str;
}

/// A virtual page for tests and programmatic drawing
///
/// The buffer holds the full document; `viewport_height` limits what a
/// non-full-page capture returns.
#[derive(Debug, Clone)]
pub struct MockFramebuffer {
    width: u32,
    height: u32,
    viewport_height: u32,
    /// RGB pixel buffer (row-major, 3 bytes per pixel)
    buffer: Vec<u8>,
}

impl MockFramebuffer {
    /// Create a new page with the given dimensions, initialized to black
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            viewport_height: height,
            buffer: vec![0u8; buffer_len(width, height)],
        }
    }

    /// Create a page initialized to a specific color
    pub fn with_color(width: u32, height: u32, color: [u8; 3]) -> Self {
        let mut fb = Self::new(width, height);
        fb.fill(color);
        fb
    }

    /// Limit non-full-page captures to the top `height` rows
    pub fn with_viewport(mut self, height: u32) -> Self {
        self.viewport_height = height.min(self.height);
        self
    }

    /// Load a page from PNG image bytes
    pub fn from_png_bytes(data: &[u8]) -> EvidenceResult<Self> {
        let rgb = image::load_from_memory(data)?.to_rgb8();
        let (width, height) = (rgb.width(), rgb.height());
        Ok(Self {
            width,
            height,
            viewport_height: height,
            buffer: rgb.into_raw(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Fill the entire page with a color
    pub fn fill(&mut self, color: [u8; 3]) {
        for chunk in self.buffer.chunks_exact_mut(3) {
            chunk.copy_from_slice(&color);
        }
    }

    /// Draw a filled rectangle
    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
        for py in y..y.saturating_add(h).min(self.height) {
            for px in x..x.saturating_add(w).min(self.width) {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Draw text using font8x8 glyphs. Each character is 8x8 pixels; text does not wrap.
    pub fn draw_text(&mut self, x: u32, y: u32, text: &str, fg: [u8; 3], bg: [u8; 3]) {
        let mut cursor_x = x;
        for ch in text.chars() {
            if cursor_x >= self.width {
                break;
            }
            let glyph = BASIC_FONTS.get(ch).unwrap_or([0u8; 8]);
            for (row_idx, row) in glyph.iter().enumerate() {
                for bit in 0..8 {
                    // font8x8 stores LSB as leftmost pixel
                    let color = if (row >> bit) & 1 == 1 { fg } else { bg };
                    self.set_pixel(cursor_x.saturating_add(bit), y.saturating_add(row_idx as u32), color);
                }
            }
            cursor_x = cursor_x.saturating_add(8);
        }
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0];
        }
        let idx = self.pixel_index(x, y);
        [self.buffer[idx], self.buffer[idx + 1], self.buffer[idx + 2]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = self.pixel_index(x, y);
        self.buffer[idx..idx + 3].copy_from_slice(&color);
    }

    fn pixel_index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 3
    }

    /// Encode the top `rows` rows as PNG bytes
    fn encode_rows(&self, rows: u32) -> EvidenceResult<Vec<u8>> {
        let pixels = self
            .buffer
            .get(..buffer_len(self.width, rows))
            .ok_or_else(|| EvidenceError::Capture(format!("Page has fewer than {} rows", rows)))?;
        let img: RgbImage = ImageBuffer::from_raw(self.width, rows, pixels.to_vec())
            .ok_or_else(|| EvidenceError::Capture("Buffer size does not match dimensions".to_string()))?;
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
        Ok(bytes)
    }

    /// Encode the whole page as PNG bytes
    pub fn to_png(&self) -> EvidenceResult<Vec<u8>> {
        self.encode_rows(self.height)
    }
}

/// RGB byte count of a `width` x `height` buffer, computed without `u32` overflow
fn buffer_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

impl CaptureBackend for MockFramebuffer {
    fn capture(&mut self, options: &ScreenshotOptions) -> EvidenceResult<CaptureResult> {
        let rows = if options.full_page {
            self.height
        } else {
            self.viewport_height
        };
        Ok(CaptureResult {
            image_data: self.encode_rows(rows)?,
            width: self.width,
            height: rows,
        })
    }

    fn source_type(&self) -> &str {
        "mock"
    }
}
