// Captured still frames

use std::sync::Arc;
use std::time::Instant;

/// A captured still image (RGBA, row-major, tightly packed).
///
/// Pixels are shared, so cloning a frame for display or export never copies
/// image data.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Capture order within the session, starting at 1
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pixels: Arc<[u8]>,
    /// Monotonic capture instant
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(sequence: u64, width: u32, height: u32, pixels: impl Into<Arc<[u8]>>) -> Self {
        Self {
            sequence,
            width,
            height,
            pixels: pixels.into(),
            captured_at: Instant::now(),
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Size of the pixel data in bytes
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// True if both frames share the same pixel allocation
    pub fn shares_pixels_with(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}
