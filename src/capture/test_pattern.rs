// Synthetic frame source for headless runs and tests

use super::frame::Frame;
use super::session::FrameSource;

/// Produces RGBA frames with a vertical bar that moves one column per frame.
/// The first pixel's RGBA bytes hold the low 32 bits of the sequence number.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    next_sequence: u64,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            next_sequence: 1,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Render the next frame
    pub fn next_frame(&mut self) -> Frame {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let (w, h) = (self.width as usize, self.height as usize);
        let bar = (sequence as usize) % w;
        let mut pixels = vec![0u8; w * h * 4];
        for (i, px) in pixels.chunks_exact_mut(4).enumerate() {
            let x = i % w;
            let shade = if x == bar { 255 } else { ((x * 255) / w) as u8 / 2 };
            px.copy_from_slice(&[shade, shade, shade, 255]);
        }
        pixels[..4].copy_from_slice(&(sequence as u32).to_le_bytes());

        Frame::new(sequence, self.width, self.height, pixels)
    }
}

impl FrameSource for TestPatternSource {
    fn capture(&mut self) -> anyhow::Result<Option<Frame>> {
        Ok(Some(self.next_frame()))
    }
}
