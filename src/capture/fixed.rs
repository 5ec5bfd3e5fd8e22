//! Fixed-frame capture source: generates a static color-bar pattern at a
//! steady frame rate. Used for soak testing the encode and transport
//! path without any capture hardware attached.

use std::time::{Duration, Instant};

use anyhow::Result;
use vastream_codec::PixelFormat;

use super::{CaptureFormat, CaptureSource};

/// 75% color bars as (Y, U, V), left to right.
const BARS: [(u8, u8, u8); 7] = [
    (180, 128, 128), // white
    (162, 44, 142),  // yellow
    (131, 156, 44),  // cyan
    (112, 72, 58),   // green
    (84, 184, 198),  // magenta
    (65, 100, 212),  // red
    (35, 212, 114),  // blue
];

/// Static color-bar frame generator.
pub struct FixedSource {
    frame: Vec<u8>,
    width: u32,
    height: u32,
    frame_rate: u32,
    interval: Duration,
    next_due: Instant,
}

impl FixedSource {
    #[must_use]
    pub fn new(width: u32, height: u32, frame_rate: u32) -> Self {
        let frame_rate = frame_rate.max(1);
        Self {
            frame: render_bars(width, height),
            width,
            height,
            frame_rate,
            interval: Duration::from_secs(1) / frame_rate,
            next_due: Instant::now(),
        }
    }
}

impl CaptureSource for FixedSource {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn format(&self) -> CaptureFormat {
        CaptureFormat {
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
            pixel_format: PixelFormat::Yuyv,
        }
    }

    fn next_frame(&mut self) -> Result<Vec<u8>> {
        let now = Instant::now();
        if let Some(wait) = self.next_due.checked_duration_since(now) {
            std::thread::sleep(wait);
        }
        self.next_due = self.next_due.max(now) + self.interval;
        Ok(self.frame.clone())
    }
}

/// Paint the bar pattern as packed YUYV.
fn render_bars(width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let bar_width = (w / BARS.len()).max(1);

    let mut row = Vec::with_capacity(w * 2);
    for x in (0..w).step_by(2) {
        let (y, u, v) = BARS[(x / bar_width).min(BARS.len() - 1)];
        row.extend_from_slice(&[y, u, y, v]);
    }

    let mut frame = Vec::with_capacity(w * h * 2);
    for _ in 0..h {
        frame.extend_from_slice(&row);
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_matches_negotiated_format() {
        let mut source = FixedSource::new(320, 240, 30);
        let format = source.format();
        let frame = source.next_frame().unwrap();
        assert_eq!(
            frame.len(),
            format.pixel_format.frame_size(format.width, format.height)
        );
    }

    #[test]
    fn test_frames_are_stable() {
        let mut source = FixedSource::new(64, 8, 1000);
        let a = source.next_frame().unwrap();
        let b = source.next_frame().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_left_edge_is_white_bar() {
        let mut source = FixedSource::new(64, 2, 1000);
        let frame = source.next_frame().unwrap();
        assert_eq!(&frame[..4], &[180, 128, 180, 128]);
    }
}
