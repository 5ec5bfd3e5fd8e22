//! Capture front-ends feeding raw frames into the encode session.
//!
//! Every source negotiates its own width/height/format/frame-rate at open
//! time; whatever it settles on is authoritative for the encoder
//! configuration. Sources deliver one raw frame per call, pacing the
//! submission thread at the capture cadence.

mod fixed;
#[cfg(feature = "v4l")]
mod v4l;

use anyhow::{bail, Result};
use vastream_codec::PixelFormat;

use crate::config::StreamConfig;

pub use self::fixed::FixedSource;
#[cfg(feature = "v4l")]
pub use self::v4l::V4lSource;

/// Capture front-end selection (`--mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Video4Linux2 device capture.
    V4l,
    /// Shared-memory IPC video capture.
    Ipc,
    /// Fixed color-bar frame generator.
    Fixed,
    /// Fixed frame generator at UHD resolution.
    Fixed4k,
}

impl CaptureMode {
    /// Parse the numeric `--mode` option.
    pub fn from_flag(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::V4l),
            1 => Ok(Self::Ipc),
            2 => Ok(Self::Fixed),
            3 => Ok(Self::Fixed4k),
            _ => bail!("unknown capture mode {value}"),
        }
    }
}

/// Format a capture source settled on during negotiation.
#[derive(Debug, Clone, Copy)]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub pixel_format: PixelFormat,
}

/// A source of raw video frames.
pub trait CaptureSource: Send {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// The negotiated capture format.
    fn format(&self) -> CaptureFormat;

    /// Block until the next frame is available and return its bytes.
    fn next_frame(&mut self) -> Result<Vec<u8>>;
}

/// Open the capture source selected by `config`, negotiating against the
/// requested width/height/frame-rate.
pub fn open_source(config: &StreamConfig) -> Result<Box<dyn CaptureSource>> {
    let encoder = &config.encoder;
    match config.mode {
        #[cfg(feature = "v4l")]
        CaptureMode::V4l => Ok(Box::new(V4lSource::open(
            &config.device,
            encoder.width,
            encoder.height,
            encoder.frame_rate,
        )?)),
        #[cfg(not(feature = "v4l"))]
        CaptureMode::V4l => bail!("V4L capture support is not compiled in (feature `v4l`)"),
        CaptureMode::Ipc => {
            bail!("IPC video capture requires the shared-memory transport, which is not built")
        }
        CaptureMode::Fixed => Ok(Box::new(FixedSource::new(
            encoder.width,
            encoder.height,
            encoder.frame_rate,
        ))),
        CaptureMode::Fixed4k => Ok(Box::new(FixedSource::new(3840, 2160, encoder.frame_rate))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_flag_parsing() {
        assert_eq!(CaptureMode::from_flag(0).unwrap(), CaptureMode::V4l);
        assert_eq!(CaptureMode::from_flag(2).unwrap(), CaptureMode::Fixed);
        assert_eq!(CaptureMode::from_flag(3).unwrap(), CaptureMode::Fixed4k);
        assert!(CaptureMode::from_flag(9).is_err());
    }
}
