//! Hardware-accelerated H.264 encoding pipeline for vastream.
//!
//! This crate implements the encoding core of the streamer: a VA-API
//! encode session with hand-built H.264 headers and a double-buffered,
//! asynchronous coded-output pathway.
//!
//! - [`bitstream`] - big-endian bit writer (fixed-width, Exp-Golomb, RBSP)
//! - [`nal`] - SPS / PPS / SEI builders producing Annex-B NAL units
//! - [`gop`] - frame-type decision, picture order counts, reference lists
//! - [`pipeline`] - surface-state tracking and the bounded frame task queue
//! - [`csc`] - raw-frame conversions into the accelerator's NV12 layout
//! - [`vaapi`] - the hardware encode session (feature `vaapi`)
//!
//! # Quick Start
//!
//! ```ignore
//! use vastream_codec::{EncoderConfig, RateControl, SinkSet, VaapiEncoder, VideoEncoder};
//!
//! let config = EncoderConfig::new(1280, 720)
//!     .frame_rate(30)
//!     .bitrate(3_000_000)
//!     .rate_control(RateControl::Cbr);
//!
//! let mut sinks = SinkSet::new();
//! sinks.push(Box::new(my_rtp_sink));
//!
//! let mut encoder = VaapiEncoder::new(config, sinks)?;
//! loop {
//!     let frame = capture.next_frame()?;
//!     encoder.submit_frame(&frame)?;
//! }
//! ```
//!
//! Everything except the [`vaapi`] module is hardware-independent and
//! fully exercised by unit tests; the `vaapi` feature adds the libva
//! linkage.

pub mod bitstream;
pub mod csc;
mod error;
pub mod gop;
pub mod nal;
pub mod pipeline;
mod traits;
mod types;

pub use error::CodecError;
pub use traits::{CodedSink, SinkSet, VideoEncoder};
pub use types::{EncoderConfig, EntropyMode, PixelFormat, Profile, RateControl};

// VA-API backend
#[cfg(feature = "vaapi")]
pub mod vaapi;

#[cfg(feature = "vaapi")]
pub use vaapi::VaapiEncoder;
