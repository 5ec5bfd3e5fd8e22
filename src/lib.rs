//! vastream - VA-API H.264 capture, encode and network streaming.
//!
//! The pipeline: a capture source produces raw frames at a negotiated
//! width/height/format/frame-rate, the hardware encode session in
//! [`vastream_codec`] compresses them into an Annex-B H.264 elementary
//! stream, and every coded buffer is fanned out to the configured output
//! sinks (RTP elementary stream, MPEG-TS over RTP, a proprietary UDP
//! framer, a raw NAL file).

pub mod capture;
pub mod config;
pub mod sinks;

pub use config::{PayloadMode, StreamConfig};
pub use vastream_codec as codec;
