//! Streamer configuration assembled from the command line.

use std::path::PathBuf;

use vastream_codec::EncoderConfig;

use crate::capture::CaptureMode;

/// How coded video leaves the box when an RTP target is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadMode {
    /// Repacketize the elementary stream into MPEG-TS cells, then RTP.
    RtpTs,
    /// RTP elementary-stream payloading (single NAL / FU-A).
    RtpEs,
}

impl PayloadMode {
    /// Parse the numeric `--payloadmode` option (0 = RTP/TS, 1 = RTP/ES).
    #[must_use]
    pub fn from_flag(value: u32) -> Self {
        if value & 1 == 1 {
            Self::RtpEs
        } else {
            Self::RtpTs
        }
    }
}

/// Full streamer configuration: encoder settings plus capture selection
/// and output targets.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Encoder settings; width/height/frame-rate are overwritten by the
    /// capture source once negotiation completes.
    pub encoder: EncoderConfig,
    /// Which capture front-end drives the session.
    pub mode: CaptureMode,
    /// Capture device path for V4L capture.
    pub device: String,
    /// RTP destination address.
    pub ip_address: String,
    /// RTP destination port; 0 leaves both RTP sinks disabled.
    pub ip_port: u16,
    /// DSCP class for outgoing RTP datagrams (0 = leave default).
    pub dscp: u32,
    /// Maximum RTP payload size; 0 picks the default.
    pub packet_size: usize,
    /// RTP payload mode.
    pub payload: PayloadMode,
    /// Destination for the proprietary VPU UDP framer; disabled when
    /// unset.
    pub vpu_udp_port: u16,
    /// Emit the VPU framer header big-endian.
    pub vpu_udp_big_endian: bool,
    /// Record raw Annex-B NALs to this file.
    pub nal_output: Option<PathBuf>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderConfig::default(),
            mode: CaptureMode::V4l,
            device: "/dev/video0".into(),
            ip_address: "192.168.0.67".into(),
            ip_port: 0,
            dscp: 0,
            packet_size: 0,
            payload: PayloadMode::RtpTs,
            vpu_udp_port: 0,
            vpu_udp_big_endian: false,
            nal_output: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_mode_flag() {
        assert_eq!(PayloadMode::from_flag(0), PayloadMode::RtpTs);
        assert_eq!(PayloadMode::from_flag(1), PayloadMode::RtpEs);
        assert_eq!(PayloadMode::from_flag(3), PayloadMode::RtpEs);
    }

    #[test]
    fn test_defaults_leave_network_disabled() {
        let config = StreamConfig::default();
        assert_eq!(config.ip_port, 0);
        assert_eq!(config.vpu_udp_port, 0);
        assert!(config.nal_output.is_none());
    }
}
