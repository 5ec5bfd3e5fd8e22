//! Output sinks for coded H.264 data.
//!
//! Every coded buffer the encoder produces is offered to every
//! registered sink; each sink decides locally whether it is enabled and
//! how to fragment the payload for its transport.

pub mod annexb;
pub mod rtp;
pub mod ts;
pub mod vpu_udp;

use std::fs::File;
use std::io::Write;
use std::net::UdpSocket;
use std::path::Path;

use anyhow::{Context, Result};
use bytes::{BufMut, BytesMut};
use tracing::warn;
use vastream_codec::{CodedSink, SinkSet};

use crate::config::{PayloadMode, StreamConfig};

/// Build the RTP header shared by the ES and TS sinks.
pub(crate) fn write_rtp_header(
    buf: &mut BytesMut,
    marker: bool,
    payload_type: u8,
    sequence: u16,
    timestamp: u32,
    ssrc: u32,
) {
    buf.put_u8(2 << 6); // version 2, no padding, no extension, no CSRC
    buf.put_u8(u8::from(marker) << 7 | payload_type);
    buf.put_u16(sequence);
    buf.put_u32(timestamp);
    buf.put_u32(ssrc);
}

/// Apply a DSCP class to outgoing datagrams. Best effort; failures are
/// logged and ignored.
pub(crate) fn set_dscp(socket: &UdpSocket, dscp: u32) {
    if dscp == 0 {
        return;
    }
    use std::os::unix::io::AsRawFd;
    let tos = (dscp << 2) as libc::c_int;
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IP,
            libc::IP_TOS,
            &tos as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        warn!(dscp, "failed to set DSCP class on RTP socket");
    }
}

/// Raw Annex-B file sink (`--output`).
pub struct FileSink {
    file: Option<File>,
}

impl FileSink {
    /// Create the sink writing to `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("creating NAL output file {}", path.display()))?;
        Ok(Self { file: Some(file) })
    }

    /// Disabled file sink.
    #[must_use]
    pub fn disabled() -> Self {
        Self { file: None }
    }
}

impl CodedSink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn deliver(&mut self, data: &[u8], _is_keyframe: bool) {
        let Some(file) = &mut self.file else { return };
        if let Err(err) = file.write_all(data) {
            warn!(%err, "NAL file write failed, disabling file sink");
            self.file = None;
        }
    }
}

/// Assemble the sink fan-out list for `config`.
///
/// Sinks whose targets are not configured are registered disabled, so
/// the fan-out shape is identical regardless of configuration.
pub fn build_sinks(config: &StreamConfig, frame_rate: u32) -> Result<SinkSet> {
    let mut sinks = SinkSet::new();

    match &config.nal_output {
        Some(path) => sinks.push(Box::new(FileSink::create(path)?)),
        None => sinks.push(Box::new(FileSink::disabled())),
    }

    let es_enabled = config.ip_port != 0 && config.payload == PayloadMode::RtpEs;
    sinks.push(Box::new(if es_enabled {
        rtp::RtpEsSink::new(
            &config.ip_address,
            config.ip_port,
            config.dscp,
            config.packet_size,
            frame_rate,
        )
    } else {
        rtp::RtpEsSink::disabled()
    }));

    let ts_enabled = config.ip_port != 0 && config.payload == PayloadMode::RtpTs;
    sinks.push(Box::new(if ts_enabled {
        ts::TsRtpSink::new(
            &config.ip_address,
            config.ip_port,
            config.dscp,
            frame_rate,
        )
    } else {
        ts::TsRtpSink::disabled()
    }));

    sinks.push(Box::new(if config.vpu_udp_port != 0 {
        vpu_udp::VpuUdpSink::new(
            &config.ip_address,
            config.vpu_udp_port,
            config.vpu_udp_big_endian,
        )
    } else {
        vpu_udp::VpuUdpSink::disabled()
    }));

    Ok(sinks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_sinks_registers_full_fanout() {
        let config = StreamConfig::default();
        let sinks = build_sinks(&config, 30).unwrap();
        // file + rtp-es + rtp-ts + vpu-udp, enabled or not.
        assert_eq!(sinks.len(), 4);
    }

    #[test]
    fn test_disabled_fanout_delivery_is_safe() {
        let config = StreamConfig::default();
        let mut sinks = build_sinks(&config, 30).unwrap();
        sinks.deliver(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x01, 0x02], true);
    }

    #[test]
    fn test_file_sink_records_exact_bytes() {
        let path = std::env::temp_dir().join("vastream-filesink-test.nal");
        let payload = [0x00u8, 0x00, 0x00, 0x01, 0x67, 0x64, 0x00, 0x1F];
        {
            let mut sink = FileSink::create(&path).unwrap();
            sink.deliver(&payload, true);
            sink.deliver(&payload[..5], false);
        }
        let written = std::fs::read(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(written.len(), payload.len() + 5);
        assert_eq!(&written[..payload.len()], &payload);
    }
}
