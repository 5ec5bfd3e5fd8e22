//! RTP elementary-stream sink.
//!
//! Payloads each coded access unit per the H.264 RTP payload format:
//! NAL units at or under the payload budget ride in single-NAL-unit
//! packets, larger ones are fragmented as FU-A. The RTP timestamp runs on
//! the 90 kHz media clock and advances once per access unit; the marker
//! bit closes each access unit.

use std::net::UdpSocket;

use bytes::{BufMut, BytesMut};
use tracing::{info, warn};
use vastream_codec::CodedSink;

use super::annexb::split_nal_units;
use super::set_dscp;

/// Default RTP payload budget, chosen to clear a 1500-byte MTU with
/// headroom for IP/UDP/RTP headers.
pub const DEFAULT_PAYLOAD_SIZE: usize = 1400;

const PAYLOAD_TYPE_DYNAMIC: u8 = 96;
const FU_A: u8 = 28;

/// RTP/ES output sink.
pub struct RtpEsSink {
    socket: Option<UdpSocket>,
    sequence: u16,
    timestamp: u32,
    timestamp_step: u32,
    ssrc: u32,
    max_payload: usize,
}

impl RtpEsSink {
    /// Create the sink, connected to `address:port`. A connect failure
    /// logs and leaves the sink disabled rather than killing the session.
    #[must_use]
    pub fn new(address: &str, port: u16, dscp: u32, packet_size: usize, frame_rate: u32) -> Self {
        let max_payload = if packet_size == 0 {
            DEFAULT_PAYLOAD_SIZE
        } else {
            packet_size.max(64)
        };
        let socket = match open_socket(address, port, dscp) {
            Ok(socket) => {
                info!(%address, port, max_payload, "RTP/ES sink streaming");
                Some(socket)
            }
            Err(err) => {
                warn!(%err, %address, port, "RTP/ES sink disabled");
                None
            }
        };
        Self {
            socket,
            sequence: rand::random(),
            timestamp: rand::random(),
            timestamp_step: 90_000 / frame_rate.max(1),
            ssrc: rand::random(),
            max_payload,
        }
    }

    /// Disabled sink constructor for configurations without an RTP
    /// target.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            socket: None,
            sequence: 0,
            timestamp: 0,
            timestamp_step: 0,
            ssrc: 0,
            max_payload: DEFAULT_PAYLOAD_SIZE,
        }
    }

    fn send_packet(&mut self, payload: &[u8], marker: bool) {
        let Some(socket) = &self.socket else { return };
        let mut packet = BytesMut::with_capacity(12 + payload.len());
        super::write_rtp_header(
            &mut packet,
            marker,
            PAYLOAD_TYPE_DYNAMIC,
            self.sequence,
            self.timestamp,
            self.ssrc,
        );
        packet.put_slice(payload);
        self.sequence = self.sequence.wrapping_add(1);
        if let Err(err) = socket.send(&packet) {
            warn!(%err, "RTP send failed");
        }
    }

    fn send_nal(&mut self, nal: &[u8], au_end: bool) {
        if nal.is_empty() {
            return;
        }
        if nal.len() <= self.max_payload {
            self.send_packet(nal, au_end);
            return;
        }

        // FU-A fragmentation: indicator keeps the NRI bits, the header
        // carries the original type plus start/end markers.
        let indicator = (nal[0] & 0x60) | FU_A;
        let nal_type = nal[0] & 0x1F;
        let mut rest = &nal[1..];
        let chunk = self.max_payload - 2;
        let mut first = true;
        while !rest.is_empty() {
            let take = chunk.min(rest.len());
            let last = take == rest.len();
            let fu_header =
                (u8::from(first) << 7) | (u8::from(last) << 6) | nal_type;
            let mut payload = Vec::with_capacity(2 + take);
            payload.push(indicator);
            payload.push(fu_header);
            payload.extend_from_slice(&rest[..take]);
            self.send_packet(&payload, last && au_end);
            rest = &rest[take..];
            first = false;
        }
    }
}

impl CodedSink for RtpEsSink {
    fn name(&self) -> &'static str {
        "rtp-es"
    }

    fn deliver(&mut self, data: &[u8], _is_keyframe: bool) {
        if self.socket.is_none() {
            return;
        }
        let nals = split_nal_units(data);
        let count = nals.len();
        for (index, nal) in nals.into_iter().enumerate() {
            self.send_nal(nal, index + 1 == count);
        }
        self.timestamp = self.timestamp.wrapping_add(self.timestamp_step);
    }
}

fn open_socket(address: &str, port: u16, dscp: u32) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect((address, port))?;
    set_dscp(&socket, dscp);
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_pair() -> (RtpEsSink, UdpSocket) {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = receiver.local_addr().unwrap().port();
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        let sink = RtpEsSink::new("127.0.0.1", port, 0, 0, 30);
        (sink, receiver)
    }

    fn recv(receiver: &UdpSocket) -> Vec<u8> {
        let mut buf = vec![0u8; 2048];
        let n = receiver.recv(&mut buf).unwrap();
        buf.truncate(n);
        buf
    }

    #[test]
    fn test_single_nal_packet_layout() {
        let (mut sink, receiver) = local_pair();
        let au = [
            0x00, 0x00, 0x00, 0x01, 0x65, 0xAA, 0xBB, 0xCC,
        ];
        sink.deliver(&au, true);

        let packet = recv(&receiver);
        assert_eq!(packet[0] >> 6, 2); // version
        assert_eq!(packet[1] & 0x7F, 96); // payload type
        assert_eq!(packet[1] >> 7, 1); // marker on the last NAL of the AU
        assert_eq!(&packet[12..], &[0x65, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_marker_only_on_final_nal() {
        let (mut sink, receiver) = local_pair();
        let mut au = Vec::new();
        au.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x67, 0x64]);
        au.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x88]);
        sink.deliver(&au, true);

        let first = recv(&receiver);
        let second = recv(&receiver);
        assert_eq!(first[1] >> 7, 0);
        assert_eq!(second[1] >> 7, 1);
        // Sequence numbers are consecutive.
        let seq0 = u16::from_be_bytes([first[2], first[3]]);
        let seq1 = u16::from_be_bytes([second[2], second[3]]);
        assert_eq!(seq1, seq0.wrapping_add(1));
        // Same access unit, same timestamp.
        assert_eq!(&first[4..8], &second[4..8]);
    }

    #[test]
    fn test_fu_a_fragmentation_reassembles() {
        let (sink, receiver) = local_pair();
        let mut sink = RtpEsSink { max_payload: 16, ..sink };

        let mut nal = vec![0x65u8]; // IDR, nal_ref_idc 3
        nal.extend((0..100).map(|i| i as u8));
        let mut au = vec![0x00, 0x00, 0x00, 0x01];
        au.extend_from_slice(&nal);
        sink.deliver(&au, true);

        let mut reassembled = Vec::new();
        let mut packets = Vec::new();
        loop {
            let packet = recv(&receiver);
            let done = packet[1] >> 7 == 1;
            packets.push(packet);
            if done {
                break;
            }
        }
        for (index, packet) in packets.iter().enumerate() {
            let payload = &packet[12..];
            assert_eq!(payload[0] & 0x1F, FU_A);
            assert_eq!(payload[0] & 0x60, 0x60); // NRI preserved
            let start = payload[1] >> 7 == 1;
            let end = (payload[1] >> 6) & 1 == 1;
            assert_eq!(start, index == 0);
            assert_eq!(end, index + 1 == packets.len());
            assert_eq!(payload[1] & 0x1F, 0x05); // original type
            if start {
                reassembled.push(payload[0] & 0x60 | payload[1] & 0x1F);
            }
            reassembled.extend_from_slice(&payload[2..]);
        }
        assert!(packets.len() > 1);
        assert_eq!(reassembled, nal);
    }

    #[test]
    fn test_timestamp_advances_per_access_unit() {
        let (mut sink, receiver) = local_pair();
        let au = [0x00, 0x00, 0x00, 0x01, 0x41, 0x9A];
        sink.deliver(&au, false);
        sink.deliver(&au, false);
        let a = recv(&receiver);
        let b = recv(&receiver);
        let ts_a = u32::from_be_bytes([a[4], a[5], a[6], a[7]]);
        let ts_b = u32::from_be_bytes([b[4], b[5], b[6], b[7]]);
        assert_eq!(ts_b.wrapping_sub(ts_a), 3000); // 90000 / 30
    }

    #[test]
    fn test_disabled_sink_is_noop() {
        let mut sink = RtpEsSink::disabled();
        sink.deliver(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x01], true);
    }
}
