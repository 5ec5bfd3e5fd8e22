//! Proprietary VPU UDP framer.
//!
//! Each coded buffer ships as one datagram: a `{seqno, iframe, len}`
//! header followed by the raw Annex-B payload. The receiving VPU decoder
//! predates any notion of byte order on the wire, so the header is
//! emitted in host order by default with an opt-in big-endian mode.

use std::net::UdpSocket;

use bytes::{BufMut, BytesMut};
use tracing::{info, warn};
use vastream_codec::CodedSink;

/// Byte length of the framer header.
pub const HEADER_LEN: usize = 12;

/// VPU UDP output sink.
pub struct VpuUdpSink {
    socket: Option<UdpSocket>,
    seqno: u32,
    big_endian: bool,
}

impl VpuUdpSink {
    /// Create the sink, connected to `address:port`. A connect failure
    /// logs and leaves the sink disabled.
    #[must_use]
    pub fn new(address: &str, port: u16, big_endian: bool) -> Self {
        let socket = match open_socket(address, port) {
            Ok(socket) => {
                info!(%address, port, big_endian, "VPU UDP sink streaming");
                Some(socket)
            }
            Err(err) => {
                warn!(%err, %address, port, "VPU UDP sink disabled");
                None
            }
        };
        Self {
            socket,
            seqno: 0,
            big_endian,
        }
    }

    /// Disabled sink constructor.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            socket: None,
            seqno: 0,
            big_endian: false,
        }
    }
}

impl CodedSink for VpuUdpSink {
    fn name(&self) -> &'static str {
        "vpu-udp"
    }

    fn deliver(&mut self, data: &[u8], is_keyframe: bool) {
        let Some(socket) = &self.socket else { return };

        let mut datagram = BytesMut::with_capacity(HEADER_LEN + data.len());
        let fields = [self.seqno, u32::from(is_keyframe), data.len() as u32];
        for field in fields {
            if self.big_endian {
                datagram.put_u32(field);
            } else {
                datagram.put_u32_le(field);
            }
        }
        datagram.put_slice(data);

        self.seqno = self.seqno.wrapping_add(1);
        if let Err(err) = socket.send(&datagram) {
            warn!(%err, "VPU UDP send failed");
        }
    }
}

fn open_socket(address: &str, port: u16) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect((address, port))?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_pair(big_endian: bool) -> (VpuUdpSink, UdpSocket) {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = receiver.local_addr().unwrap().port();
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        let sink = VpuUdpSink::new("127.0.0.1", port, big_endian);
        (sink, receiver)
    }

    fn recv(receiver: &UdpSocket) -> Vec<u8> {
        let mut buf = vec![0u8; 2048];
        let n = receiver.recv(&mut buf).unwrap();
        buf.truncate(n);
        buf
    }

    #[test]
    fn test_header_and_payload_little_endian() {
        let (mut sink, receiver) = local_pair(false);
        let payload = [0x00, 0x00, 0x00, 0x01, 0x65, 0x11, 0x22];
        sink.deliver(&payload, true);
        sink.deliver(&payload, false);

        let first = recv(&receiver);
        assert_eq!(u32::from_le_bytes(first[0..4].try_into().unwrap()), 0);
        assert_eq!(u32::from_le_bytes(first[4..8].try_into().unwrap()), 1);
        assert_eq!(
            u32::from_le_bytes(first[8..12].try_into().unwrap()) as usize,
            payload.len()
        );
        assert_eq!(&first[HEADER_LEN..], &payload);

        let second = recv(&receiver);
        assert_eq!(u32::from_le_bytes(second[0..4].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(second[4..8].try_into().unwrap()), 0);
    }

    #[test]
    fn test_big_endian_header_mode() {
        let (mut sink, receiver) = local_pair(true);
        sink.deliver(&[0xAA, 0xBB], false);
        let datagram = recv(&receiver);
        assert_eq!(u32::from_be_bytes(datagram[0..4].try_into().unwrap()), 0);
        assert_eq!(
            u32::from_be_bytes(datagram[8..12].try_into().unwrap()),
            2
        );
    }

    #[test]
    fn test_disabled_sink_is_noop() {
        let mut sink = VpuUdpSink::disabled();
        sink.deliver(&[1, 2, 3], true);
        assert_eq!(sink.seqno, 0);
    }
}
